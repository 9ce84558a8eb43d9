//! Variant templates
//!
//! Placeholders are `{name}`; a template applies only when every placeholder
//! it uses has an input and its entity type matches.

use crate::types::EntityType;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub id: &'static str,
    /// `None` applies to every entity type
    pub entity_type: Option<EntityType>,
    pub title: &'static str,
    pub title_localized: &'static str,
    pub excerpt: &'static str,
    /// Only used when the entity has no localized body
    pub body_localized: Option<&'static str>,
}

pub const TEMPLATES: &[Template] = &[
    Template {
        id: "headline-known",
        entity_type: None,
        title: "{title}: What We Know So Far",
        title_localized: "{title}: Những điều cần biết",
        excerpt: "Everything worth knowing about {title}, from our {category} desk.",
        body_localized: Some(
            "{title} là chủ đề đang được quan tâm trong chuyên mục {category}. Bài viết tổng hợp những thông tin đáng chú ý nhất.",
        ),
    },
    Template {
        id: "topic-story",
        entity_type: None,
        title: "{topic}: The Story Behind {title}",
        title_localized: "{title} và câu chuyện {topic}",
        excerpt: "A closer look at {title} through the lens of {topic}.",
        body_localized: None,
    },
    Template {
        id: "topic-updates",
        entity_type: None,
        title: "{topic}: Latest Updates",
        title_localized: "Cập nhật mới nhất về {topic}",
        excerpt: "The latest {category} news on {topic}.",
        body_localized: Some(
            "Cập nhật mới nhất về {topic} trong chuyên mục {category}, được ban biên tập chọn lọc và tổng hợp.",
        ),
    },
    Template {
        id: "category-roundup",
        entity_type: Some(EntityType::Post),
        title: "{category} Roundup: {title}",
        title_localized: "Điểm tin {category}: {title}",
        excerpt: "Our {category} roundup, featuring {title}.",
        body_localized: None,
    },
    Template {
        id: "explainer",
        entity_type: Some(EntityType::Post),
        title: "Explained: {title}",
        title_localized: "Giải thích: {title}",
        excerpt: "A short explainer on {title}.",
        body_localized: None,
    },
    Template {
        id: "movie-year-review",
        entity_type: Some(EntityType::Movie),
        title: "{title} ({year}) Review",
        title_localized: "Đánh giá phim {title} ({year})",
        excerpt: "{title} ({year}), directed by {contributor}.",
        body_localized: Some(
            "{title} ({year}) của đạo diễn {contributor} là một tác phẩm {genre} đáng chú ý. Bài viết điểm lại những điểm nổi bật của phim.",
        ),
    },
    Template {
        id: "movie-second-look",
        entity_type: Some(EntityType::Movie),
        title: "{contributor}'s {title}: A Second Look",
        title_localized: "{title} của {contributor}: Nhìn lại",
        excerpt: "Revisiting {contributor}'s {genre} film {title}.",
        body_localized: None,
    },
    Template {
        id: "movie-genre-pick",
        entity_type: Some(EntityType::Movie),
        title: "{title}: A {genre} Worth Watching",
        title_localized: "{title}: Bộ phim {genre} đáng xem",
        excerpt: "Why {title} stands out among {genre} films.",
        body_localized: None,
    },
];

impl Template {
    pub fn applies_to(&self, entity_type: EntityType, inputs: &BTreeMap<String, String>) -> bool {
        self.entity_type.map_or(true, |t| t == entity_type)
            && self
                .all_text()
                .iter()
                .flat_map(|text| placeholders(text))
                .all(|name| inputs.contains_key(name))
    }

    fn all_text(&self) -> Vec<&'static str> {
        let mut texts = vec![self.title, self.title_localized, self.excerpt];
        texts.extend(self.body_localized);
        texts
    }

    /// Inputs this template actually reads
    pub fn used_inputs(&self, inputs: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        self.all_text()
            .iter()
            .flat_map(|text| placeholders(text))
            .filter_map(|name| inputs.get(name).map(|v| (name.to_string(), v.clone())))
            .collect()
    }
}

/// Placeholder names in `text`
pub fn placeholders(text: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                names.push(&after[..end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}

/// Substitute every `{name}` with its input, capitalizing the first letter
pub fn render(text: &str, inputs: &BTreeMap<String, String>) -> String {
    let mut out = text.to_string();
    for (name, value) in inputs {
        out = out.replace(&format!("{{{}}}", name), value);
    }
    capitalize_first(&out)
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
