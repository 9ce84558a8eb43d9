//! Stock search keyword derivation

use super::ImageQuery;
use crate::knowledge::KnowledgeTables;

/// Words kept when falling back to the title itself
const TITLE_KEYWORD_WORDS: usize = 4;

/// Keyword for a literal stock search
///
/// Order: celebrity/topic override, topic table, category table, then the
/// first few words of the title.
pub fn derive_keyword(query: &ImageQuery, tables: &KnowledgeTables) -> Option<String> {
    let text = query.text();

    if let Some(keyword) = tables.celebrity_keyword(&text) {
        return Some(keyword.to_string());
    }
    if let Some(keyword) = tables.topic_keyword(&text) {
        return Some(keyword.to_string());
    }
    if let Some(keyword) = query
        .category
        .as_deref()
        .and_then(|c| tables.category_keyword(c))
    {
        return Some(keyword.to_string());
    }

    query.title.as_deref().and_then(title_keyword)
}

fn title_keyword(title: &str) -> Option<String> {
    let words: Vec<&str> = title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .take(TITLE_KEYWORD_WORDS)
        .collect();
    (!words.is_empty()).then(|| words.join(" ").to_lowercase())
}
