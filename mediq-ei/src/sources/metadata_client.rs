//! Primary metadata provider client (TMDB-style API)
//!
//! - `search(title, year)` → zero or one best match
//! - `details(id)` → full record with credits
//!
//! Calls are throttled to the provider's documented rate with a direct
//! `governor` limiter. Only movie entities are looked up.

use super::{EntityQuery, SourceAdapter};
use crate::config::{PipelineSettings, ProviderConfig};
use crate::error::ProviderError;
use crate::types::{
    Contributor, ContributorRole, EditorialFlags, EntityType, FragmentFields, ProviderKind,
    SourceFragment,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use tracing::debug;

pub const SOURCE_NAME: &str = "tmdb";

/// Search hits below this title similarity are not a match
const MIN_TITLE_SIMILARITY: f64 = 0.6;

/// Similarity bonus when the release year agrees
const YEAR_MATCH_BONUS: f64 = 0.2;

/// Revenue above which a title counts as a blockbuster
const BLOCKBUSTER_REVENUE: u64 = 300_000_000;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub release_date: Option<String>,
}

impl SearchResult {
    fn year(&self) -> Option<i32> {
        parse_year(self.release_date.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovieDetails {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub vote_count: Option<f64>,
    #[serde(default)]
    pub revenue: Option<u64>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub imdb_id: Option<String>,
    #[serde(default)]
    pub credits: Option<Credits>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Genre {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credits {
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CastMember {
    pub name: String,
    #[serde(default)]
    pub order: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrewMember {
    pub name: String,
    #[serde(default)]
    pub job: String,
}

pub struct MetadataProviderClient {
    client: reqwest::Client,
    base_url: String,
    image_base_url: String,
    api_key: Option<String>,
    min_trusted_votes: f64,
    rate_limiter: governor::RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl MetadataProviderClient {
    pub fn new(
        providers: &ProviderConfig,
        settings: &PipelineSettings,
    ) -> Result<Self, ProviderError> {
        let rps = NonZeroU32::new(providers.metadata_requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = governor::RateLimiter::direct(governor::Quota::per_second(rps));

        let client = reqwest::Client::builder()
            .user_agent(concat!("mediq/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::from_reqwest(SOURCE_NAME, e))?;

        Ok(Self {
            client,
            base_url: providers.metadata_base_url.trim_end_matches('/').to_string(),
            image_base_url: providers
                .metadata_image_base_url
                .trim_end_matches('/')
                .to_string(),
            api_key: providers.resolve_metadata_key(),
            min_trusted_votes: settings.min_trusted_votes,
            rate_limiter,
        })
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or_else(|| ProviderError::NotConfigured {
            provider: SOURCE_NAME.to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let api_key = self.api_key()?;

        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", api_key)])
            .query(params)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(SOURCE_NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http {
                provider: SOURCE_NAME.to_string(),
                status: status.as_u16(),
            });
        }

        response.json().await.map_err(|e| ProviderError::Parse {
            provider: SOURCE_NAME.to_string(),
            message: e.to_string(),
        })
    }

    /// Best match for `title` (and `year`, when known)
    pub async fn search(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> Result<Option<SearchResult>, ProviderError> {
        debug!(title, ?year, "Searching metadata provider");

        let mut params = vec![("query", title.to_string())];
        if let Some(y) = year {
            params.push(("year", y.to_string()));
        }

        let response: SearchResponse = self.get_json("/search/movie", &params).await?;
        Ok(best_match(&response.results, title, year).cloned())
    }

    /// Full details with credits
    pub async fn details(&self, id: &str) -> Result<MovieDetails, ProviderError> {
        debug!(provider_id = id, "Fetching metadata details");
        self.get_json(
            &format!("/movie/{}", id),
            &[("append_to_response", "credits".to_string())],
        )
        .await
    }

    /// Map provider details onto fragment fields
    pub fn fields_from_details(&self, details: &MovieDetails) -> FragmentFields {
        let mut contributors = Vec::new();
        if let Some(credits) = &details.credits {
            contributors.extend(
                credits
                    .crew
                    .iter()
                    .filter(|c| c.job == "Director")
                    .map(|c| Contributor::new(&c.name, ContributorRole::Director)),
            );
            contributors.extend(
                credits
                    .crew
                    .iter()
                    .filter(|c| c.job == "Screenplay" || c.job == "Writer")
                    .map(|c| Contributor::new(&c.name, ContributorRole::Writer)),
            );
            if let Some(lead) = credits.cast.iter().min_by_key(|c| c.order.unwrap_or(u32::MAX)) {
                contributors.push(Contributor::new(&lead.name, ContributorRole::Lead));
            }
        }

        let trusted = details.vote_count.unwrap_or(0.0) >= self.min_trusted_votes;

        let mut external_ids = BTreeMap::new();
        external_ids.insert(SOURCE_NAME.to_string(), details.id.to_string());
        if let Some(imdb) = details.imdb_id.as_ref().filter(|s| !s.is_empty()) {
            external_ids.insert("imdb".to_string(), imdb.clone());
        }

        let blockbuster = details.revenue.unwrap_or(0) >= BLOCKBUSTER_REVENUE;

        FragmentFields {
            entity_type: Some(EntityType::Movie),
            title_primary: Some(details.title.clone()),
            genres: details.genres.iter().map(|g| g.name.to_lowercase()).collect(),
            release_year: parse_year(details.release_date.as_deref()),
            contributors,
            external_rating: details.vote_average.filter(|_| trusted),
            flags: blockbuster.then(|| EditorialFlags {
                blockbuster: true,
                ..Default::default()
            }),
            popularity: details.vote_count,
            image_url: details
                .poster_path
                .as_ref()
                .map(|p| format!("{}{}", self.image_base_url, p)),
            external_ids,
            ..Default::default()
        }
    }
}

#[async_trait]
impl SourceAdapter for MetadataProviderClient {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::PrimaryMetadata
    }

    async fn fetch(&self, query: &EntityQuery) -> Result<Option<SourceFragment>, ProviderError> {
        if query.entity_type != EntityType::Movie || self.api_key.is_none() {
            return Ok(None);
        }

        let provider_id = match query.external_ids.get(SOURCE_NAME) {
            Some(id) => id.clone(),
            None => {
                let Some(title) = query.title.as_deref() else {
                    return Ok(None);
                };
                match self.search(title, query.year).await? {
                    Some(hit) => hit.id.to_string(),
                    None => {
                        debug!(entity_id = %query.id, title, "No metadata match");
                        return Ok(None);
                    }
                }
            }
        };

        let details = self.details(&provider_id).await?;
        Ok(Some(SourceFragment::new(
            SOURCE_NAME,
            ProviderKind::PrimaryMetadata,
            provider_id,
            ProviderKind::PrimaryMetadata.default_confidence(),
            self.fields_from_details(&details),
        )))
    }
}

/// Highest title similarity (plus year bonus) above the match threshold
///
/// Earlier results win ties, matching the provider's own ranking.
pub fn best_match<'a>(
    results: &'a [SearchResult],
    title: &str,
    year: Option<i32>,
) -> Option<&'a SearchResult> {
    let wanted = title.trim().to_lowercase();

    let mut best: Option<(&SearchResult, f64)> = None;
    for result in results {
        let similarity = strsim::normalized_levenshtein(&wanted, &result.title.to_lowercase());
        if similarity < MIN_TITLE_SIMILARITY {
            continue;
        }
        let bonus = match (year, result.year()) {
            (Some(a), Some(b)) if a == b => YEAR_MATCH_BONUS,
            _ => 0.0,
        };
        let score = similarity + bonus;
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((result, score));
        }
    }

    best.map(|(r, _)| r)
}

/// "1995-12-15" → 1995
fn parse_year(date: Option<&str>) -> Option<i32> {
    date.and_then(|d| d.get(..4)).and_then(|y| y.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: u64, title: &str, date: &str) -> SearchResult {
        SearchResult {
            id,
            title: title.to_string(),
            release_date: Some(date.to_string()),
        }
    }

    fn client() -> MetadataProviderClient {
        MetadataProviderClient::new(&ProviderConfig::default(), &PipelineSettings::default())
            .unwrap()
    }

    #[test]
    fn test_best_match_prefers_year() {
        let results = vec![
            result(1, "Heat", "1986-03-14"),
            result(2, "Heat", "1995-12-15"),
        ];
        assert_eq!(best_match(&results, "Heat", Some(1995)).unwrap().id, 2);
        // Without a year the provider's first hit wins
        assert_eq!(best_match(&results, "Heat", None).unwrap().id, 1);
    }

    #[test]
    fn test_best_match_rejects_dissimilar_titles() {
        let results = vec![result(1, "Completely Different", "1995-01-01")];
        assert!(best_match(&results, "Heat", Some(1995)).is_none());
    }

    #[test]
    fn test_parse_details_payload() {
        let json = r#"{
            "id": 949,
            "title": "Heat",
            "release_date": "1995-12-15",
            "genres": [{"id": 80, "name": "Crime"}, {"id": 18, "name": "Drama"}],
            "vote_average": 7.9,
            "vote_count": 7000,
            "revenue": 187436818,
            "poster_path": "/heat.jpg",
            "imdb_id": "tt0113277",
            "credits": {
                "cast": [{"name": "Robert De Niro", "order": 1}, {"name": "Al Pacino", "order": 0}],
                "crew": [{"name": "Michael Mann", "job": "Director"}, {"name": "Michael Mann", "job": "Writer"}]
            }
        }"#;
        let details: MovieDetails = serde_json::from_str(json).unwrap();
        let fields = client().fields_from_details(&details);

        assert_eq!(fields.title_primary.as_deref(), Some("Heat"));
        assert_eq!(fields.release_year, Some(1995));
        assert_eq!(fields.genres, vec!["crime", "drama"]);
        assert_eq!(fields.external_rating, Some(7.9));
        assert!(fields.flags.is_none());
        assert_eq!(fields.external_ids.get("imdb").map(String::as_str), Some("tt0113277"));
        assert_eq!(
            fields.image_url.as_deref(),
            Some("https://image.tmdb.org/t/p/w780/heat.jpg")
        );
        assert_eq!(fields.contributors[0], Contributor::new("Michael Mann", ContributorRole::Director));
        assert!(fields
            .contributors
            .contains(&Contributor::new("Al Pacino", ContributorRole::Lead)));
    }

    #[test]
    fn test_untrusted_rating_is_dropped() {
        let json = r#"{"id": 1, "title": "Obscure", "vote_average": 9.5, "vote_count": 3}"#;
        let details: MovieDetails = serde_json::from_str(json).unwrap();
        let fields = client().fields_from_details(&details);
        assert_eq!(fields.external_rating, None);
        assert_eq!(fields.popularity, Some(3.0));
    }

    #[tokio::test]
    async fn test_non_movie_is_skipped() {
        let query = EntityQuery {
            id: crate::types::EntityId::new(),
            entity_type: EntityType::Post,
            title: Some("Heat".to_string()),
            year: None,
            external_ids: BTreeMap::new(),
        };
        assert!(client().fetch(&query).await.unwrap().is_none());
    }
}
