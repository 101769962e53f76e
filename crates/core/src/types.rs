use serde::{Deserialize, Serialize};

/// One (keyword, location) search task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryUnit {
    pub keyword: String,
    pub location: String,
}

impl QueryUnit {
    pub fn new(keyword: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            location: location.into(),
        }
    }

    /// Enumerate keywords × locations, keyword-major, skipping blank entries.
    pub fn matrix(keywords: &[String], locations: &[String]) -> Vec<QueryUnit> {
        keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .flat_map(|k| {
                locations
                    .iter()
                    .map(|l| l.trim())
                    .filter(|l| !l.is_empty())
                    .map(move |l| QueryUnit::new(k, l))
            })
            .collect()
    }

    /// Ledger key, `keyword|location`.
    pub fn key(&self) -> String {
        format!("{}|{}", self.keyword, self.location)
    }

    /// Free-text query sent to the search box.
    pub fn query(&self) -> String {
        format!("{} in {}", self.keyword, self.location)
    }
}

impl std::fmt::Display for QueryUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} | {}", self.keyword, self.location)
    }
}

/// Minimal harvested record. Row layout of the harvest file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRef {
    pub name: String,
    #[serde(alias = "googlemaps_link")]
    pub link: String,
    pub keyword: String,
    #[serde(rename = "city")]
    pub location: String,
}

/// Terminal output row. Column order is the enriched file's header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub website: String,
    #[serde(alias = "googlemaps_link")]
    pub link: String,
    pub keyword: String,
    #[serde(rename = "city")]
    pub location: String,
}

impl EnrichedRecord {
    pub fn from_listing(listing: &ListingRef, phone: String, website: Option<String>) -> Self {
        Self {
            name: listing.name.clone(),
            phone,
            website: website.unwrap_or_default(),
            link: listing.link.clone(),
            keyword: listing.keyword.clone(),
            location: listing.location.clone(),
        }
    }
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Strip query and fragment so the same place reached through different
/// tracking parameters maps to one key.
pub fn canonical_link(href: &str) -> String {
    let href = href.trim();
    match url::Url::parse(href) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => href.to_string(),
    }
}
