//! Search query handed to a listing source.

use serde::{Deserialize, Serialize};

use crate::models::ScrapingConfig;

/// Parameters of one fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchQuery {
    pub search_term: String,
    pub location: String,
    pub results_wanted: u32,
    pub hours_old: u32,
    pub country_code: String,
    pub sites: Vec<String>,
}

impl From<&ScrapingConfig> for SearchQuery {
    fn from(config: &ScrapingConfig) -> Self {
        Self {
            search_term: config.search_term.clone(),
            location: config.location.clone(),
            results_wanted: config.results_wanted,
            hours_old: config.hours_old,
            country_code: config.country_code.clone(),
            sites: config.sites.clone(),
        }
    }
}
