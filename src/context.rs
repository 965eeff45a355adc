use std::sync::Arc;

use tracing::{debug, warn};

use crate::search::SearchProvider;

/// Turns a query into a short grounding snippet. Never fails: search errors
/// and empty results both yield the fallback phrase.
pub struct ContextRetriever {
    search: Arc<dyn SearchProvider>,
    max_snippets: usize,
    fallback: String,
}

impl ContextRetriever {
    pub fn new(search: Arc<dyn SearchProvider>, max_snippets: usize, fallback: String) -> Self {
        Self {
            search,
            max_snippets,
            fallback,
        }
    }

    pub async fn retrieve(&self, query: &str) -> String {
        match self.search.search(query).await {
            Ok(snippets) if !snippets.is_empty() => {
                let taken: Vec<String> = snippets.into_iter().take(self.max_snippets).collect();
                debug!("Retrieved {} snippet(s) for '{}'", taken.len(), query);
                taken.join(" ")
            }
            Ok(_) => {
                debug!("No search results for '{}'", query);
                self.fallback.clone()
            }
            Err(e) => {
                warn!("Search failed for '{}': {:#}", query, e);
                self.fallback.clone()
            }
        }
    }
}
