//! Wire format of the search API response.

use papermill_shared::SearchEntry;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchResponse {
    #[serde(default)]
    search_information: Option<SearchInformation>,
    /// Absent when the query has no hits.
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchInformation {
    /// The API sends the count as a string.
    #[serde(default)]
    total_results: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    link: Option<String>,
    #[serde(default)]
    snippet: String,
}

impl SearchResponse {
    pub(crate) fn total_results(&self) -> Option<u64> {
        self.search_information
            .as_ref()
            .and_then(|info| info.total_results.as_deref())
            .and_then(|s| s.parse().ok())
    }

    /// Entries with a link, in rank order.
    pub(crate) fn into_entries(self) -> Vec<SearchEntry> {
        self.items
            .into_iter()
            .filter_map(|item| {
                let link = item.link?;
                Some(SearchEntry {
                    title: item.title.trim().to_string(),
                    link,
                    snippet: item.snippet.split_whitespace().collect::<Vec<_>>().join(" "),
                })
            })
            .collect()
    }
}
