//! Europe PMC REST search client.
//!
//! Pages through the `search` endpoint and flattens each hit into a [`Paper`].
//!
//! API notes:
//! - `pageSize` accepts up to 1000; 100 keeps responses small
//! - `resultType=core` is required for abstracts, MeSH headings and affiliations
//! - `hitCount` on the first page fixes the number of pages to request

use crate::error::{LitError, OptionExt, Result};
use crate::paper::Paper;
use crate::table;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Europe PMC search endpoint
pub const EUROPEPMC_SEARCH_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest/search";

/// Default disease query
pub const DEFAULT_QUERY: &str = r#"("Takayasu arteritis" OR "Takayasu's arteritis")"#;

/// Default number of hits per page
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Fixed per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch options
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Search endpoint (overridable for mirrors and tests)
    pub base_url: String,
    /// Europe PMC query string
    pub query: String,
    /// Hits per page
    pub page_size: u32,
    /// Stop after this many pages even if more hits exist
    pub max_pages: Option<u32>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            base_url: EUROPEPMC_SEARCH_URL.to_string(),
            query: DEFAULT_QUERY.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: None,
        }
    }
}

/// Outcome of a full fetch
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    /// Hits reported by the API
    pub hit_count: u64,
    /// Pages requested
    pub pages: u32,
    /// Records returned before filtering
    pub fetched: usize,
    /// Records kept (those with an abstract)
    pub papers: Vec<Paper>,
}

impl FetchResult {
    /// Write the kept papers to the raw CSV; returns the number of rows written.
    pub fn write_raw(&self, path: &Path) -> Result<usize> {
        table::write_csv(path, &self.papers)
    }
}

// === Europe PMC API Response Types ===

/// One page of search results
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default, deserialize_with = "de_lenient_count")]
    pub hit_count: Option<u64>,
    #[serde(default)]
    pub result_list: Option<ResultList>,
}

#[derive(Debug, Deserialize)]
pub struct ResultList {
    #[serde(default)]
    pub result: Vec<EpmcRecord>,
}

/// A single search hit (lite or core result type)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpmcRecord {
    id: Option<String>,
    source: Option<String>,
    title: Option<String>,
    journal_title: Option<String>,
    journal_info: Option<JournalInfo>,
    pub_year: Option<String>,
    abstract_text: Option<String>,
    mesh_heading_list: Option<MeshHeadingList>,
    affiliation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct JournalInfo {
    journal: Option<Journal>,
}

#[derive(Debug, Default, Deserialize)]
struct Journal {
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeshHeadingList {
    #[serde(default)]
    mesh_heading: Vec<MeshHeading>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeshHeading {
    descriptor_name: Option<String>,
}

impl SearchResponse {
    /// Hits on this page
    pub fn records(self) -> Vec<EpmcRecord> {
        self.result_list.map(|l| l.result).unwrap_or_default()
    }
}

/// `hitCount` arrives as a number, but older responses quote it.
fn de_lenient_count<'de, D>(de: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(de)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Flatten one hit into a table row.
pub fn flatten_record(record: EpmcRecord) -> Paper {
    let journal = record
        .journal_title
        .or_else(|| record.journal_info.and_then(|j| j.journal).and_then(|j| j.title));

    // Present-but-empty heading lists become "", absent lists stay None.
    let mesh_terms = record.mesh_heading_list.map(|list| {
        list.mesh_heading
            .into_iter()
            .map(|m| m.descriptor_name.unwrap_or_default())
            .collect::<Vec<_>>()
            .join(";")
    });

    Paper {
        id: record.id,
        source: record.source,
        title: record.title,
        journal,
        year: record.pub_year.and_then(|y| y.trim().parse().ok()),
        abstract_text: record.abstract_text,
        mesh_terms,
        affiliations: record.affiliation,
    }
}

/// Number of pages needed to cover `hit_count` hits.
pub fn total_pages(hit_count: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    let pages = hit_count.div_ceil(u64::from(page_size));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Europe PMC search client
pub struct EuropePmcClient {
    client: reqwest::Client,
    options: FetchOptions,
}

impl EuropePmcClient {
    /// Create a new client
    pub fn new(options: FetchOptions) -> Result<Self> {
        if options.page_size == 0 {
            return Err(LitError::Validation("page_size must be at least 1".to_string()));
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("takayasu-lit/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LitError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, options })
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Build the search URL for a 1-based page
    fn build_search_url(&self, page: u32) -> Result<Url> {
        let mut url = Url::parse(&self.options.base_url)
            .map_err(|e| LitError::Config(format!("Invalid base URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("query", &self.options.query)
            .append_pair("format", "json")
            .append_pair("resultType", "core")
            .append_pair("pageSize", &self.options.page_size.to_string())
            .append_pair("page", &page.to_string());

        Ok(url)
    }

    /// Fetch and parse a single page. Non-2xx responses are errors.
    pub async fn fetch_page(&self, page: u32) -> Result<SearchResponse> {
        let url = self.build_search_url(page)?;
        debug!(url = %url, page = page, "Fetching Europe PMC page");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LitError::Api {
                code: status.as_u16(),
                message: format!("Europe PMC search error: {}", status),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| LitError::Parse(format!("Failed to parse Europe PMC response: {}", e)))
    }

    /// Fetch every page of the query and keep the records that carry an abstract.
    pub async fn fetch_all(&self) -> Result<FetchResult> {
        let first = self.fetch_page(1).await?;
        let hit_count = first
            .hit_count
            .ok_or_parse("Europe PMC response has no hitCount")?;

        let mut pages = total_pages(hit_count, self.options.page_size);
        if let Some(cap) = self.options.max_pages {
            pages = pages.min(cap);
        }

        info!(
            query = %self.options.query,
            hit_count = hit_count,
            pages = pages,
            "Starting Europe PMC fetch"
        );

        let mut records: Vec<EpmcRecord> = first.records();

        for page in 2..=pages {
            info!(page = page, total = pages, "Fetching page");
            let data = self.fetch_page(page).await?;
            let batch = data.records();
            debug!(page = page, count = batch.len(), "Parsed Europe PMC page");
            records.extend(batch);
        }

        let fetched = records.len();
        let papers: Vec<Paper> = records
            .into_iter()
            .map(flatten_record)
            .filter(|p| {
                p.abstract_text
                    .as_deref()
                    .is_some_and(|a| !a.trim().is_empty())
            })
            .collect();

        info!(
            fetched = fetched,
            kept = papers.len(),
            dropped = fetched - papers.len(),
            "Europe PMC fetch complete"
        );

        Ok(FetchResult {
            hit_count,
            pages: pages.max(1),
            fetched,
            papers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 100), 0);
        assert_eq!(total_pages(1, 100), 1);
        assert_eq!(total_pages(100, 100), 1);
        assert_eq!(total_pages(101, 100), 2);
        assert_eq!(total_pages(2345, 100), 24);
    }

    #[test]
    fn test_build_search_url() -> Result<()> {
        let client = EuropePmcClient::new(FetchOptions::default())?;
        let url = client.build_search_url(3)?;
        let s = url.as_str();
        assert!(s.starts_with(EUROPEPMC_SEARCH_URL));
        assert!(s.contains("format=json"));
        assert!(s.contains("pageSize=100"));
        assert!(s.contains("page=3"));
        assert!(s.contains("resultType=core"));
        assert!(s.contains("Takayasu"));
        Ok(())
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let options = FetchOptions {
            page_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            EuropePmcClient::new(options),
            Err(LitError::Validation(_))
        ));
    }

    #[test]
    fn test_flatten_core_record() -> Result<()> {
        let json = r#"{
            "hitCount": "1",
            "resultList": {"result": [{
                "id": "12345",
                "source": "MED",
                "title": "Tocilizumab in Takayasu arteritis",
                "journalInfo": {"journal": {"title": "Rheumatology"}},
                "pubYear": "2018",
                "abstractText": "We report ...",
                "meshHeadingList": {"meshHeading": [
                    {"descriptorName": "Takayasu Arteritis"},
                    {"descriptorName": "Humans"}
                ]},
                "affiliation": "Kyoto University, Japan"
            }]}
        }"#;
        let response: SearchResponse = serde_json::from_str(json)?;
        assert_eq!(response.hit_count, Some(1));

        let paper = flatten_record(response.records().remove(0));
        assert_eq!(paper.id.as_deref(), Some("12345"));
        assert_eq!(paper.journal.as_deref(), Some("Rheumatology"));
        assert_eq!(paper.year, Some(2018));
        assert_eq!(paper.mesh_terms.as_deref(), Some("Takayasu Arteritis;Humans"));
        assert_eq!(paper.affiliations.as_deref(), Some("Kyoto University, Japan"));
        Ok(())
    }

    #[test]
    fn test_flatten_lite_record_without_mesh() -> Result<()> {
        let json = r#"{"id": "PPR1", "journalTitle": "Lancet", "pubYear": "unknown"}"#;
        let record: EpmcRecord = serde_json::from_str(json)?;
        let paper = flatten_record(record);
        assert_eq!(paper.journal.as_deref(), Some("Lancet"));
        assert_eq!(paper.year, None);
        assert_eq!(paper.mesh_terms, None);
        assert_eq!(paper.abstract_text, None);
        Ok(())
    }
}
