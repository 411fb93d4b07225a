//! Filtering and aggregation over the clustered dataset.
//!
//! [`Dataset`] holds the rows of the clustered CSV that have a publication
//! year. [`Filters`] narrows them by year range, required imaging/treatment
//! flags and a title/abstract keyword, and [`Summary`] carries the aggregates
//! the dashboard charts are drawn from.

pub mod render;
pub mod server;

use crate::cluster::TopicSummary;
use crate::error::{LitError, Result};
use crate::paper::{ClusteredPaper, Flag};
use crate::table;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

/// Number of affiliations shown in the affiliation chart
pub const TOP_AFFILIATIONS: usize = 15;

/// Label for papers without an affiliation
const UNKNOWN_AFFILIATION: &str = "Unknown";

/// Clustered papers loaded for exploration
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    papers: Vec<ClusteredPaper>,
    topics: Option<TopicSummary>,
}

impl Dataset {
    /// Keep only rows with a publication year.
    pub fn from_papers(papers: Vec<ClusteredPaper>) -> Self {
        let total = papers.len();
        let papers: Vec<ClusteredPaper> = papers.into_iter().filter(|p| p.year.is_some()).collect();
        if papers.len() < total {
            info!(dropped = total - papers.len(), "Dropped papers without a year");
        }
        Self {
            papers,
            topics: None,
        }
    }

    /// Load the clustered CSV and, when present, the topic sidecar.
    pub fn load(csv_path: &Path, topics_path: Option<&Path>) -> Result<Self> {
        let papers: Vec<ClusteredPaper> = table::read_csv(csv_path)?;
        let mut dataset = Self::from_papers(papers);

        if let Some(path) = topics_path.filter(|p| p.exists()) {
            match TopicSummary::load(path) {
                Ok(topics) => dataset.topics = Some(topics),
                Err(e) => warn!(path = %path.display(), error = %e, "Ignoring unreadable topic sidecar"),
            }
        }

        info!(papers = dataset.len(), path = %csv_path.display(), "Dataset loaded");
        Ok(dataset)
    }

    pub fn with_topics(mut self, topics: TopicSummary) -> Self {
        self.topics = Some(topics);
        self
    }

    pub fn topics(&self) -> Option<&TopicSummary> {
        self.topics.as_ref()
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    pub fn papers(&self) -> &[ClusteredPaper] {
        &self.papers
    }

    /// Row by its position in the dataset
    pub fn paper(&self, index: usize) -> Option<&ClusteredPaper> {
        self.papers.get(index)
    }

    /// Earliest and latest publication year
    pub fn year_bounds(&self) -> Option<(i32, i32)> {
        let years = self.papers.iter().filter_map(|p| p.year);
        let min = years.clone().min()?;
        let max = years.max()?;
        Some((min, max))
    }

    /// Rows passing every filter, with their dataset positions.
    pub fn filter<'a>(&'a self, filters: &'a Filters) -> impl Iterator<Item = (usize, &'a ClusteredPaper)> + 'a {
        let (lo, hi) = filters.year_range(self.year_bounds());
        let keyword = filters.keyword().map(str::to_lowercase);

        self.papers
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.year.is_some_and(|y| y >= lo && y <= hi))
            .filter(move |(_, p)| filters.required_flags().all(|f| p.flag(f)))
            .filter(move |(_, p)| match keyword.as_deref() {
                None => true,
                Some(kw) => contains_lower(p.title.as_deref(), kw) || contains_lower(p.abstract_text.as_deref(), kw),
            })
    }

    /// Aggregates over the filtered rows.
    pub fn summarize(&self, filters: &Filters) -> Summary {
        let bounds = self.year_bounds();
        let (lo, hi) = filters.year_range(bounds);
        let filtered: Vec<(usize, &ClusteredPaper)> = self.filter(filters).collect();

        let mut per_year: BTreeMap<i32, usize> = BTreeMap::new();
        for (_, p) in &filtered {
            if let Some(year) = p.year {
                *per_year.entry(year).or_insert(0) += 1;
            }
        }

        let imaging_counts = Flag::IMAGING
            .into_iter()
            .map(|flag| FlagCount {
                flag,
                column: flag.column(),
                count: filtered.iter().filter(|(_, p)| p.flag(flag)).count(),
            })
            .collect();

        Summary {
            total_papers: self.len(),
            filtered_papers: filtered.len(),
            year_span: bounds,
            year_range: (lo, hi),
            papers_per_year: per_year
                .into_iter()
                .map(|(year, count)| YearCount { year, count })
                .collect(),
            imaging_counts,
            top_affiliations: top_affiliations(filtered.iter().map(|(_, p)| *p), TOP_AFFILIATIONS),
        }
    }

    /// Table rows for the filtered set
    pub fn table(&self, filters: &Filters) -> Vec<TableRow> {
        self.filter(filters).map(|(i, p)| TableRow::new(i, p)).collect()
    }
}

fn contains_lower(text: Option<&str>, needle_lower: &str) -> bool {
    text.is_some_and(|t| t.to_lowercase().contains(needle_lower))
}

/// Affiliation strings ranked by frequency; missing ones count as "Unknown".
pub fn top_affiliations<'a>(
    papers: impl Iterator<Item = &'a ClusteredPaper>,
    limit: usize,
) -> Vec<AffiliationCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for p in papers {
        let affiliation = p
            .affiliations
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(UNKNOWN_AFFILIATION);
        *counts.entry(affiliation).or_insert(0) += 1;
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(affiliation, count)| AffiliationCount {
            affiliation: affiliation.to_string(),
            count,
        })
        .collect()
}

/// User-selected filters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    /// Imaging flags that must all be set
    pub imaging: Vec<Flag>,
    /// Treatment flags that must all be set
    pub treatments: Vec<Flag>,
    /// Case-insensitive substring of title or abstract
    pub keyword: Option<String>,
}

impl Filters {
    /// Build filters, rejecting flags outside their group.
    pub fn new(
        year_from: Option<i32>,
        year_to: Option<i32>,
        imaging: Vec<Flag>,
        treatments: Vec<Flag>,
        keyword: Option<String>,
    ) -> Result<Self> {
        if let Some(f) = imaging.iter().find(|f| !Flag::IMAGING.contains(f)) {
            return Err(LitError::Validation(format!("{} is not an imaging modality", f)));
        }
        if let Some(f) = treatments.iter().find(|f| !Flag::TREATMENT.contains(f)) {
            return Err(LitError::Validation(format!("{} is not a treatment", f)));
        }
        Ok(Self {
            year_from,
            year_to,
            imaging,
            treatments,
            keyword,
        })
    }

    /// Parse a URL query string.
    ///
    /// Flags may repeat (`imaging=ct&imaging=mri`) or be comma-separated
    /// (`imaging=ct,mri`). Empty values are ignored.
    pub fn from_query(query: &str) -> Result<Self> {
        let mut year_from = None;
        let mut year_to = None;
        let mut imaging = Vec::new();
        let mut treatments = Vec::new();
        let mut keyword = None;

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match &*key {
                "year_from" => year_from = Some(parse_year(value)?),
                "year_to" => year_to = Some(parse_year(value)?),
                "imaging" => imaging.extend(parse_flags(value)?),
                "treatment" | "treatments" => treatments.extend(parse_flags(value)?),
                "keyword" | "q" => keyword = Some(value.to_string()),
                _ => {}
            }
        }

        dedup_flags(&mut imaging);
        dedup_flags(&mut treatments);
        Self::new(year_from, year_to, imaging, treatments, keyword)
    }

    /// Inclusive year range; unset ends fall back to the data bounds.
    pub fn year_range(&self, bounds: Option<(i32, i32)>) -> (i32, i32) {
        let (min, max) = bounds.unwrap_or((i32::MIN, i32::MAX));
        (self.year_from.unwrap_or(min), self.year_to.unwrap_or(max))
    }

    pub fn keyword(&self) -> Option<&str> {
        self.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn required_flags(&self) -> impl Iterator<Item = Flag> + '_ {
        self.imaging.iter().chain(self.treatments.iter()).copied()
    }

    pub fn is_selected(&self, flag: Flag) -> bool {
        self.required_flags().any(|f| f == flag)
    }
}

/// Drop repeated flags, keeping the first occurrence of each.
fn dedup_flags(flags: &mut Vec<Flag>) {
    let mut seen = HashSet::new();
    flags.retain(|f| seen.insert(*f));
}

fn parse_year(value: &str) -> Result<i32> {
    value
        .parse()
        .map_err(|_| LitError::Validation(format!("invalid year: {}", value)))
}

fn parse_flags(value: &str) -> Result<Vec<Flag>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<Flag>().map_err(LitError::Validation))
        .collect()
}

/// Papers published in one year
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearCount {
    pub year: i32,
    pub count: usize,
}

/// Papers with one flag set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagCount {
    pub flag: Flag,
    pub column: String,
    pub count: usize,
}

/// Papers sharing one affiliation string
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AffiliationCount {
    pub affiliation: String,
    pub count: usize,
}

/// Aggregates behind the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_papers: usize,
    pub filtered_papers: usize,
    /// Year bounds of the whole dataset
    pub year_span: Option<(i32, i32)>,
    /// Year range the filters applied
    pub year_range: (i32, i32),
    pub papers_per_year: Vec<YearCount>,
    pub imaging_counts: Vec<FlagCount>,
    pub top_affiliations: Vec<AffiliationCount>,
}

/// One line of the paper table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    pub index: usize,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub title: Option<String>,
    pub mentions_ct: bool,
    pub mentions_mri: bool,
    pub mentions_pet: bool,
    pub mentions_steroids: bool,
    pub mentions_biologics: bool,
    pub lda_topic: Option<u32>,
    pub kmeans_cluster: Option<u32>,
}

impl TableRow {
    fn new(index: usize, p: &ClusteredPaper) -> Self {
        Self {
            index,
            year: p.year,
            journal: p.journal.clone(),
            title: p.title.clone(),
            mentions_ct: p.mentions_ct,
            mentions_mri: p.mentions_mri,
            mentions_pet: p.mentions_pet,
            mentions_steroids: p.mentions_steroids,
            mentions_biologics: p.mentions_biologics,
            lda_topic: p.lda_topic,
            kmeans_cluster: p.kmeans_cluster,
        }
    }
}
