//! Pipeline defaults and on-disk layout.
//!
//! Each stage reads the previous stage's CSV and writes its own; the file
//! names below are what the CLI uses unless told otherwise.

use crate::error::{LitError, Result};
use std::path::{Path, PathBuf};

/// Default data directory, relative to the working directory
pub const DEFAULT_DATA_DIR: &str = "data";

const RAW_FILE: &str = "takayasu_europepmc_raw.csv";
const ANNOTATED_FILE: &str = "takayasu_annotated.csv";
const CLUSTERED_FILE: &str = "takayasu_annotated_clustered.csv";
const TOPICS_FILE: &str = "takayasu_topics.json";

/// Locations of every stage's input and output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
}

impl DataLayout {
    /// Layout rooted at `data_dir` (`<data_dir>/raw`, `<data_dir>/processed`)
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            raw_dir: data_dir.join("raw"),
            processed_dir: data_dir.join("processed"),
        }
    }

    pub fn raw_csv(&self) -> PathBuf {
        self.raw_dir.join(RAW_FILE)
    }

    pub fn annotated_csv(&self) -> PathBuf {
        self.processed_dir.join(ANNOTATED_FILE)
    }

    pub fn clustered_csv(&self) -> PathBuf {
        self.processed_dir.join(CLUSTERED_FILE)
    }

    pub fn topics_json(&self) -> PathBuf {
        self.processed_dir.join(TOPICS_FILE)
    }
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

/// Parameters of the clustering stage
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    /// Vocabulary size cap for the TF-IDF vectorizer
    pub max_features: usize,
    /// Number of LDA topics
    pub n_topics: usize,
    /// LDA EM passes over the corpus
    pub lda_max_iter: usize,
    /// Number of k-means clusters
    pub n_clusters: usize,
    /// k-means restarts; the lowest-inertia run wins
    pub n_init: usize,
    /// k-means iteration cap per restart
    pub kmeans_max_iter: usize,
    /// Seed shared by LDA and k-means
    pub seed: u64,
    /// Terms reported per topic/cluster in the sidecar
    pub top_terms: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            max_features: 5000,
            n_topics: 5,
            lda_max_iter: 10,
            n_clusters: 6,
            n_init: 10,
            kmeans_max_iter: 300,
            seed: 42,
            top_terms: 10,
        }
    }
}

impl ClusterConfig {
    /// Reject parameter combinations the models cannot fit
    pub fn validate(&self) -> Result<()> {
        if self.max_features == 0 {
            return Err(LitError::Validation("max_features must be at least 1".to_string()));
        }
        if self.n_topics == 0 {
            return Err(LitError::Validation("n_topics must be at least 1".to_string()));
        }
        if self.n_clusters == 0 {
            return Err(LitError::Validation("n_clusters must be at least 1".to_string()));
        }
        if self.n_init == 0 {
            return Err(LitError::Validation("n_init must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = DataLayout::new("/tmp/tak");
        assert_eq!(layout.raw_csv(), PathBuf::from("/tmp/tak/raw/takayasu_europepmc_raw.csv"));
        assert_eq!(
            layout.clustered_csv(),
            PathBuf::from("/tmp/tak/processed/takayasu_annotated_clustered.csv")
        );
    }

    #[test]
    fn test_validate_rejects_zero_clusters() {
        let config = ClusterConfig {
            n_clusters: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LitError::Validation(_))));
        assert!(ClusterConfig::default().validate().is_ok());
    }
}
