//! Topic modeling and clustering of abstracts.
//!
//! The annotated CSV is vectorized with TF-IDF; an LDA model assigns each
//! paper its dominant topic and k-means over the same matrix assigns a
//! cluster. Both labels are appended to the rows, and the most characteristic
//! terms of every topic and cluster go to a JSON sidecar.

pub mod kmeans;
pub mod lda;
pub mod sparse;
pub mod tfidf;

use crate::config::ClusterConfig;
use crate::error::Result;
use crate::paper::{AnnotatedPaper, ClusteredPaper};
use crate::table;
use chrono::Local;
use kmeans::KMeans;
use lda::Lda;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tfidf::TfidfVectorizer;
use tracing::{info, warn};

/// Characteristic terms of one topic or cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermGroup {
    pub id: usize,
    /// Papers labelled with this topic/cluster
    pub size: usize,
    pub terms: Vec<String>,
}

/// Sidecar written next to the clustered CSV
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub generated_at: String,
    pub documents: usize,
    pub vocabulary_size: usize,
    pub topics: Vec<TermGroup>,
    pub clusters: Vec<TermGroup>,
}

impl TopicSummary {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Terms of a topic, joined for display
    pub fn topic_label(&self, topic: u32) -> Option<String> {
        self.topics
            .iter()
            .find(|t| t.id as u32 == topic)
            .map(|t| t.terms.iter().take(5).cloned().collect::<Vec<_>>().join(", "))
    }
}

/// Label every paper with an LDA topic and a k-means cluster.
pub fn cluster_papers(
    papers: Vec<AnnotatedPaper>,
    config: &ClusterConfig,
) -> Result<(Vec<ClusteredPaper>, TopicSummary)> {
    config.validate()?;

    let texts: Vec<&str> = papers
        .iter()
        .map(|p| p.abstract_text.as_deref().unwrap_or(""))
        .collect();

    let mut vectorizer = TfidfVectorizer::new(config.max_features);
    let matrix = vectorizer.fit_transform(&texts);
    info!(
        documents = matrix.n_rows(),
        features = matrix.n_cols,
        nnz = matrix.nnz(),
        "TF-IDF matrix built"
    );

    let lda = Lda::fit(&matrix, config.n_topics, config.lda_max_iter, config.seed);
    let topics = lda.dominant_topics(&matrix, config.seed);

    let km = KMeans::fit(
        &matrix,
        config.n_clusters,
        config.n_init,
        config.kmeans_max_iter,
        config.seed,
    );
    info!(
        clusters = km.centroids.len(),
        inertia = km.inertia,
        iterations = km.iterations,
        "k-means fitted"
    );

    let vocab = vectorizer.vocabulary();
    let terms = |indices: Vec<usize>| -> Vec<String> {
        indices.into_iter().map(|i| vocab[i].clone()).collect()
    };

    let mut topic_sizes = vec![0; lda.n_topics()];
    for &t in &topics {
        topic_sizes[t] += 1;
    }

    let summary = TopicSummary {
        generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        documents: papers.len(),
        vocabulary_size: vocab.len(),
        topics: lda
            .top_terms(config.top_terms)
            .into_iter()
            .enumerate()
            .map(|(id, idx)| TermGroup {
                id,
                size: topic_sizes[id],
                terms: terms(idx),
            })
            .collect(),
        clusters: km
            .centroids
            .iter()
            .zip(km.cluster_sizes())
            .enumerate()
            .map(|(id, (centroid, size))| TermGroup {
                id,
                size,
                terms: terms(lda::top_indices(centroid, config.top_terms)),
            })
            .collect(),
    };

    let clustered = papers
        .into_iter()
        .zip(topics)
        .zip(km.assignments.iter().copied())
        .map(|((paper, topic), cluster)| ClusteredPaper::new(paper, topic, cluster))
        .collect();

    Ok((clustered, summary))
}

/// Read the annotated CSV, cluster it, and write the clustered CSV and topic sidecar.
pub fn cluster_file(
    input: &Path,
    output: &Path,
    topics_out: &Path,
    config: &ClusterConfig,
) -> Result<TopicSummary> {
    info!(input = %input.display(), "Clustering papers");
    let papers: Vec<AnnotatedPaper> = table::read_csv(input)?;
    if papers.is_empty() {
        warn!(input = %input.display(), "No papers to cluster");
    }

    let (clustered, summary) = cluster_papers(papers, config)?;

    // An empty run still replaces both outputs
    table::write_csv(output, &clustered)?;
    summary.save(topics_out)?;
    for topic in &summary.topics {
        info!(topic = topic.id, size = topic.size, terms = %topic.terms.join(" "), "LDA topic");
    }
    info!(output = %output.display(), papers = clustered.len(), "Clustering complete");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn paper(id: &str, text: &str) -> AnnotatedPaper {
        AnnotatedPaper {
            id: Some(id.to_string()),
            year: Some(2020),
            abstract_text: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn corpus() -> Vec<AnnotatedPaper> {
        vec![
            paper("1", "tocilizumab infliximab biologic therapy remission"),
            paper("2", "infliximab tocilizumab biologic relapse remission"),
            paper("3", "biologic tocilizumab therapy remission relapse"),
            paper("4", "angiography stenosis aorta imaging lumen"),
            paper("5", "aorta stenosis angiography imaging thickening"),
            paper("6", "imaging aorta lumen stenosis angiography"),
        ]
    }

    #[test]
    fn test_cluster_papers_labels_every_row() -> Result<()> {
        let config = ClusterConfig {
            n_topics: 2,
            n_clusters: 2,
            ..Default::default()
        };
        let (clustered, summary) = cluster_papers(corpus(), &config)?;

        assert_eq!(clustered.len(), 6);
        assert!(clustered.iter().all(|p| p.lda_topic.is_some_and(|t| t < 2)));
        assert!(clustered.iter().all(|p| p.kmeans_cluster.is_some_and(|c| c < 2)));

        // The therapy and imaging abstracts share no terms.
        let c = |i: usize| clustered[i].kmeans_cluster;
        assert_eq!(c(0), c(1));
        assert_eq!(c(1), c(2));
        assert_eq!(c(3), c(4));
        assert_eq!(c(4), c(5));
        assert_ne!(c(0), c(3));

        assert_eq!(summary.documents, 6);
        assert_eq!(summary.topics.len(), 2);
        assert_eq!(summary.clusters.iter().map(|g| g.size).sum::<usize>(), 6);
        Ok(())
    }

    #[test]
    fn test_more_clusters_than_papers() -> Result<()> {
        let (clustered, summary) = cluster_papers(corpus()[..2].to_vec(), &ClusterConfig::default())?;
        assert_eq!(clustered.len(), 2);
        assert_eq!(summary.clusters.len(), 2);
        Ok(())
    }

    #[test]
    fn test_cluster_file_writes_csv_and_sidecar() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("annotated.csv");
        let output = dir.path().join("clustered.csv");
        let topics = dir.path().join("topics.json");
        table::write_csv(&input, &corpus())?;

        let config = ClusterConfig {
            n_topics: 2,
            n_clusters: 3,
            n_init: 2,
            ..Default::default()
        };
        let summary = cluster_file(&input, &output, &topics, &config)?;

        let rows: Vec<ClusteredPaper> = table::read_csv(&output)?;
        assert_eq!(rows.len(), 6);
        assert!(rows.iter().all(|r| r.kmeans_cluster.is_some()));

        let loaded = TopicSummary::load(&topics)?;
        assert_eq!(loaded, summary);
        assert!(loaded.topic_label(0).is_some());
        Ok(())
    }

    #[test]
    fn test_empty_rerun_clears_previous_outputs() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("annotated.csv");
        let output = dir.path().join("clustered.csv");
        let topics = dir.path().join("topics.json");
        let config = ClusterConfig {
            n_topics: 2,
            n_clusters: 2,
            n_init: 2,
            ..Default::default()
        };

        table::write_csv(&input, &corpus())?;
        cluster_file(&input, &output, &topics, &config)?;

        // Header-only input, as left by an upstream stage with no rows
        std::fs::write(&input, "id,title,year,abstract\n")?;
        let summary = cluster_file(&input, &output, &topics, &config)?;
        assert_eq!(summary.documents, 0);

        let rows: Vec<ClusteredPaper> = table::read_csv(&output)?;
        assert!(rows.is_empty());
        assert_eq!(TopicSummary::load(&topics)?.documents, 0);
        Ok(())
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ClusterConfig {
            n_topics: 0,
            ..Default::default()
        };
        assert!(cluster_papers(corpus(), &config).is_err());
    }
}
