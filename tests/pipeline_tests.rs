//! End-to-end run of every stage through the CSV files.

use serde_json::json;
use takayasu_lit::annotate::annotate_file;
use takayasu_lit::cluster::cluster_file;
use takayasu_lit::config::{ClusterConfig, DataLayout};
use takayasu_lit::dashboard::{Dataset, Filters};
use takayasu_lit::europepmc::{EuropePmcClient, FetchOptions};
use takayasu_lit::paper::{AnnotatedPaper, Flag};
use takayasu_lit::table;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ABSTRACTS: [(&str, &str); 6] = [
    (
        "2008",
        "A 24-year-old woman underwent computed tomography angiography showing aortic stenosis.",
    ),
    (
        "2011",
        "Magnetic resonance imaging of the aorta revealed wall thickening and stenosis in young women.",
    ),
    (
        "2015",
        "Positron emission tomography detected aortic inflammation; prednisolone was started.",
    ),
    (
        "2017",
        "Tocilizumab and infliximab achieved remission in patients refractory to glucocorticoid therapy.",
    ),
    (
        "2019",
        "Biologic therapy with tocilizumab allowed steroid tapering and sustained remission.",
    ),
    (
        "2021",
        "Bypass surgery was performed for a thoracic aortic aneurysm in a 45-year-old man.",
    ),
];

#[tokio::test]
async fn test_fetch_annotate_cluster_load() {
    let server = MockServer::start().await;
    let records: Vec<_> = ABSTRACTS
        .iter()
        .enumerate()
        .map(|(i, (year, text))| {
            json!({
                "id": (i + 1).to_string(),
                "source": "MED",
                "title": format!("Takayasu arteritis report {}", i + 1),
                "journalTitle": "Clin Exp Rheumatol",
                "pubYear": year,
                "abstractText": text,
            })
        })
        .collect();

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hitCount": 6,
            "resultList": { "result": records }
        })))
        .mount(&server)
        .await;

    let dir = tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());

    let client = EuropePmcClient::new(FetchOptions {
        base_url: format!("{}/search", server.uri()),
        ..Default::default()
    })
    .expect("client");
    let fetched = client.fetch_all().await.expect("fetch");
    assert_eq!(fetched.write_raw(&layout.raw_csv()).expect("write raw"), 6);

    let stats = annotate_file(&layout.raw_csv(), &layout.annotated_csv()).expect("annotate");
    assert_eq!(stats.papers, 6);
    assert_eq!(stats.with_age, 2);

    let annotated: Vec<AnnotatedPaper> = table::read_csv(&layout.annotated_csv()).expect("read annotated");
    assert!(annotated[0].mentions_ct);
    assert_eq!(annotated[0].age_min, Some(24));
    assert!(annotated[3].mentions_biologics);
    assert!(annotated[5].mentions_surgery);
    assert!(annotated[5].mentions_aortic_aneurysm);

    let config = ClusterConfig {
        n_topics: 2,
        n_clusters: 2,
        n_init: 3,
        ..Default::default()
    };
    let summary = cluster_file(
        &layout.annotated_csv(),
        &layout.clustered_csv(),
        &layout.topics_json(),
        &config,
    )
    .expect("cluster");
    assert_eq!(summary.documents, 6);
    assert_eq!(summary.topics.len(), 2);

    let dataset = Dataset::load(&layout.clustered_csv(), Some(layout.topics_json().as_path())).expect("load");
    assert_eq!(dataset.len(), 6);
    assert!(dataset.topics().is_some());
    assert!(dataset.papers().iter().all(|p| p.lda_topic.is_some() && p.kmeans_cluster.is_some()));

    let filters = Filters::new(Some(2015), None, vec![], vec![Flag::Biologics], None).expect("filters");
    let report = dataset.summarize(&filters);
    assert_eq!(report.total_papers, 6);
    assert_eq!(report.filtered_papers, 2);
}

#[test]
fn test_missing_input_is_io_error() {
    let dir = tempdir().expect("tempdir");
    let err = annotate_file(&dir.path().join("missing.csv"), &dir.path().join("out.csv"))
        .expect_err("missing input");
    assert!(matches!(err, takayasu_lit::LitError::Io(_)));
}

#[test]
fn test_annotate_rerun_without_rows_replaces_output() {
    let dir = tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());

    let stale = AnnotatedPaper {
        id: Some("STALE".into()),
        year: Some(2010),
        abstract_text: Some("Old run.".into()),
        ..Default::default()
    };
    table::write_csv(&layout.annotated_csv(), &[stale]).expect("seed annotated");

    table::write_csv::<takayasu_lit::paper::Paper>(&layout.raw_csv(), &[]).expect("empty raw");
    let stats = annotate_file(&layout.raw_csv(), &layout.annotated_csv()).expect("annotate");
    assert_eq!(stats.papers, 0);

    let annotated: Vec<AnnotatedPaper> = table::read_csv(&layout.annotated_csv()).expect("read annotated");
    assert!(annotated.is_empty());
}
