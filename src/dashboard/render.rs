//! HTML and plain-text rendering of dashboard aggregates.

use super::{Dataset, Filters, Summary, TableRow};
use crate::error::Result;
use crate::paper::{ClusteredPaper, Flag};
use minijinja::Environment;
use serde::Serialize;
use std::fmt::Write;

const PAGE: &str = "dashboard.html";

/// Template environment for the dashboard page. `.html` templates autoescape.
pub fn template_env() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template(PAGE, include_str!("templates/dashboard.html"))?;
    Ok(env)
}

#[derive(Serialize)]
struct YearInputs {
    min: Option<i32>,
    max: Option<i32>,
    lo: Option<i32>,
    hi: Option<i32>,
}

#[derive(Serialize)]
struct FlagOption {
    key: &'static str,
    checked: bool,
}

#[derive(Serialize)]
struct Bar {
    label: String,
    count: usize,
    width: usize,
}

#[derive(Serialize)]
struct Chart {
    title: &'static str,
    bars: Vec<Bar>,
}

#[derive(Serialize)]
struct Detail {
    title: String,
    journal: String,
    year: Option<i32>,
    topic_terms: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: String,
}

#[derive(Serialize)]
struct PageContext<'a> {
    summary: &'a Summary,
    rows: &'a [TableRow],
    span: String,
    years: YearInputs,
    imaging: Vec<FlagOption>,
    treatments: Vec<FlagOption>,
    keyword: &'a str,
    query: String,
    charts: Vec<Chart>,
    detail: Option<Detail>,
}

fn chart(title: &'static str, bars: impl IntoIterator<Item = (String, usize)>) -> Chart {
    let bars: Vec<(String, usize)> = bars.into_iter().collect();
    let max = bars.iter().map(|(_, n)| *n).max().unwrap_or(0).max(1);
    Chart {
        title,
        bars: bars
            .into_iter()
            .map(|(label, count)| Bar {
                label,
                count,
                width: count * 400 / max,
            })
            .collect(),
    }
}

fn options(flags: impl IntoIterator<Item = Flag>, filters: &Filters) -> Vec<FlagOption> {
    flags
        .into_iter()
        .map(|flag| FlagOption {
            key: flag.key(),
            checked: filters.is_selected(flag),
        })
        .collect()
}

fn detail(dataset: &Dataset, paper: &ClusteredPaper) -> Detail {
    Detail {
        title: paper.title.clone().unwrap_or_else(|| "(untitled)".to_string()),
        journal: paper.journal.clone().unwrap_or_default(),
        year: paper.year,
        topic_terms: paper
            .lda_topic
            .and_then(|t| dataset.topics().and_then(|s| s.topic_label(t))),
        abstract_text: paper
            .abstract_text
            .clone()
            .unwrap_or_else(|| "No abstract.".to_string()),
    }
}

/// Query string that reproduces `filters`, without a selected paper.
pub fn filter_query(filters: &Filters) -> String {
    let mut ser = url::form_urlencoded::Serializer::new(String::new());
    if let Some(y) = filters.year_from {
        ser.append_pair("year_from", &y.to_string());
    }
    if let Some(y) = filters.year_to {
        ser.append_pair("year_to", &y.to_string());
    }
    for flag in &filters.imaging {
        ser.append_pair("imaging", flag.key());
    }
    for flag in &filters.treatments {
        ser.append_pair("treatment", flag.key());
    }
    if let Some(kw) = filters.keyword() {
        ser.append_pair("keyword", kw);
    }
    ser.finish()
}

/// Full dashboard page.
pub fn page(
    env: &Environment<'_>,
    dataset: &Dataset,
    filters: &Filters,
    summary: &Summary,
    rows: &[TableRow],
    selected: Option<&ClusteredPaper>,
) -> Result<String> {
    // Empty dataset: leave the year inputs blank
    let years = match summary.year_span {
        Some((min, max)) => YearInputs {
            min: Some(min),
            max: Some(max),
            lo: Some(summary.year_range.0),
            hi: Some(summary.year_range.1),
        },
        None => YearInputs {
            min: None,
            max: None,
            lo: None,
            hi: None,
        },
    };
    let span = summary
        .year_span
        .map(|(a, b)| format!("{}–{}", a, b))
        .unwrap_or_else(|| "n/a".to_string());

    let ctx = PageContext {
        summary,
        rows,
        span,
        years,
        imaging: options(Flag::IMAGING, filters),
        treatments: options(Flag::TREATMENT, filters),
        keyword: filters.keyword().unwrap_or(""),
        query: filter_query(filters),
        charts: vec![
            chart(
                "Papers per year",
                summary.papers_per_year.iter().map(|y| (y.year.to_string(), y.count)),
            ),
            chart(
                "Imaging modality mentions",
                summary.imaging_counts.iter().map(|c| (c.flag.key().to_uppercase(), c.count)),
            ),
            chart(
                "Top affiliations",
                summary.top_affiliations.iter().map(|a| (a.affiliation.clone(), a.count)),
            ),
        ],
        detail: selected.map(|p| detail(dataset, p)),
    };

    Ok(env.get_template(PAGE)?.render(&ctx)?)
}

/// Plain-text report of the aggregates.
pub fn text_report(summary: &Summary) -> String {
    let mut out = String::new();
    let span = summary
        .year_span
        .map(|(a, b)| format!("{}-{}", a, b))
        .unwrap_or_else(|| "n/a".to_string());

    let _ = writeln!(out, "Total papers:    {}", summary.total_papers);
    let _ = writeln!(out, "Filtered papers: {}", summary.filtered_papers);
    let _ = writeln!(out, "Year span:       {}", span);

    let _ = writeln!(out, "\nPapers per year:");
    for y in &summary.papers_per_year {
        let _ = writeln!(out, "  {}  {:>5}", y.year, y.count);
    }

    let _ = writeln!(out, "\nImaging mentions:");
    for c in &summary.imaging_counts {
        let _ = writeln!(out, "  {:<11} {:>5}", c.flag.key().to_uppercase(), c.count);
    }

    let _ = writeln!(out, "\nTop affiliations:");
    for a in &summary.top_affiliations {
        let name: String = a.affiliation.chars().take(70).collect();
        let _ = writeln!(out, "  {:>5}  {}", a.count, name);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset::from_papers(vec![
            ClusteredPaper {
                year: Some(2018),
                title: Some("<b>Aortitis</b> & PET".to_string()),
                mentions_pet: true,
                lda_topic: Some(1),
                ..Default::default()
            },
            ClusteredPaper {
                year: Some(2021),
                title: Some("Tocilizumab".to_string()),
                affiliations: Some("Kyoto University".to_string()),
                mentions_biologics: true,
                ..Default::default()
            },
        ])
    }

    #[test]
    fn test_page_escapes_titles_and_marks_filters() {
        let ds = dataset();
        let filters = Filters::from_query("treatment=biologics").expect("valid query");
        let summary = ds.summarize(&Filters::default());
        let rows = ds.table(&Filters::default());
        let html = page(&template_env().expect("template"), &ds, &filters, &summary, &rows, ds.paper(0)).expect("render");

        assert!(html.contains("&lt;b&gt;Aortitis&lt;"));
        assert!(html.contains("&amp; PET"));
        assert!(!html.contains("<b>Aortitis"));
        assert!(html.contains("value=\"biologics\" checked"));
        assert!(html.contains("treatment=biologics&amp;paper=1"));
        assert!(html.contains("Kyoto University"));
    }

    #[test]
    fn test_filter_query_round_trips() {
        let filters = Filters::from_query("year_from=2000&imaging=ct,mri&keyword=aortic arch").expect("valid query");
        let query = filter_query(&filters);
        assert_eq!(Filters::from_query(&query).expect("valid query"), filters);
    }

    #[test]
    fn test_text_report() {
        let ds = dataset();
        let report = text_report(&ds.summarize(&Filters::default()));
        assert!(report.contains("Total papers:    2"));
        assert!(report.contains("Year span:       2018-2021"));
        assert!(report.contains("PET"));
        assert!(report.contains("Unknown"));
    }
}
