//! Keyword annotation of abstracts.
//!
//! Each paper gets boolean flags for imaging modalities, treatments and
//! complications (case-insensitive substring match against keyword tables),
//! sex mentions (whole-word match) and an age range pulled out of phrases like
//! "a 23-year-old woman" or "aged 41".

use crate::error::Result;
use crate::paper::{AnnotatedPaper, Annotations, Paper};
use crate::table;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info};

pub const CT_KEYWORDS: &[&str] = &[" CT ", "CT angiography", "computed tomography"];
pub const MRI_KEYWORDS: &[&str] = &[" MRI ", "magnetic resonance imaging"];
pub const PET_KEYWORDS: &[&str] = &[" PET ", "positron emission tomography"];
pub const ULTRASOUND_KEYWORDS: &[&str] = &["ultrasound", "Doppler"];

pub const STEROID_KEYWORDS: &[&str] = &["steroid", "prednisone", "prednisolone", "glucocorticoid"];
pub const BIOLOGIC_KEYWORDS: &[&str] = &["infliximab", "tocilizumab", "adalimumab", "etanercept"];
pub const SURGERY_KEYWORDS: &[&str] = &[
    "bypass surgery",
    "revascularization",
    "surgical repair",
    "stent",
    "stenting",
];

pub const AORTIC_ANEURYSM_KEYWORDS: &[&str] = &["aortic aneurysm"];
pub const CORONARY_KEYWORDS: &[&str] = &["coronary artery", "coronary involvement"];

pub const FEMALE_WORDS: &[&str] = &["female", "woman", "women", "girl"];
pub const MALE_WORDS: &[&str] = &["male", "man", "men", "boy"];

static AGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})-year-old\b|\bage[d]?\s+(\d{1,2})\b").expect("valid age regex")
});

static FEMALE_PATTERN: Lazy<Regex> = Lazy::new(|| word_pattern(FEMALE_WORDS));
static MALE_PATTERN: Lazy<Regex> = Lazy::new(|| word_pattern(MALE_WORDS));

fn word_pattern(words: &[&str]) -> Regex {
    let alternation = words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).expect("valid word regex")
}

/// True when any pattern occurs in `text`, ignoring case.
pub fn has_any(text: &str, patterns: &[&str]) -> bool {
    let text_lower = text.to_lowercase();
    patterns
        .iter()
        .any(|p| text_lower.contains(&p.to_lowercase()))
}

/// Smallest and largest age mentioned in `text`, or `None` when there is none.
pub fn extract_age_range(text: &str) -> Option<(u32, u32)> {
    let ages: Vec<u32> = AGE_PATTERN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .filter_map(|m| m.as_str().parse().ok())
        .collect();

    let min = ages.iter().copied().min()?;
    let max = ages.iter().copied().max()?;
    Some((min, max))
}

/// Compute every annotation for one abstract.
pub fn annotate_text(text: &str) -> Annotations {
    let (age_min, age_max) = match extract_age_range(text) {
        Some((lo, hi)) => (Some(lo), Some(hi)),
        None => (None, None),
    };

    Annotations {
        ct: has_any(text, CT_KEYWORDS),
        mri: has_any(text, MRI_KEYWORDS),
        pet: has_any(text, PET_KEYWORDS),
        ultrasound: has_any(text, ULTRASOUND_KEYWORDS),
        steroids: has_any(text, STEROID_KEYWORDS),
        biologics: has_any(text, BIOLOGIC_KEYWORDS),
        surgery: has_any(text, SURGERY_KEYWORDS),
        aortic_aneurysm: has_any(text, AORTIC_ANEURYSM_KEYWORDS),
        coronary_involvement: has_any(text, CORONARY_KEYWORDS),
        age_min,
        age_max,
        female: FEMALE_PATTERN.is_match(text),
        male: MALE_PATTERN.is_match(text),
    }
}

/// Annotate one paper; a missing abstract is treated as empty text.
pub fn annotate(paper: Paper) -> AnnotatedPaper {
    let ann = annotate_text(paper.abstract_text.as_deref().unwrap_or(""));
    AnnotatedPaper::new(paper, ann)
}

/// Per-flag counts over an annotated set, for progress reporting
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AnnotationStats {
    pub papers: usize,
    pub imaging: usize,
    pub treatment: usize,
    pub complication: usize,
    pub sex: usize,
    pub with_age: usize,
}

impl AnnotationStats {
    pub fn collect(papers: &[AnnotatedPaper]) -> Self {
        Self {
            papers: papers.len(),
            imaging: papers.iter().filter(|p| p.imaging_mentioned()).count(),
            treatment: papers.iter().filter(|p| p.treatment_mentioned()).count(),
            complication: papers.iter().filter(|p| p.complication_mentioned()).count(),
            sex: papers.iter().filter(|p| p.sex_mentioned()).count(),
            with_age: papers.iter().filter(|p| p.age_min.is_some()).count(),
        }
    }
}

/// Read the raw CSV, annotate every row and write the annotated CSV.
pub fn annotate_file(input: &Path, output: &Path) -> Result<AnnotationStats> {
    info!(input = %input.display(), "Annotating papers");

    let papers: Vec<Paper> = table::read_csv(input)?;
    let annotated: Vec<AnnotatedPaper> = papers.into_iter().map(annotate).collect();

    let stats = AnnotationStats::collect(&annotated);
    debug!(?stats, "Annotation counts");

    table::write_csv(output, &annotated)?;
    info!(
        output = %output.display(),
        papers = stats.papers,
        imaging = stats.imaging,
        treatment = stats.treatment,
        "Annotation complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_has_any_ignores_case() {
        assert!(has_any("Patients received Prednisolone daily", STEROID_KEYWORDS));
        assert!(has_any("treated with TOCILIZUMAB", BIOLOGIC_KEYWORDS));
        assert!(!has_any("no therapy reported", BIOLOGIC_KEYWORDS));
    }

    #[test]
    fn test_imaging_keywords_need_spacing_for_acronyms() {
        assert!(annotate_text("Findings on CT angiography were normal").ct);
        assert!(annotate_text("We used CT and MRI to follow up").ct);
        assert!(!annotate_text("CTLA-4 expression was measured").ct);
        assert!(annotate_text("a cardiac MRI scan").mri);
        assert!(annotate_text("FDG positron emission tomography").pet);
        assert!(annotate_text("Color Doppler showed stenosis").ultrasound);
    }

    #[test]
    fn test_treatment_and_complication_flags() {
        let ann = annotate_text(
            "After stenting of the subclavian artery, a coronary artery lesion and an aortic aneurysm were found.",
        );
        assert!(ann.surgery);
        assert!(ann.coronary_involvement);
        assert!(ann.aortic_aneurysm);
        assert!(!ann.steroids);
        assert!(!ann.biologics);
    }

    #[test]
    fn test_extract_age_range() {
        assert_eq!(
            extract_age_range("A 23-year-old woman and her 45-year-old mother"),
            Some((23, 45))
        );
        assert_eq!(extract_age_range("Patients aged 12 to 30"), Some((12, 12)));
        assert_eq!(extract_age_range("Onset at AGE 17 was noted"), Some((17, 17)));
        assert_eq!(extract_age_range("no ages here"), None);
        assert_eq!(extract_age_range("a 105-year-old"), None);
    }

    #[test]
    fn test_sex_words_match_whole_words() {
        let ann = annotate_text("A 30-year-old woman presented with claudication.");
        assert!(ann.female);
        assert!(!ann.male);

        let ann = annotate_text("Human leukocyte antigen typing in females");
        assert!(!ann.male);
        assert!(!ann.female);

        let ann = annotate_text("Both men and women were enrolled.");
        assert!(ann.female);
        assert!(ann.male);
    }

    #[test]
    fn test_missing_abstract_yields_no_flags() {
        let annotated = annotate(Paper {
            title: Some("Untitled".to_string()),
            ..Default::default()
        });
        assert!(!annotated.imaging_mentioned());
        assert!(!annotated.sex_mentioned());
        assert_eq!(annotated.age_min, None);
        assert_eq!(annotated.title.as_deref(), Some("Untitled"));
    }

    #[test]
    fn test_annotate_file() -> Result<()> {
        let dir = tempdir()?;
        let raw = dir.path().join("raw.csv");
        let out = dir.path().join("processed").join("annotated.csv");

        let papers = vec![
            Paper {
                id: Some("1".to_string()),
                year: Some(2020),
                abstract_text: Some("A 19-year-old girl treated with infliximab.".to_string()),
                ..Default::default()
            },
            Paper {
                id: Some("2".to_string()),
                year: Some(2021),
                abstract_text: Some("Ultrasound follow-up of 40 patients.".to_string()),
                ..Default::default()
            },
        ];
        table::write_csv(&raw, &papers)?;

        let stats = annotate_file(&raw, &out)?;
        assert_eq!(stats.papers, 2);
        assert_eq!(stats.imaging, 1);
        assert_eq!(stats.treatment, 1);
        assert_eq!(stats.with_age, 1);

        let rows: Vec<AnnotatedPaper> = table::read_csv(&out)?;
        assert_eq!(rows.len(), 2);
        assert!(rows[0].mentions_biologics);
        assert!(rows[0].mentions_female);
        assert_eq!(rows[0].age_min, Some(19));
        assert!(rows[1].mentions_ultrasound);
        Ok(())
    }
}
