//! Paper records as they move through the pipeline.
//!
//! Every stage writes one CSV row per paper. The raw stage writes [`Paper`],
//! the annotator appends keyword flags and an age range ([`AnnotatedPaper`]),
//! and the clusterer appends topic and cluster labels ([`ClusteredPaper`]).
//! Readers ignore columns they do not know, so each stage can read any later
//! stage's file.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// One publication as flattened from the search API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: Option<String>,
    pub source: Option<String>,
    pub title: Option<String>,
    pub journal: Option<String>,
    #[serde(default, deserialize_with = "de_opt_year")]
    pub year: Option<i32>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    /// MeSH descriptor names joined with `;`
    pub mesh_terms: Option<String>,
    pub affiliations: Option<String>,
}

/// Keyword flags and age range extracted from one abstract
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    pub ct: bool,
    pub mri: bool,
    pub pet: bool,
    pub ultrasound: bool,
    pub steroids: bool,
    pub biologics: bool,
    pub surgery: bool,
    pub aortic_aneurysm: bool,
    pub coronary_involvement: bool,
    pub age_min: Option<u32>,
    pub age_max: Option<u32>,
    pub female: bool,
    pub male: bool,
}

/// Output row of the annotation stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedPaper {
    pub id: Option<String>,
    pub source: Option<String>,
    pub title: Option<String>,
    pub journal: Option<String>,
    #[serde(default, deserialize_with = "de_opt_year")]
    pub year: Option<i32>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub mesh_terms: Option<String>,
    pub affiliations: Option<String>,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_ct: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_mri: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_pet: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_ultrasound: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_steroids: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_biologics: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_surgery: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_aortic_aneurysm: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_coronary_involvement: bool,
    #[serde(default, deserialize_with = "de_opt_count")]
    pub age_min: Option<u32>,
    #[serde(default, deserialize_with = "de_opt_count")]
    pub age_max: Option<u32>,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_female: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_male: bool,
}

impl AnnotatedPaper {
    pub fn new(paper: Paper, ann: Annotations) -> Self {
        Self {
            id: paper.id,
            source: paper.source,
            title: paper.title,
            journal: paper.journal,
            year: paper.year,
            abstract_text: paper.abstract_text,
            mesh_terms: paper.mesh_terms,
            affiliations: paper.affiliations,
            mentions_ct: ann.ct,
            mentions_mri: ann.mri,
            mentions_pet: ann.pet,
            mentions_ultrasound: ann.ultrasound,
            mentions_steroids: ann.steroids,
            mentions_biologics: ann.biologics,
            mentions_surgery: ann.surgery,
            mentions_aortic_aneurysm: ann.aortic_aneurysm,
            mentions_coronary_involvement: ann.coronary_involvement,
            age_min: ann.age_min,
            age_max: ann.age_max,
            mentions_female: ann.female,
            mentions_male: ann.male,
        }
    }
}

/// Output row of the clustering stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusteredPaper {
    pub id: Option<String>,
    pub source: Option<String>,
    pub title: Option<String>,
    pub journal: Option<String>,
    #[serde(default, deserialize_with = "de_opt_year")]
    pub year: Option<i32>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub mesh_terms: Option<String>,
    pub affiliations: Option<String>,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_ct: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_mri: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_pet: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_ultrasound: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_steroids: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_biologics: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_surgery: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_aortic_aneurysm: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_coronary_involvement: bool,
    #[serde(default, deserialize_with = "de_opt_count")]
    pub age_min: Option<u32>,
    #[serde(default, deserialize_with = "de_opt_count")]
    pub age_max: Option<u32>,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_female: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mentions_male: bool,
    #[serde(default, deserialize_with = "de_opt_count")]
    pub lda_topic: Option<u32>,
    #[serde(default, deserialize_with = "de_opt_count")]
    pub kmeans_cluster: Option<u32>,
}

impl ClusteredPaper {
    pub fn new(paper: AnnotatedPaper, lda_topic: usize, kmeans_cluster: usize) -> Self {
        Self {
            id: paper.id,
            source: paper.source,
            title: paper.title,
            journal: paper.journal,
            year: paper.year,
            abstract_text: paper.abstract_text,
            mesh_terms: paper.mesh_terms,
            affiliations: paper.affiliations,
            mentions_ct: paper.mentions_ct,
            mentions_mri: paper.mentions_mri,
            mentions_pet: paper.mentions_pet,
            mentions_ultrasound: paper.mentions_ultrasound,
            mentions_steroids: paper.mentions_steroids,
            mentions_biologics: paper.mentions_biologics,
            mentions_surgery: paper.mentions_surgery,
            mentions_aortic_aneurysm: paper.mentions_aortic_aneurysm,
            mentions_coronary_involvement: paper.mentions_coronary_involvement,
            age_min: paper.age_min,
            age_max: paper.age_max,
            mentions_female: paper.mentions_female,
            mentions_male: paper.mentions_male,
            lda_topic: u32::try_from(lda_topic).ok(),
            kmeans_cluster: u32::try_from(kmeans_cluster).ok(),
        }
    }
}

/// A boolean annotation column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    Ct,
    Mri,
    Pet,
    Ultrasound,
    Steroids,
    Biologics,
    Surgery,
    AorticAneurysm,
    CoronaryInvolvement,
    Female,
    Male,
}

impl Flag {
    pub const IMAGING: [Flag; 4] = [Flag::Ct, Flag::Mri, Flag::Pet, Flag::Ultrasound];
    pub const TREATMENT: [Flag; 3] = [Flag::Steroids, Flag::Biologics, Flag::Surgery];
    pub const COMPLICATION: [Flag; 2] = [Flag::AorticAneurysm, Flag::CoronaryInvolvement];
    pub const SEX: [Flag; 2] = [Flag::Female, Flag::Male];

    pub const ALL: [Flag; 11] = [
        Flag::Ct,
        Flag::Mri,
        Flag::Pet,
        Flag::Ultrasound,
        Flag::Steroids,
        Flag::Biologics,
        Flag::Surgery,
        Flag::AorticAneurysm,
        Flag::CoronaryInvolvement,
        Flag::Female,
        Flag::Male,
    ];

    /// Short key, e.g. `ct` or `aortic_aneurysm`
    pub fn key(self) -> &'static str {
        match self {
            Flag::Ct => "ct",
            Flag::Mri => "mri",
            Flag::Pet => "pet",
            Flag::Ultrasound => "ultrasound",
            Flag::Steroids => "steroids",
            Flag::Biologics => "biologics",
            Flag::Surgery => "surgery",
            Flag::AorticAneurysm => "aortic_aneurysm",
            Flag::CoronaryInvolvement => "coronary_involvement",
            Flag::Female => "female",
            Flag::Male => "male",
        }
    }

    /// CSV column name, e.g. `mentions_ct`
    pub fn column(self) -> String {
        format!("mentions_{}", self.key())
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Flag {
    type Err = String;

    /// Accepts the short key (`ct`), the kebab form (`aortic-aneurysm`) or the
    /// column name (`mentions_ct`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace('-', "_");
        let key = key.strip_prefix("mentions_").unwrap_or(&key);
        Flag::ALL
            .into_iter()
            .find(|f| f.key() == key)
            .ok_or_else(|| format!("unknown flag: {}", s))
    }
}

macro_rules! impl_flag_access {
    ($ty:ty) => {
        impl $ty {
            /// Value of one boolean annotation column
            pub fn flag(&self, flag: Flag) -> bool {
                match flag {
                    Flag::Ct => self.mentions_ct,
                    Flag::Mri => self.mentions_mri,
                    Flag::Pet => self.mentions_pet,
                    Flag::Ultrasound => self.mentions_ultrasound,
                    Flag::Steroids => self.mentions_steroids,
                    Flag::Biologics => self.mentions_biologics,
                    Flag::Surgery => self.mentions_surgery,
                    Flag::AorticAneurysm => self.mentions_aortic_aneurysm,
                    Flag::CoronaryInvolvement => self.mentions_coronary_involvement,
                    Flag::Female => self.mentions_female,
                    Flag::Male => self.mentions_male,
                }
            }

            pub fn imaging_mentioned(&self) -> bool {
                Flag::IMAGING.into_iter().any(|f| self.flag(f))
            }

            pub fn treatment_mentioned(&self) -> bool {
                Flag::TREATMENT.into_iter().any(|f| self.flag(f))
            }

            pub fn complication_mentioned(&self) -> bool {
                Flag::COMPLICATION.into_iter().any(|f| self.flag(f))
            }

            pub fn sex_mentioned(&self) -> bool {
                Flag::SEX.into_iter().any(|f| self.flag(f))
            }
        }
    };
}

impl_flag_access!(AnnotatedPaper);
impl_flag_access!(ClusteredPaper);

/// Boolean cell: `true`/`True`/`1` and `false`/`False`/`0`; empty reads as false.
fn de_flag<'de, D>(de: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(de)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(false),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(false),
        Some(v) => Err(serde::de::Error::custom(format!("invalid boolean: {}", v))),
    }
}

/// Year cell; tolerates float spellings such as `2019.0`. Anything else reads as missing.
fn de_opt_year<'de, D>(de: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(de)?;
    let Some(v) = raw.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if let Ok(year) = v.parse::<i32>() {
        return Ok(Some(year));
    }
    Ok(match v.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() <= i32::MAX as f64 => Some(f as i32),
        _ => None,
    })
}

/// Non-negative integer cell; tolerates float spellings such as `34.0`.
fn de_opt_count<'de, D>(de: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(de)?;
    let Some(v) = raw.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if let Ok(n) = v.parse::<u32>() {
        return Ok(Some(n));
    }
    match v.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => {
            Ok(Some(f as u32))
        }
        Ok(f) if f.is_nan() => Ok(None),
        _ => Err(serde::de::Error::custom(format!("invalid count: {}", v))),
    }
}
