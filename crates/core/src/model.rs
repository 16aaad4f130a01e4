use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::scan::listing_base;

pub const REPORT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FamilyKind {
    #[serde(rename = "input_model_data")]
    ModelAnalysis,
    #[serde(rename = "fix_data")]
    Fixed,
    #[serde(rename = "ne_data")]
    NaturalEarth,
    #[serde(rename = "fc_sample_data")]
    ForecastSample,
}

impl FamilyKind {
    pub const ALL: [FamilyKind; 4] = [
        FamilyKind::ModelAnalysis,
        FamilyKind::Fixed,
        FamilyKind::NaturalEarth,
        FamilyKind::ForecastSample,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            FamilyKind::ModelAnalysis => "input_model_data",
            FamilyKind::Fixed => "fix_data",
            FamilyKind::NaturalEarth => "ne_data",
            FamilyKind::ForecastSample => "fc_sample_data",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, CatalogError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag.trim())
            .ok_or_else(|| CatalogError::UnknownCategory {
                tag: tag.to_string(),
            })
    }
}

impl fmt::Display for FamilyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FamilySource {
    Directory {
        root: PathBuf,
    },
    Archive {
        path: PathBuf,
        #[serde(default = "default_work_dir")]
        work_dir: PathBuf,
    },
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

impl FamilySource {
    pub fn location(&self) -> &PathBuf {
        match self {
            FamilySource::Directory { root } => root,
            FamilySource::Archive { path, .. } => path,
        }
    }

    /// Directory the catalog's relative paths resolve against.
    pub fn path_base(&self) -> PathBuf {
        match self {
            FamilySource::Directory { root } => listing_base(root),
            FamilySource::Archive { work_dir, .. } => work_dir.clone(),
        }
    }
}

/// How directory-scan exclusions decide whether a path is dropped.
///
/// `AnyMatch` drops a path when any excluded name occurs in it. `Legacy`
/// keeps a path as long as at least one excluded name does not occur in it,
/// so only paths containing every excluded name are dropped and an empty
/// set drops everything.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionMode {
    #[default]
    AnyMatch,
    Legacy,
}

/// A fully resolved family: every field the scanner and categorizer need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetFamily {
    pub kind: FamilyKind,
    pub source: FamilySource,
    pub exclusions: Option<Vec<String>>,
    pub exclusion_mode: ExclusionMode,
    pub markers: BTreeMap<String, String>,
}

/// Category name to the paths filed under it, in discovery order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct CategoryMapping(BTreeMap<String, Vec<String>>);

impl CategoryMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, category: &str, path: String) {
        match self.0.get_mut(category) {
            Some(paths) => paths.push(path),
            None => {
                self.0.insert(category.to_string(), vec![path]);
            }
        }
    }

    pub fn get(&self, category: &str) -> Option<&[String]> {
        self.0.get(category).map(Vec::as_slice)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .iter()
            .map(|(category, paths)| (category.as_str(), paths.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_paths(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<String>> {
        self.0
    }
}

impl From<BTreeMap<String, Vec<String>>> for CategoryMapping {
    fn from(value: BTreeMap<String, Vec<String>>) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    pub catalog_id: String,
    pub generated_at: String,
    pub family: FamilyKind,
    pub source: FamilySource,
    pub exclusion_mode: ExclusionMode,
    pub files: Vec<String>,
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub archive_members: Vec<String>,
    #[serde(default)]
    pub extracted: Vec<String>,
    pub categories: CategoryMapping,
    pub uncategorized: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FamilyFailure {
    pub tag: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogReport {
    pub report_version: String,
    pub generated_at: String,
    pub catalogs: Vec<Catalog>,
    #[serde(default)]
    pub failures: Vec<FamilyFailure>,
}
