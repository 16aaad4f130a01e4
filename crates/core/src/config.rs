use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::categorize::self_named_markers;
use crate::error::CatalogError;
use crate::model::{DatasetFamily, ExclusionMode, FamilyKind, FamilySource};

static DEFAULT_MARKERS: Lazy<HashMap<FamilyKind, BTreeMap<String, String>>> = Lazy::new(|| {
    HashMap::from([
        (
            FamilyKind::ModelAnalysis,
            self_named_markers(["FV3GFS", "GSMGFS", "HRRR", "NAM", "RAP"]),
        ),
        (
            FamilyKind::Fixed,
            self_named_markers(["fix_aer", "fix_am", "fix_lut", "fix_orog", "fix_sfc_climo"]),
        ),
        (
            FamilyKind::NaturalEarth,
            self_named_markers(["raster_files", "shapefiles"]),
        ),
        (
            FamilyKind::ForecastSample,
            self_named_markers(["raster_files", "shapefiles"]),
        ),
    ])
});

// Directory members of the published tarballs; their files are still extracted.
static DEFAULT_ARCHIVE_EXCLUSIONS: Lazy<HashMap<FamilyKind, Vec<String>>> = Lazy::new(|| {
    HashMap::from([
        (
            FamilyKind::Fixed,
            owned_names(&[
                "fix/fix_am/co2dat_4a",
                "fix/fix_orog",
                "fix",
                "fix/fix_am",
                "fix/fix_am/fix_co2_proj",
                "fix/fix_aer",
                "fix/fix_sfc_climo",
                "fix/fix_lut",
            ]),
        ),
        (
            FamilyKind::ModelAnalysis,
            owned_names(&[
                "input_model_data/FV3GFS",
                "input_model_data/RAP",
                "input_model_data/HRRR",
                "input_model_data/NAM",
                "input_model_data/GSMGFS",
            ]),
        ),
        (FamilyKind::NaturalEarth, Vec::new()),
        (FamilyKind::ForecastSample, Vec::new()),
    ])
});

fn owned_names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogConfig {
    pub families: Vec<FamilyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FamilyConfig {
    pub tag: String,
    pub source: FamilySource,
    #[serde(default)]
    pub exclusions: Option<Vec<String>>,
    #[serde(default)]
    pub exclusion_mode: ExclusionMode,
    #[serde(default)]
    pub markers: Option<BTreeMap<String, String>>,
}

impl FamilyConfig {
    pub fn resolve(&self) -> Result<DatasetFamily, CatalogError> {
        let kind = FamilyKind::from_tag(&self.tag)?;
        if self.source.location().as_os_str().is_empty() {
            return Err(CatalogError::InvalidConfig {
                message: format!("family '{}' has an empty source path", self.tag),
            });
        }

        let exclusions = match (&self.exclusions, &self.source) {
            (Some(names), _) => Some(names.clone()),
            (None, FamilySource::Archive { .. }) => Some(default_archive_exclusions(kind)),
            (None, FamilySource::Directory { .. }) => None,
        };

        Ok(DatasetFamily {
            kind,
            source: self.source.clone(),
            exclusions,
            exclusion_mode: self.exclusion_mode,
            markers: self
                .markers
                .clone()
                .unwrap_or_else(|| default_markers(kind)),
        })
    }
}

pub fn default_markers(kind: FamilyKind) -> BTreeMap<String, String> {
    DEFAULT_MARKERS.get(&kind).cloned().unwrap_or_default()
}

pub fn default_archive_exclusions(kind: FamilyKind) -> Vec<String> {
    DEFAULT_ARCHIVE_EXCLUSIONS
        .get(&kind)
        .cloned()
        .unwrap_or_default()
}

pub fn load_config(path: &Path) -> Result<CatalogConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog config {}", path.display()))?;
    let config: CatalogConfig = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse catalog config {}", path.display()))?;
    if config.families.is_empty() {
        anyhow::bail!("catalog config {} lists no dataset families", path.display());
    }
    Ok(config)
}
