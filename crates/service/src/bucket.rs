use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketProfile {
    pub label: String,
    pub bucket: String,
    pub profile: String,
}

const PROFILES: [(&str, &str, &str); 3] = [
    ("rt", "noaa-ufs-regtests-pds", "default"),
    ("srw", "noaa-ufs-srw-pds", "srw-app"),
    ("land-da", "noaa-ufs-land-da-pds", "land-da-app"),
];

impl BucketProfile {
    pub fn from_label(label: &str) -> Result<Self, StoreError> {
        PROFILES
            .iter()
            .find(|(known, _, _)| *known == label)
            .map(|(label, bucket, profile)| Self {
                label: label.to_string(),
                bucket: bucket.to_string(),
                profile: profile.to_string(),
            })
            .ok_or_else(|| StoreError::UnknownBucketLabel {
                label: label.to_string(),
            })
    }

    pub fn labels() -> impl Iterator<Item = &'static str> {
        PROFILES.iter().map(|(label, _, _)| *label)
    }
}

impl FromStr for BucketProfile {
    type Err = StoreError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        Self::from_label(label)
    }
}

impl fmt::Display for BucketProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (profile {})", self.bucket, self.profile)
    }
}
