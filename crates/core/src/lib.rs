pub mod archive;
pub mod catalog;
pub mod categorize;
pub mod config;
pub mod error;
pub mod markdown;
pub mod model;
pub mod scan;

pub use archive::{detect_format, scan_archive, ArchiveFormat, ArchiveListing};
pub use catalog::{build_catalog, build_report, load_report, write_report, FailurePolicy};
pub use categorize::{
    categorize_paths, self_named_markers, strip_relative_root, uncategorized_paths,
};
pub use config::{
    default_archive_exclusions, default_markers, load_config, CatalogConfig, FamilyConfig,
};
pub use error::CatalogError;
pub use markdown::render_markdown_summary;
pub use model::{
    Catalog, CatalogReport, CategoryMapping, DatasetFamily, ExclusionMode, FamilyFailure,
    FamilyKind, FamilySource, REPORT_VERSION,
};
pub use scan::{listing_base, scan_directory, DirectoryListing, ExclusionSet};
