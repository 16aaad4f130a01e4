use std::collections::BTreeMap;

use crate::model::CategoryMapping;

/// Files every path under each category whose marker occurs in it.
///
/// Paths are appended in input order with their leading `./` removed. A path
/// that matches several markers lands in several categories; one that
/// matches none is left out.
pub fn categorize_paths<S>(paths: &[S], markers: &BTreeMap<String, String>) -> CategoryMapping
where
    S: AsRef<str>,
{
    let mut mapping = CategoryMapping::new();
    for path in paths {
        let path = path.as_ref();
        for (marker, category) in markers {
            if path.contains(marker.as_str()) {
                mapping.push(category, strip_relative_root(path).to_string());
            }
        }
    }
    mapping
}

/// Paths that no marker matched, in input order.
pub fn uncategorized_paths<'a, S>(
    paths: &'a [S],
    markers: &BTreeMap<String, String>,
) -> Vec<&'a str>
where
    S: AsRef<str>,
{
    paths
        .iter()
        .map(AsRef::as_ref)
        .filter(|path| !markers.keys().any(|marker| path.contains(marker.as_str())))
        .collect()
}

pub fn strip_relative_root(path: &str) -> &str {
    path.trim_start_matches("./")
}

/// Markers that name their own category, e.g. `fix_aer` files into `fix_aer`.
pub fn self_named_markers<I, S>(markers: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    markers
        .into_iter()
        .map(|marker| {
            let marker = marker.into();
            (marker.clone(), marker)
        })
        .collect()
}
