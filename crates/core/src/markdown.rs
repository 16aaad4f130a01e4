use crate::model::{Catalog, CatalogReport, ExclusionMode, FamilySource};

pub fn render_markdown_summary(report: &CatalogReport) -> String {
    let mut out = String::new();
    out.push_str("# Dataset Catalog Summary\n\n");
    out.push_str(&format!(
        "- Report version: `{}`\n- Generated at: `{}`\n- Families cataloged: `{}`\n- Families failed: `{}`\n\n",
        report.report_version,
        report.generated_at,
        report.catalogs.len(),
        report.failures.len()
    ));

    for catalog in &report.catalogs {
        render_catalog(&mut out, catalog);
    }

    if !report.failures.is_empty() {
        out.push_str("## Failures\n\n");
        for failure in &report.failures {
            out.push_str(&format!(
                "- `{}` (`{}`): {}\n",
                failure.tag, failure.kind, failure.message
            ));
        }
        out.push('\n');
    }

    out
}

fn render_catalog(out: &mut String, catalog: &Catalog) {
    out.push_str(&format!("## `{}`\n\n", catalog.family));
    match &catalog.source {
        FamilySource::Directory { root } => {
            out.push_str(&format!(
                "- Source directory: `{}`\n- Exclusion mode: `{}`\n- Directories visited: {}\n",
                root.display(),
                exclusion_mode_label(catalog.exclusion_mode),
                catalog.directories.len()
            ));
        }
        FamilySource::Archive { path, work_dir } => {
            out.push_str(&format!(
                "- Source archive: `{}`\n- Working directory: `{}`\n- Archive members: {}\n- Extracted members: {}\n",
                path.display(),
                work_dir.display(),
                catalog.archive_members.len(),
                catalog.extracted.len()
            ));
        }
    }
    out.push_str(&format!(
        "- Files: {}\n- Uncategorized files: {}\n- Elapsed: `{} ms`\n\n",
        catalog.files.len(),
        catalog.uncategorized,
        catalog.elapsed_ms
    ));

    if catalog.categories.is_empty() {
        out.push_str("No files matched a category marker.\n\n");
        return;
    }

    out.push_str("| Category | Files |\n|---|---|\n");
    for (category, paths) in catalog.categories.iter() {
        out.push_str(&format!("| `{}` | {} |\n", category, paths.len()));
    }
    out.push('\n');
}

fn exclusion_mode_label(mode: ExclusionMode) -> &'static str {
    match mode {
        ExclusionMode::AnyMatch => "any_match",
        ExclusionMode::Legacy => "legacy",
    }
}
