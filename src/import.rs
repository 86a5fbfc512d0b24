use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::archive;
use crate::builder;
use crate::classify;
use crate::config::Config;
use crate::error::PackageError;
use crate::extract;
use crate::manifest;
use crate::model::Course;
use crate::store::{NestedZipInfo, PackageRecord, SCHEMA_VERSION};

/// Run an uploaded archive through the full import pipeline: read entries,
/// locate the manifest (following one level of nested zips), classify,
/// and, for tool-authored packages, recover a coarse course model.
///
/// Stages run strictly in order; each logs its outcome so a failed import
/// can be traced to the stage that gave up. Only a corrupt or oversized
/// container aborts; everything downstream degrades softly.
pub fn import_archive(
    bytes: &[u8],
    title: Option<String>,
    description: String,
    config: &Config,
) -> Result<PackageRecord, PackageError> {
    let mut entries = archive::read_entries(bytes, config.max_archive_bytes)?;
    tracing::info!(entries = entries.len(), "archive read");

    let located = manifest::locate(bytes, &mut entries, config.max_archive_bytes)?;

    let is_builder = classify::is_builder_package(&entries);
    tracing::info!(tool_authored = is_builder, "package classified");

    let builder_data = if is_builder {
        classify::entry_html(&entries).and_then(extract::extract_course)
    } else {
        None
    };
    if is_builder && builder_data.is_none() {
        tracing::warn!("tool-authored package but no model could be recovered");
    }

    let main_file = main_file_of(&entries, &located);
    let title = resolve_title(title, &entries, &located, builder_data.as_ref());
    let file_structure = Value::Object(crate::filetree::build_tree(&entries));
    let module_count = builder_data.as_ref().map(|d| d.modules.len());

    // Capped snapshot; archives past the cap do not round-trip their full
    // entry list through the record.
    let files: Vec<_> = entries.iter().take(config.package_file_cap).cloned().collect();
    if entries.len() > files.len() {
        tracing::info!(
            total = entries.len(),
            kept = files.len(),
            "entry snapshot capped"
        );
    }

    Ok(PackageRecord {
        id: Uuid::new_v4().to_string(),
        schema_version: SCHEMA_VERSION,
        title,
        description,
        upload_date: Utc::now(),
        files,
        main_file,
        manifest_path: located.manifest_path.clone(),
        manifest_dir: located.manifest_dir.clone(),
        file_structure,
        nested_zip_info: NestedZipInfo {
            has_nested_zips: !located.nested_zip_files.is_empty(),
            nested_zip_files: located.nested_zip_files,
            extracted_nested_zip: located.extracted_nested_zip,
            extracted_zip_name: located.extracted_zip_name,
        },
        is_built_with_builder: Some(is_builder),
        builder_data,
        module_count,
    })
}

/// Serialize and pack a course, then run the fresh archive back through the
/// import pipeline so the record matches what an upload of the same zip
/// would produce. Any failure leaves the caller's course untouched.
pub fn publish_course(
    course: &Course,
    config: &Config,
) -> Result<(PackageRecord, Vec<u8>), PackageError> {
    let files = builder::render_package(course)?;
    let archive_bytes = builder::pack_zip(&files)?;
    let mut record = import_archive(
        &archive_bytes,
        Some(course.title.clone()),
        course.description.clone(),
        config,
    )?;
    record.module_count = Some(course.modules.len());
    Ok((record, archive_bytes))
}

/// Launchable entry file: `index.html` under the content root when present,
/// else the first HTML entry, else the manifest itself.
fn main_file_of(entries: &[archive::ArchiveEntry], located: &manifest::LocatedManifest) -> String {
    let candidate = format!("{}index.html", located.manifest_dir);
    if entries.iter().any(|e| e.name == candidate) {
        return candidate;
    }
    entries
        .iter()
        .find(|e| e.kind == "html" || e.kind == "htm")
        .map(|e| e.name.clone())
        .or_else(|| located.manifest_path.clone())
        .unwrap_or_default()
}

fn resolve_title(
    provided: Option<String>,
    entries: &[archive::ArchiveEntry],
    located: &manifest::LocatedManifest,
    builder_data: Option<&extract::ExtractedCourse>,
) -> String {
    if let Some(title) = provided.filter(|t| !t.trim().is_empty()) {
        return title;
    }
    if let Some(path) = &located.manifest_path {
        let manifest_text = entries
            .iter()
            .find(|e| &e.name == path)
            .and_then(|e| e.content.as_deref());
        if let Some(title) = manifest_text.and_then(manifest::organization_title) {
            return title;
        }
    }
    builder_data
        .map(|d| d.title.clone())
        .unwrap_or_else(|| "Untitled Package".to_string())
}
