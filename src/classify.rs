use crate::archive::ArchiveEntry;
use crate::builder::{
    MARKER_CONTAINER, MARKER_MODULE_CONTENT, MARKER_MODULE_ID, MARKER_NAVIGATION,
};

/// Filenames every package built by this tool carries.
pub const REQUIRED_FILES: [&str; 5] = [
    "index.html",
    "styles.css",
    "course.js",
    "course_api.js",
    "imsmanifest.xml",
];

const MEDIA_EXTENSIONS: [&str; 12] = [
    "png", "jpg", "jpeg", "gif", "svg", "webp", "mp4", "webm", "mov", "mp3", "wav", "ogg",
];

/// Decide whether an extracted file set came out of this tool's builder.
///
/// Heuristic, biased against false positives: at least 4 of the 5 required
/// files must be present, and on top of that either a `media_<id>.<ext>`
/// file or all four structural markers in the entry HTML. Never errors; a
/// foreign package simply classifies as `false`.
pub fn is_builder_package(entries: &[ArchiveEntry]) -> bool {
    let required_present = REQUIRED_FILES
        .iter()
        .filter(|name| has_file(entries, name))
        .count();
    if required_present < 4 {
        return false;
    }

    let has_builder_media = entries.iter().any(|e| is_builder_media_name(&e.name));
    let has_markers = entry_html(entries)
        .map(|html| {
            [
                MARKER_CONTAINER,
                MARKER_NAVIGATION,
                MARKER_MODULE_CONTENT,
                MARKER_MODULE_ID,
            ]
            .iter()
            .all(|marker| html.contains(marker))
        })
        .unwrap_or(false);

    has_builder_media || has_markers
}

fn has_file(entries: &[ArchiveEntry], name: &str) -> bool {
    let suffix = format!("/{name}");
    entries
        .iter()
        .any(|e| e.name == name || e.name.ends_with(&suffix))
}

/// Matches the `media_<elementId>.<ext>` names the builder assigns to
/// uploaded media.
fn is_builder_media_name(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let Some(rest) = file_name.strip_prefix("media_") else {
        return false;
    };
    match rest.rsplit_once('.') {
        Some((id, ext)) if !id.is_empty() => {
            MEDIA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        }
        _ => false,
    }
}

/// Text of the package's entry HTML, preferring a root-level `index.html`.
pub fn entry_html(entries: &[ArchiveEntry]) -> Option<&str> {
    entries
        .iter()
        .find(|e| e.name == "index.html")
        .or_else(|| entries.iter().find(|e| e.name.ends_with("/index.html")))
        .and_then(|e| e.content.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder;
    use crate::model::{Course, Module};

    fn entry(name: &str, content: Option<&str>) -> ArchiveEntry {
        ArchiveEntry {
            name: name.into(),
            size: content.map(|c| c.len() as u64).unwrap_or(0),
            kind: crate::archive::extension_of(name),
            content: content.map(|c| c.to_string()),
            in_manifest_dir: false,
            from_nested_zip: false,
            nested_zip_source: None,
        }
    }

    fn required_entries() -> Vec<ArchiveEntry> {
        REQUIRED_FILES.iter().map(|n| entry(n, None)).collect()
    }

    #[test]
    fn media_naming_convention() {
        assert!(is_builder_media_name("media_e1.png"));
        assert!(is_builder_media_name("pkg/media_abc123.mp4"));
        assert!(!is_builder_media_name("media_.png"));
        assert!(!is_builder_media_name("media_e1.exe"));
        assert!(!is_builder_media_name("mymedia_e1.png"));
        assert!(!is_builder_media_name("media_e1"));
    }

    #[test]
    fn required_files_alone_are_not_enough() {
        assert!(!is_builder_package(&required_entries()));
    }

    #[test]
    fn required_files_plus_media_classify_positive() {
        let mut entries = required_entries();
        entries.push(entry("media_el9.jpg", None));
        assert!(is_builder_package(&entries));
    }

    #[test]
    fn missing_two_required_files_classifies_negative() {
        let mut entries: Vec<_> = REQUIRED_FILES[..3].iter().map(|n| entry(n, None)).collect();
        entries.push(entry("media_el9.jpg", None));
        assert!(!is_builder_package(&entries));
    }

    #[test]
    fn structural_markers_satisfy_the_content_signal() {
        let course = Course {
            title: "T".into(),
            modules: vec![Module {
                id: "m1".into(),
                title: "M1".into(),
                ..Module::default()
            }],
            ..Course::default()
        };
        let files = builder::render_package(&course).unwrap();
        let mut entries = required_entries();
        entries[0].content = Some(files.index_html);
        assert!(is_builder_package(&entries));
    }

    #[test]
    fn required_files_inside_a_directory_still_count() {
        let mut entries: Vec<_> = REQUIRED_FILES
            .iter()
            .map(|n| entry(&format!("content/{n}"), None))
            .collect();
        entries.push(entry("content/media_a.png", None));
        assert!(is_builder_package(&entries));
    }
}
