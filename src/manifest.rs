use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

use crate::archive::{self, ArchiveEntry};
use crate::error::PackageError;
use crate::model::Course;

pub const MANIFEST_FILENAME: &str = "imsmanifest.xml";

/// Where the manifest was found and which content root it implies.
#[derive(Debug, Clone, Default)]
pub struct LocatedManifest {
    /// Full entry path of the manifest, `None` when the archive carries none
    /// (callers proceed in unverified-package mode).
    pub manifest_path: Option<String>,
    /// Directory prefix of the manifest including its trailing `/`; empty
    /// for a root-level manifest.
    pub manifest_dir: String,
    /// Every `.zip` entry seen in the outer archive, in entry-table order.
    pub nested_zip_files: Vec<String>,
    pub extracted_nested_zip: bool,
    /// Name of the nested zip the manifest was adopted from, if any.
    pub extracted_zip_name: Option<String>,
}

/// Find the manifest for an archive, searching root first, then any
/// subdirectory, then one level of nested zips.
///
/// When a nested zip yields a manifest, `entries` is replaced wholesale with
/// the nested archive's entry set (re-tagged with its source); the outer
/// archive's own files drop out of further processing. First match wins at
/// every step, in the archive's own entry-table order.
pub fn locate(
    outer_bytes: &[u8],
    entries: &mut Vec<ArchiveEntry>,
    max_total_bytes: u64,
) -> Result<LocatedManifest, PackageError> {
    let (found, nested_zips) = scan(entries);
    let mut located = LocatedManifest {
        nested_zip_files: nested_zips,
        ..LocatedManifest::default()
    };

    match found {
        Some((path, dir)) => {
            tracing::info!(manifest = %path, "manifest found in outer archive");
            located.manifest_path = Some(path);
            located.manifest_dir = dir;
        }
        None => {
            tracing::info!(
                nested_candidates = located.nested_zip_files.len(),
                "no manifest in outer archive, scanning nested zips"
            );
            locate_in_nested(outer_bytes, entries, &mut located, max_total_bytes)?;
        }
    }

    if located.manifest_path.is_none() {
        tracing::info!("no manifest found, proceeding as unverified package");
    }

    for entry in entries.iter_mut() {
        entry.in_manifest_dir =
            located.manifest_dir.is_empty() || entry.name.starts_with(&located.manifest_dir);
    }
    Ok(located)
}

/// One pass over an entry set: root-level manifest beats the first deeper
/// one; nested-zip candidates are collected regardless of the outcome.
fn scan(entries: &[ArchiveEntry]) -> (Option<(String, String)>, Vec<String>) {
    let deep_suffix = format!("/{MANIFEST_FILENAME}");
    let mut root_match: Option<String> = None;
    let mut deep_match: Option<String> = None;
    let mut nested_zips = Vec::new();

    for entry in entries {
        let at_root = entry.name.ends_with(MANIFEST_FILENAME) && !entry.name.contains('/');
        if at_root && root_match.is_none() {
            root_match = Some(entry.name.clone());
        } else if entry.name.ends_with(&deep_suffix) && deep_match.is_none() {
            deep_match = Some(entry.name.clone());
        }
        if entry.name.to_ascii_lowercase().ends_with(".zip") {
            nested_zips.push(entry.name.clone());
        }
    }

    let found = root_match
        .map(|path| (path, String::new()))
        .or_else(|| deep_match.map(|path| (path.clone(), dir_of(&path))));
    (found, nested_zips)
}

fn dir_of(path: &str) -> String {
    match path.rfind('/') {
        Some(pos) => path[..=pos].to_string(),
        None => String::new(),
    }
}

fn locate_in_nested(
    outer_bytes: &[u8],
    entries: &mut Vec<ArchiveEntry>,
    located: &mut LocatedManifest,
    max_total_bytes: u64,
) -> Result<(), PackageError> {
    // Recursion stops at one level: zip entries inside a nested zip are not
    // followed further.
    for zip_name in located.nested_zip_files.clone() {
        let inner_bytes = match archive::entry_bytes(outer_bytes, &zip_name) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(nested = %zip_name, error = %err, "cannot read nested zip entry");
                continue;
            }
        };
        let mut inner_entries = match archive::read_entries(&inner_bytes, max_total_bytes) {
            Ok(e) => e,
            Err(PackageError::ArchiveTooLarge { declared, limit }) => {
                return Err(PackageError::ArchiveTooLarge { declared, limit });
            }
            Err(err) => {
                tracing::warn!(nested = %zip_name, error = %err, "nested entry is not a readable zip");
                continue;
            }
        };

        let (found, _) = scan(&inner_entries);
        if let Some((path, dir)) = found {
            tracing::info!(nested = %zip_name, manifest = %path, "manifest found inside nested zip");
            for entry in inner_entries.iter_mut() {
                entry.from_nested_zip = true;
                entry.nested_zip_source = Some(zip_name.clone());
            }
            *entries = inner_entries;
            located.manifest_path = Some(path);
            located.manifest_dir = dir;
            located.extracted_nested_zip = true;
            located.extracted_zip_name = Some(zip_name);
            return Ok(());
        }
    }
    Ok(())
}

/// Render the SCORM-1.2-shaped manifest for a built package. The course
/// title lands both in the organization title and in the LOM metadata block;
/// quick-xml escapes text nodes, so titles containing `<` or `&` stay legal.
pub fn write_manifest_xml(
    course: &Course,
    resource_files: &[String],
) -> Result<String, PackageError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    write_manifest_events(&mut writer, course, resource_files)
        .map_err(|err| PackageError::Serialization(err.to_string()))?;
    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|err| PackageError::Serialization(err.to_string()))
}

fn write_manifest_events<W: std::io::Write>(
    writer: &mut Writer<W>,
    course: &Course,
    resource_files: &[String],
) -> quick_xml::Result<()> {
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut manifest = BytesStart::new("manifest");
    manifest.push_attribute(("identifier", "com.coursepack.studio.manifest"));
    manifest.push_attribute(("version", "1.2"));
    manifest.push_attribute(("xmlns", "http://www.imsproject.org/xsd/imscp_rootv1p1p2"));
    manifest.push_attribute(("xmlns:adlcp", "http://www.adlnet.org/xsd/adlcp_rootv1p2"));
    writer.write_event(Event::Start(manifest))?;

    write_metadata(writer, course)?;
    write_organizations(writer, course)?;
    write_resources(writer, resource_files)?;

    writer.write_event(Event::End(BytesStart::new("manifest").to_end()))?;
    Ok(())
}

fn write_metadata<W: std::io::Write>(
    writer: &mut Writer<W>,
    course: &Course,
) -> quick_xml::Result<()> {
    writer
        .create_element("metadata")
        .write_inner_content(|w| {
            w.create_element("schema")
                .write_text_content(BytesText::new("ADL SCORM"))?;
            w.create_element("schemaversion")
                .write_text_content(BytesText::new("1.2"))?;
            w.create_element("lom").write_inner_content(|w| {
                w.create_element("general").write_inner_content(|w| {
                    w.create_element("title").write_inner_content(|w| {
                        w.create_element("langstring")
                            .write_text_content(BytesText::new(&course.title))?;
                        Ok::<(), quick_xml::Error>(())
                    })?;
                    if !course.description.is_empty() {
                        w.create_element("description").write_inner_content(|w| {
                            w.create_element("langstring")
                                .write_text_content(BytesText::new(&course.description))?;
                            Ok::<(), quick_xml::Error>(())
                        })?;
                    }
                    Ok::<(), quick_xml::Error>(())
                })?;
                Ok::<(), quick_xml::Error>(())
            })?;
            Ok::<(), quick_xml::Error>(())
        })
        .map(|_| ())
}

fn write_organizations<W: std::io::Write>(
    writer: &mut Writer<W>,
    course: &Course,
) -> quick_xml::Result<()> {
    writer
        .create_element("organizations")
        .with_attribute(("default", "course_org"))
        .write_inner_content(|w| {
            w.create_element("organization")
                .with_attribute(("identifier", "course_org"))
                .write_inner_content(|w| {
                    w.create_element("title")
                        .write_text_content(BytesText::new(&course.title))?;
                    for (index, module) in course.modules.iter().enumerate() {
                        let item_id = format!("item_{}", index + 1);
                        w.create_element("item")
                            .with_attributes([
                                ("identifier", item_id.as_str()),
                                ("identifierref", "course_resource"),
                            ])
                            .write_inner_content(|w| {
                                w.create_element("title")
                                    .write_text_content(BytesText::new(&module.title))?;
                                Ok::<(), quick_xml::Error>(())
                            })?;
                    }
                    Ok::<(), quick_xml::Error>(())
                })?;
            Ok::<(), quick_xml::Error>(())
        })
        .map(|_| ())
}

fn write_resources<W: std::io::Write>(
    writer: &mut Writer<W>,
    resource_files: &[String],
) -> quick_xml::Result<()> {
    writer
        .create_element("resources")
        .write_inner_content(|w| {
            w.create_element("resource")
                .with_attributes([
                    ("identifier", "course_resource"),
                    ("type", "webcontent"),
                    ("adlcp:scormtype", "sco"),
                    ("href", "index.html"),
                ])
                .write_inner_content(|w| {
                    for file in resource_files {
                        w.create_element("file")
                            .with_attribute(("href", file.as_str()))
                            .write_empty()?;
                    }
                    Ok::<(), quick_xml::Error>(())
                })?;
            Ok::<(), quick_xml::Error>(())
        })
        .map(|_| ())
}

/// Best-effort readback of the organization `<title>` from a manifest, used
/// as a title fallback for foreign packages. Any parse trouble yields `None`.
pub fn organization_title(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();

    let mut in_organization = false;
    let mut in_title = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(&e).as_str() {
                "organization" => in_organization = true,
                "title" if in_organization => in_title = true,
                _ => {}
            },
            Ok(Event::Text(t)) if in_title => {
                let text = t.unescape().ok()?.trim().to_string();
                if !text.is_empty() {
                    return Some(text);
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.split(':').last().unwrap_or(&name) {
                    "organization" => in_organization = false,
                    "title" => in_title = false,
                    _ => {}
                }
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

fn local_name(tag: &BytesStart<'_>) -> String {
    let full = String::from_utf8_lossy(tag.name().as_ref()).to_string();
    full.split(':').last().unwrap_or(&full).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::read_entries;
    use crate::model::Module;

    fn entry(name: &str) -> ArchiveEntry {
        ArchiveEntry {
            name: name.into(),
            size: 0,
            kind: crate::archive::extension_of(name),
            content: None,
            in_manifest_dir: false,
            from_nested_zip: false,
            nested_zip_source: None,
        }
    }

    #[test]
    fn root_manifest_beats_deeper_one() {
        let mut entries = vec![
            entry("deep/dir/imsmanifest.xml"),
            entry("imsmanifest.xml"),
            entry("index.html"),
        ];
        let located = locate(&[], &mut entries, u64::MAX).unwrap();
        assert_eq!(located.manifest_path.as_deref(), Some("imsmanifest.xml"));
        assert_eq!(located.manifest_dir, "");
    }

    #[test]
    fn suffix_named_root_entry_counts_as_root_manifest() {
        let mut entries = vec![entry("deep/imsmanifest.xml"), entry("myimsmanifest.xml")];
        let located = locate(&[], &mut entries, u64::MAX).unwrap();
        assert_eq!(located.manifest_path.as_deref(), Some("myimsmanifest.xml"));
        assert_eq!(located.manifest_dir, "");
    }

    #[test]
    fn first_deep_manifest_wins_and_sets_dir() {
        let mut entries = vec![
            entry("pkg/content/imsmanifest.xml"),
            entry("other/imsmanifest.xml"),
        ];
        let located = locate(&[], &mut entries, u64::MAX).unwrap();
        assert_eq!(
            located.manifest_path.as_deref(),
            Some("pkg/content/imsmanifest.xml")
        );
        assert_eq!(located.manifest_dir, "pkg/content/");
        assert!(entries[0].in_manifest_dir);
        assert!(!entries[1].in_manifest_dir);
    }

    #[test]
    fn second_nested_zip_supplies_the_manifest() {
        let empty_inner = crate::archive::zip_of(&[("readme.txt", b"nope".as_slice())]);
        let good_inner = crate::archive::zip_of(&[
            ("imsmanifest.xml", b"<manifest/>".as_slice()),
            ("index.html", b"<html></html>".as_slice()),
        ]);
        let outer = crate::archive::zip_of(&[
            ("first.zip", empty_inner.as_slice()),
            ("second.zip", good_inner.as_slice()),
            ("notes.txt", b"outer file".as_slice()),
        ]);

        let mut entries = read_entries(&outer, u64::MAX).unwrap();
        let located = locate(&outer, &mut entries, u64::MAX).unwrap();

        assert!(located.extracted_nested_zip);
        assert_eq!(located.extracted_zip_name.as_deref(), Some("second.zip"));
        assert_eq!(located.manifest_path.as_deref(), Some("imsmanifest.xml"));
        // outer entries are replaced by the adopted nested set
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.from_nested_zip));
        assert!(entries
            .iter()
            .all(|e| e.nested_zip_source.as_deref() == Some("second.zip")));
    }

    #[test]
    fn missing_manifest_is_soft() {
        let mut entries = vec![entry("a.txt"), entry("b/c.css")];
        let located = locate(&[], &mut entries, u64::MAX).unwrap();
        assert!(located.manifest_path.is_none());
        assert!(!located.extracted_nested_zip);
    }

    #[test]
    fn manifest_xml_escapes_title_and_lists_files() {
        let course = Course {
            title: "Tips & <Tricks>".into(),
            modules: vec![Module {
                id: "m1".into(),
                title: "Intro".into(),
                ..Module::default()
            }],
            ..Course::default()
        };
        let files = vec!["index.html".to_string(), "styles.css".to_string()];
        let xml = write_manifest_xml(&course, &files).unwrap();
        assert!(xml.contains("Tips &amp; &lt;Tricks&gt;"));
        assert!(xml.contains(r#"<file href="styles.css"/>"#));
        assert_eq!(organization_title(&xml).as_deref(), Some("Tips & <Tricks>"));
    }
}
