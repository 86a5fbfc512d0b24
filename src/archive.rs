use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};
use zip::ZipArchive;

use crate::error::PackageError;

/// Extensions whose entries get their content decoded and attached as text.
pub const TEXT_EXTENSIONS: [&str; 6] = ["html", "htm", "css", "js", "xml", "txt"];

/// One file inside an uploaded or generated archive. Produced once by the
/// reader and never mutated afterwards, except for the locator's re-tagging
/// when a nested package is adopted.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    pub name: String,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// Extension-derived type, lowercased; empty when the name has none.
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Option<String>,
    #[serde(default)]
    pub in_manifest_dir: bool,
    #[serde(default)]
    pub from_nested_zip: bool,
    #[serde(default)]
    pub nested_zip_source: Option<String>,
}

pub fn extension_of(name: &str) -> String {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

pub fn is_text_extension(ext: &str) -> bool {
    TEXT_EXTENSIONS.contains(&ext)
}

/// Enumerate every non-directory entry of a zip archive held in memory.
///
/// A stream that is not a zip container at all fails with `CorruptArchive`.
/// Anything that goes wrong with a single entry is logged and skipped: a
/// truncated entry drops out of the set, an undecodable text entry keeps its
/// name and size with `content = None`. The sum of declared uncompressed
/// sizes is bounded by `max_total_bytes` so a zip bomb fails fast instead of
/// stalling the pipeline.
pub fn read_entries(bytes: &[u8], max_total_bytes: u64) -> Result<Vec<ArchiveEntry>, PackageError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(PackageError::CorruptArchive)?;

    let mut entries = Vec::new();
    let mut declared: u64 = 0;
    for index in 0..archive.len() {
        let mut file = match archive.by_index(index) {
            Ok(f) => f,
            Err(err) => {
                tracing::warn!(index, error = %err, "skipping unreadable archive entry");
                continue;
            }
        };
        if file.is_dir() {
            continue;
        }

        declared = declared.saturating_add(file.size());
        if declared > max_total_bytes {
            return Err(PackageError::ArchiveTooLarge {
                declared,
                limit: max_total_bytes,
            });
        }

        let name = file.name().to_string();
        let kind = extension_of(&name);
        let content = if is_text_extension(&kind) {
            read_entry_text(&mut file, &name)
        } else {
            None
        };

        entries.push(ArchiveEntry {
            name,
            size: file.size(),
            kind,
            content,
            in_manifest_dir: false,
            from_nested_zip: false,
            nested_zip_source: None,
        });
    }
    Ok(entries)
}

fn read_entry_text(file: &mut impl Read, name: &str) -> Option<String> {
    let mut buf = Vec::new();
    if let Err(err) = file.read_to_end(&mut buf) {
        tracing::warn!(entry = name, error = %err, "failed to read entry content");
        return None;
    }
    match String::from_utf8(buf) {
        Ok(text) => Some(text),
        Err(err) => {
            tracing::warn!(entry = name, error = %err, "entry content is not valid text");
            None
        }
    }
}

/// Extract an archive to a directory on disk so its content can be served.
/// Entries whose names escape the target directory are skipped.
pub fn extract_to_dir(bytes: &[u8], out_dir: &std::path::Path) -> Result<(), PackageError> {
    let io_err = |e: std::io::Error| PackageError::CorruptArchive(zip::result::ZipError::Io(e));
    std::fs::create_dir_all(out_dir).map_err(io_err)?;
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(PackageError::CorruptArchive)?;
    for index in 0..archive.len() {
        let mut file = archive.by_index(index).map_err(PackageError::CorruptArchive)?;
        let Some(relative) = file.enclosed_name().map(|p| p.to_path_buf()) else {
            tracing::warn!(entry = file.name(), "skipping entry with unsafe path");
            continue;
        };
        let outpath = out_dir.join(relative);
        if file.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(io_err)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut outfile = std::fs::File::create(&outpath).map_err(io_err)?;
        std::io::copy(&mut file, &mut outfile).map_err(io_err)?;
    }
    Ok(())
}

/// Pull the raw bytes of a single named entry, used to open nested zips.
pub fn entry_bytes(bytes: &[u8], name: &str) -> Result<Vec<u8>, PackageError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(PackageError::CorruptArchive)?;
    let mut file = archive
        .by_name(name)
        .map_err(|_| PackageError::EntryMissing(name.to_string()))?;
    let mut buf = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut buf)
        .map_err(|err| PackageError::CorruptArchive(zip::result::ZipError::Io(err)))?;
    Ok(buf)
}

/// Build a small zip in memory for tests.
#[cfg(test)]
pub(crate) fn zip_of(files: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default();
    for (name, data) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_names_sizes_and_text_content() {
        let bytes = zip_of(&[
            ("index.html", b"<html></html>".as_slice()),
            ("img/logo.png", &[0x89, 0x50, 0x4e, 0x47]),
        ]);
        let entries = read_entries(&bytes, u64::MAX).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "index.html");
        assert_eq!(entries[0].kind, "html");
        assert_eq!(entries[0].content.as_deref(), Some("<html></html>"));
        assert_eq!(entries[1].kind, "png");
        assert!(entries[1].content.is_none());
        assert_eq!(entries[1].size, 4);
    }

    #[test]
    fn invalid_container_is_rejected() {
        let err = read_entries(b"definitely not a zip", u64::MAX).unwrap_err();
        assert!(matches!(err, PackageError::CorruptArchive(_)));
    }

    #[test]
    fn undecodable_text_entry_is_kept_without_content() {
        let bytes = zip_of(&[
            ("a.txt", &[0xff, 0xfe, 0x00, 0xff]),
            ("b.txt", b"fine".as_slice()),
        ]);
        let entries = read_entries(&bytes, u64::MAX).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].content.is_none());
        assert_eq!(entries[1].content.as_deref(), Some("fine"));
    }

    #[test]
    fn oversized_archive_is_refused() {
        let bytes = zip_of(&[("big.txt", vec![b'x'; 2048].as_slice())]);
        let err = read_entries(&bytes, 100).unwrap_err();
        assert!(matches!(err, PackageError::ArchiveTooLarge { .. }));
    }

    #[test]
    fn extension_handling() {
        assert_eq!(extension_of("a/b/page.HTML"), "html");
        assert_eq!(extension_of("noext"), "");
        assert_eq!(extension_of("dir/.hidden"), "");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
    }
}
