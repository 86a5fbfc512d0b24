use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::ZipWriter;

use coursepack_studio::archive;
use coursepack_studio::builder;
use coursepack_studio::classify;
use coursepack_studio::config::Config;
use coursepack_studio::extract;
use coursepack_studio::import;
use coursepack_studio::manifest;
use coursepack_studio::model::{Course, Element, ElementKind, HeadingContent, Module, TextContent};

fn test_config() -> Config {
    Config {
        port: 0,
        data_dir: "./data".into(),
        package_file_cap: 50,
        max_archive_bytes: u64::MAX,
        storage_quota_bytes: u64::MAX,
        max_drafts: 10,
        draft_retention_days: 7,
    }
}

fn zip_of(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options: FileOptions = FileOptions::default();
    for (name, data) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn element(id: &str, kind: ElementKind) -> Element {
    Element {
        id: id.into(),
        kind,
        settings: Default::default(),
        position: 0,
        upload: None,
    }
}

fn module(id: &str, title: &str, elements: Vec<Element>) -> Module {
    Module {
        id: id.into(),
        title: title.into(),
        elements,
        ..Module::default()
    }
}

/// The minimal export/import scenario: a one-module course serialized, then
/// fed back through reader, locator, classifier and extractor.
#[test]
fn minimal_course_survives_export_and_import() {
    let course = Course {
        title: "T".into(),
        modules: vec![module(
            "1",
            "M1",
            vec![element(
                "e1",
                ElementKind::Heading(HeadingContent {
                    text: "H".into(),
                    level: 2,
                }),
            )],
        )],
        ..Course::default()
    };

    let files = builder::render_package(&course).unwrap();
    let bytes = builder::pack_zip(&files).unwrap();

    let mut entries = archive::read_entries(&bytes, u64::MAX).unwrap();
    let located = manifest::locate(&bytes, &mut entries, u64::MAX).unwrap();
    assert_eq!(located.manifest_dir, "");
    assert_eq!(located.manifest_path.as_deref(), Some("imsmanifest.xml"));

    assert!(classify::is_builder_package(&entries));

    let html = classify::entry_html(&entries).unwrap();
    let extracted = extract::extract_course(html).unwrap();
    assert_eq!(extracted.modules.len(), 1);
    assert_eq!(extracted.modules[0].id, "1");
    assert_eq!(extracted.modules[0].title, "M1");
}

/// Module counts and titles survive the round trip in order, for models
/// without XML-unsafe characters in their text fields.
#[test]
fn module_titles_round_trip_in_order() {
    let course = Course {
        title: "Ordered Course".into(),
        modules: vec![
            module(
                "intro",
                "Introduction",
                vec![element(
                    "t1",
                    ElementKind::Text(TextContent {
                        text: "welcome".into(),
                    }),
                )],
            ),
            module("mid", "Deep Dive", vec![]),
            module("end", "Wrap Up", vec![]),
        ],
        ..Course::default()
    };

    let files = builder::render_package(&course).unwrap();
    let extracted = extract::extract_course(&files.index_html).unwrap();

    assert_eq!(extracted.title, "Ordered Course");
    assert_eq!(extracted.modules.len(), course.modules.len());
    for (original, recovered) in course.modules.iter().zip(&extracted.modules) {
        assert_eq!(original.id, recovered.id);
        assert_eq!(original.title, recovered.title);
    }
}

#[test]
fn freshly_published_package_always_classifies_positive() {
    let course = Course {
        title: "Classify Me".into(),
        modules: vec![module("m1", "Only Module", vec![])],
        ..Course::default()
    };
    let (record, _bytes) = import::publish_course(&course, &test_config()).unwrap();
    assert_eq!(record.is_built_with_builder, Some(true));
}

/// A course with no modules (and so no media) still has to classify
/// positive after export; the entry HTML carries the marker set regardless.
#[test]
fn moduleless_course_classifies_positive_after_export() {
    let course = Course {
        title: "Empty".into(),
        ..Course::default()
    };
    let files = builder::render_package(&course).unwrap();
    let bytes = builder::pack_zip(&files).unwrap();

    let entries = archive::read_entries(&bytes, u64::MAX).unwrap();
    assert!(classify::is_builder_package(&entries));

    let record = import::import_archive(&bytes, None, String::new(), &test_config()).unwrap();
    assert_eq!(record.is_built_with_builder, Some(true));
    assert_eq!(record.module_count, Some(0));
}

#[test]
fn archive_missing_most_required_files_classifies_negative() {
    let bytes = zip_of(&[
        ("index.html", b"<html></html>".as_slice()),
        ("styles.css", b"body{}".as_slice()),
        ("media_x.png", &[0x89, 0x50]),
    ]);
    let record = import::import_archive(&bytes, None, String::new(), &test_config()).unwrap();
    assert_eq!(record.is_built_with_builder, Some(false));
}

/// An outer zip with no manifest and two nested zips, where only the second
/// contains a manifest: the locator must adopt the second and stop there.
#[test]
fn second_nested_zip_wins_without_probing_further() {
    let decoy = zip_of(&[("only.txt", b"nothing here".as_slice())]);
    let real = zip_of(&[
        ("imsmanifest.xml", b"<manifest/>".as_slice()),
        ("index.html", b"<html><title>Inner</title></html>".as_slice()),
    ]);
    let outer = zip_of(&[
        ("a_decoy.zip", decoy.as_slice()),
        ("b_real.zip", real.as_slice()),
    ]);

    let record = import::import_archive(&outer, None, String::new(), &test_config()).unwrap();
    assert!(record.nested_zip_info.extracted_nested_zip);
    assert_eq!(
        record.nested_zip_info.extracted_zip_name.as_deref(),
        Some("b_real.zip")
    );
    assert_eq!(record.nested_zip_info.nested_zip_files.len(), 2);
    // adopted entry set comes from the nested archive only
    assert!(record.files.iter().all(|f| f.from_nested_zip));
    assert!(record.files.iter().any(|f| f.name == "imsmanifest.xml"));
}

#[test]
fn one_bad_text_entry_does_not_poison_the_import() {
    let bytes = zip_of(&[
        ("good.html", b"<html></html>".as_slice()),
        ("broken.txt", &[0xff, 0xfe, 0xfd]),
        ("also_good.css", b"body{}".as_slice()),
    ]);
    let record = import::import_archive(&bytes, None, String::new(), &test_config()).unwrap();
    assert_eq!(record.files.len(), 3);
    let broken = record.files.iter().find(|f| f.name == "broken.txt").unwrap();
    assert!(broken.content.is_none());
    let good = record.files.iter().find(|f| f.name == "good.html").unwrap();
    assert!(good.content.is_some());
}
