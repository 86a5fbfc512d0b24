use serde_json::{Map, Value};

use crate::archive::ArchiveEntry;

/// Fold flat archive paths into a nested directory map for display.
///
/// Every intermediate segment becomes an object key; a final segment maps to
/// `null`, marking a file. Directories shared between entries merge instead
/// of overwriting each other.
pub fn build_tree(entries: &[ArchiveEntry]) -> Map<String, Value> {
    let mut root = Map::new();
    for entry in entries {
        let segments: Vec<&str> = entry.name.split('/').filter(|s| !s.is_empty()).collect();
        insert_path(&mut root, &segments);
    }
    root
}

fn insert_path(map: &mut Map<String, Value>, segments: &[&str]) {
    match segments {
        [] => {}
        [file] => {
            // A path that is both a file and a directory elsewhere keeps the
            // directory shape.
            map.entry(file.to_string()).or_insert(Value::Null);
        }
        [dir, rest @ ..] => {
            let slot = map
                .entry(dir.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(child) = slot {
                insert_path(child, rest);
            }
        }
    }
}
