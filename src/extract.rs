use serde::{Deserialize, Serialize};

use crate::builder::MARKER_MODULE_ID;

pub const DEFAULT_COURSE_TITLE: &str = "Imported Course";

/// Coarse course model recovered from a tool-authored package's entry HTML.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedCourse {
    pub title: String,
    pub modules: Vec<ExtractedModule>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedModule {
    pub id: String,
    pub title: String,
}

/// Reverse a course outline out of the entry HTML by pattern matching.
///
/// Deliberately narrow: no DOM parse, only the marker attributes and heading
/// tags the builder itself emits. Module ids come from `data-module-id`
/// occurrences in document order; each module's title is the first `<h2>`
/// inside its block, defaulting to `Module <n>`. Returns `None` when no
/// model can be recovered, never panics on malformed input.
pub fn extract_course(html: &str) -> Option<ExtractedCourse> {
    if html.trim().is_empty() {
        return None;
    }

    let marker_positions = find_markers(html);
    let mut modules = Vec::with_capacity(marker_positions.len());
    for (index, (pos, id)) in marker_positions.iter().enumerate() {
        let block_end = marker_positions
            .get(index + 1)
            .map(|(next, _)| *next)
            .unwrap_or(html.len());
        let block = &html[*pos..block_end];
        let title = tag_text(block, "h2").unwrap_or_else(|| format!("Module {}", index + 1));
        modules.push(ExtractedModule {
            id: id.clone(),
            title,
        });
    }

    let title = tag_text(html, "title")
        .or_else(|| tag_text(html, "h1"))
        .unwrap_or_else(|| DEFAULT_COURSE_TITLE.to_string());

    Some(ExtractedCourse { title, modules })
}

/// Byte offsets and captured ids of every `data-module-id="..."` marker, in
/// document order.
fn find_markers(html: &str) -> Vec<(usize, String)> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = html[cursor..].find(MARKER_MODULE_ID) {
        let start = cursor + offset;
        let id_start = start + MARKER_MODULE_ID.len();
        match html[id_start..].find('"') {
            Some(len) => {
                let id = &html[id_start..id_start + len];
                // an empty id marks a module-less placeholder section
                if !id.is_empty() {
                    found.push((start, id.to_string()));
                }
                cursor = id_start + len;
            }
            // unterminated attribute, stop scanning
            None => break,
        }
    }
    found
}

/// Inner text of the first `<tag ...>...</tag>` pair, with nested markup
/// stripped. Greedy up to the first matching close tag.
fn tag_text(html: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let lower = html.to_ascii_lowercase();

    let open_at = lower.find(&open)?;
    let content_at = open_at + html[open_at..].find('>')? + 1;
    let close_at = content_at + lower[content_at..].find(&close)?;

    let text = strip_tags(&html[content_at..close_at]);
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn strip_tags(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
