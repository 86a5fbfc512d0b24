use std::fmt::Write as _;
use std::io::{Cursor, Write as _};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::PackageError;
use crate::model::{Course, Element, ElementKind, MediaContent, WidgetContent};

/// Structural markers the classifier keys on. Emitted verbatim by the entry
/// HTML; changing any of them breaks round-trip detection of previously
/// exported packages.
pub const MARKER_CONTAINER: &str = r#"class="course-container""#;
pub const MARKER_NAVIGATION: &str = r#"class="course-navigation""#;
pub const MARKER_MODULE_CONTENT: &str = r#"class="module-content""#;
pub const MARKER_MODULE_ID: &str = r#"data-module-id=""#;

/// The artifact set a course renders to, before zip assembly.
#[derive(Debug, Clone)]
pub struct PackageFiles {
    pub manifest_xml: String,
    pub index_html: String,
    pub styles_css: String,
    pub course_js: String,
    pub course_api_js: String,
    pub media: Vec<MediaFile>,
}

#[derive(Debug, Clone)]
pub struct MediaFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Render a course model to its deployable files. Pure function of the
/// model; all I/O (zip assembly, persistence) happens in later stages.
pub fn render_package(course: &Course) -> Result<PackageFiles, PackageError> {
    let media = collect_media(course);
    let index_html = render_index_html(course);

    let mut resource_files = vec![
        "index.html".to_string(),
        "styles.css".to_string(),
        "course.js".to_string(),
        "course_api.js".to_string(),
    ];
    resource_files.extend(media.iter().map(|m| m.name.clone()));
    let manifest_xml = crate::manifest::write_manifest_xml(course, &resource_files)?;

    Ok(PackageFiles {
        manifest_xml,
        index_html,
        styles_css: render_styles(course),
        course_js: render_course_js(course),
        course_api_js: render_course_api_js(),
        media,
    })
}

/// Pack rendered files into a zip archive held in memory, manifest first.
pub fn pack_zip(files: &PackageFiles) -> Result<Vec<u8>, PackageError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let text_entries = [
        ("imsmanifest.xml", files.manifest_xml.as_bytes()),
        ("index.html", files.index_html.as_bytes()),
        ("styles.css", files.styles_css.as_bytes()),
        ("course.js", files.course_js.as_bytes()),
        ("course_api.js", files.course_api_js.as_bytes()),
    ];
    for (name, bytes) in text_entries {
        write_zip_entry(&mut zip, name, bytes, options)?;
    }
    for media in &files.media {
        write_zip_entry(&mut zip, &media.name, &media.bytes, options)?;
    }

    let cursor = zip
        .finish()
        .map_err(|err| PackageError::Serialization(err.to_string()))?;
    Ok(cursor.into_inner())
}

fn write_zip_entry(
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    name: &str,
    bytes: &[u8],
    options: FileOptions,
) -> Result<(), PackageError> {
    zip.start_file(name, options)
        .map_err(|err| PackageError::Serialization(err.to_string()))?;
    zip.write_all(bytes)
        .map_err(|err| PackageError::Serialization(err.to_string()))?;
    Ok(())
}

/// Derived archive name for an element's uploaded media. The classifier's
/// media heuristic matches exactly this shape.
pub fn media_file_name(element_id: &str, extension: &str) -> String {
    format!("media_{element_id}.{extension}")
}

fn collect_media(course: &Course) -> Vec<MediaFile> {
    let mut media = Vec::new();
    for module in &course.modules {
        for element in &module.elements {
            if let Some(upload) = &element.upload {
                media.push(MediaFile {
                    name: media_file_name(&element.id, &upload.extension),
                    bytes: upload.bytes.clone(),
                });
            }
        }
    }
    media
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn render_index_html(course: &Course) -> String {
    let title = escape_html(&course.title);
    let mut html = String::new();
    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8"/>
<meta name="viewport" content="width=device-width, initial-scale=1"/>
<title>{title}</title>
<link rel="stylesheet" href="styles.css"/>
</head>
<body class="theme-{theme}">
<div {MARKER_CONTAINER}>
<header class="course-header">
<h1>{title}</h1>
"#,
        theme = escape_html(&course.settings.theme),
    );
    if !course.description.is_empty() {
        let _ = write!(
            html,
            "<p class=\"course-description\">{}</p>\n",
            escape_html(&course.description)
        );
    }
    if !course.objectives.is_empty() {
        html.push_str("<ul class=\"course-objectives\">\n");
        for objective in &course.objectives {
            let _ = write!(html, "<li>{}</li>\n", escape_html(objective));
        }
        html.push_str("</ul>\n");
    }
    html.push_str("</header>\n");

    let _ = write!(html, "<nav {MARKER_NAVIGATION}>\n<ul>\n");
    for module in &course.modules {
        let _ = write!(
            html,
            "<li><a href=\"#module-{id}\">{title}</a></li>\n",
            id = escape_html(&module.id),
            title = escape_html(&module.title),
        );
    }
    html.push_str("</ul>\n</nav>\n<main class=\"course-modules\">\n");

    for module in &course.modules {
        let module_id = escape_html(&module.id);
        let _ = write!(
            html,
            "<section class=\"course-module\" id=\"module-{module_id}\" {MARKER_MODULE_ID}{module_id}\">\n<h2>{title}</h2>\n",
            title = escape_html(&module.title),
        );
        if !module.description.is_empty() {
            let _ = write!(
                html,
                "<p class=\"module-description\">{}</p>\n",
                escape_html(&module.description)
            );
        }
        let _ = write!(html, "<div {MARKER_MODULE_CONTENT}>\n");
        for element in &module.elements {
            html.push_str(&render_element(element));
            html.push('\n');
        }
        html.push_str("</div>\n</section>\n");
    }
    if course.modules.is_empty() {
        // keep the full marker set present even with nothing to show; the
        // empty id means reconstruction recovers no module from it
        let _ = write!(
            html,
            "<section class=\"course-module course-module-empty\" {MARKER_MODULE_ID}\">\n<div {MARKER_MODULE_CONTENT}></div>\n</section>\n",
        );
    }

    html.push_str(
        "</main>\n<footer class=\"course-footer\"><p>Built with Coursepack Studio</p></footer>\n</div>\n<script src=\"course_api.js\"></script>\n<script src=\"course.js\"></script>\n</body>\n</html>\n",
    );
    html
}

fn render_element(element: &Element) -> String {
    let body = match &element.kind {
        ElementKind::Text(c) => format!("<p class=\"text-element\">{}</p>", escape_html(&c.text)),
        ElementKind::Heading(c) => {
            let level = c.level.clamp(1, 6);
            format!(
                "<h{level} class=\"heading-element\">{}</h{level}>",
                escape_html(&c.text)
            )
        }
        ElementKind::Image(c) => render_image(element, c),
        ElementKind::Video(c) => format!(
            "<video class=\"video-element\" controls src=\"{}\"></video>",
            escape_html(&media_src(element, c))
        ),
        ElementKind::Audio(c) => format!(
            "<audio class=\"audio-element\" controls src=\"{}\"></audio>",
            escape_html(&media_src(element, c))
        ),
        ElementKind::Quiz(c) => render_quiz(element, c),
        ElementKind::Interactive(c) => render_widget(element, "interactive", c),
        ElementKind::Accordion(c) => render_widget(element, "accordion", c),
        ElementKind::Tabs(c) => render_widget(element, "tabs", c),
        ElementKind::Timeline(c) => render_widget(element, "timeline", c),
        ElementKind::Gallery(c) => render_widget(element, "gallery", c),
        ElementKind::Embed(c) => format!(
            "<iframe class=\"embed-element\" src=\"{}\" title=\"{}\"></iframe>",
            escape_html(&c.url),
            escape_html(c.title.as_deref().unwrap_or("Embedded content")),
        ),
        ElementKind::Pdf(c) => format!(
            "<object class=\"pdf-element\" type=\"application/pdf\" data=\"{}\"></object>",
            escape_html(&media_src(element, c))
        ),
        // Foreign kinds render as an inert, tagged placeholder.
        ElementKind::Unknown { kind, .. } => format!(
            "<div class=\"unknown-element\" data-element-type=\"{}\"></div>",
            escape_html(kind)
        ),
    };

    let mut classes = String::from("course-element");
    if !element.settings.visible {
        classes.push_str(" element-hidden");
    }
    let mut attrs = String::new();
    if let Some(animation) = &element.settings.animation {
        let _ = write!(attrs, " data-animation=\"{}\"", escape_html(animation));
    }
    if element.settings.required {
        attrs.push_str(" data-required=\"true\"");
    }
    format!(
        "<div class=\"{classes}\" data-element-id=\"{id}\"{attrs}>{body}</div>",
        id = escape_html(&element.id),
    )
}

/// `src` resolves to the embedded media filename when the element carries an
/// upload, and to the literal URL otherwise.
fn media_src(element: &Element, content: &MediaContent) -> String {
    match &element.upload {
        Some(upload) => media_file_name(&element.id, &upload.extension),
        None => content.src.clone(),
    }
}

fn render_image(element: &Element, content: &MediaContent) -> String {
    let mut html = format!(
        "<figure class=\"image-element\"><img src=\"{}\" alt=\"{}\"/>",
        escape_html(&media_src(element, content)),
        escape_html(&content.alt),
    );
    if let Some(caption) = &content.caption {
        let _ = write!(html, "<figcaption>{}</figcaption>", escape_html(caption));
    }
    html.push_str("</figure>");
    html
}

fn render_quiz(element: &Element, quiz: &crate::model::QuizContent) -> String {
    let mut html = format!(
        "<div class=\"quiz-element\" data-quiz-id=\"{id}\" data-correct=\"{correct}\">\n<p class=\"quiz-question\">{question}</p>\n<form class=\"quiz-options\">\n",
        id = escape_html(&element.id),
        correct = quiz.correct,
        question = escape_html(&quiz.question),
    );
    // Radio groups are namespaced per element so multiple quizzes on one
    // page never share answers.
    for (index, option) in quiz.options.iter().enumerate() {
        let _ = write!(
            html,
            "<label><input type=\"radio\" name=\"quiz_{id}\" value=\"{index}\"/> {option}</label>\n",
            id = escape_html(&element.id),
            option = escape_html(option),
        );
    }
    let _ = write!(
        html,
        "</form>\n<div class=\"quiz-feedback\" data-feedback-correct=\"{ok}\" data-feedback-incorrect=\"{no}\"></div>\n</div>",
        ok = escape_html(&quiz.feedback.correct),
        no = escape_html(&quiz.feedback.incorrect),
    );
    html
}

/// Structured widgets (accordion, tabs, timeline, gallery, interactive)
/// render their items statically; course.js hydrates the behavior.
fn render_widget(element: &Element, widget_type: &str, content: &WidgetContent) -> String {
    let mut html = format!(
        "<div class=\"widget-element\" data-element-type=\"{widget_type}\" data-widget-id=\"{}\">\n",
        escape_html(&element.id)
    );
    for item in &content.items {
        let _ = write!(
            html,
            "<div class=\"widget-item\"><h4 class=\"widget-item-title\">{}</h4><div class=\"widget-item-body\">{}</div></div>\n",
            escape_html(&item.title),
            escape_html(&item.body),
        );
    }
    html.push_str("</div>");
    html
}

fn render_styles(course: &Course) -> String {
    let mut css = String::from(
        r#"* { box-sizing: border-box; }
body { margin: 0; font-family: -apple-system, "Segoe UI", Roboto, sans-serif; line-height: 1.6; }
.course-container { max-width: 960px; margin: 0 auto; padding: 1rem; }
.course-header h1 { margin-bottom: 0.25rem; }
.course-description { color: #555; }
.course-navigation ul { list-style: none; padding: 0; display: flex; flex-wrap: wrap; gap: 0.75rem; }
.course-navigation a { text-decoration: none; color: #1a6baa; }
.course-module { margin: 2rem 0; padding-top: 1rem; border-top: 1px solid #e3e3e3; }
.module-content { display: flex; flex-direction: column; gap: 1rem; }
.element-hidden { display: none; }
.image-element img, .video-element { max-width: 100%; }
.quiz-element { padding: 1rem; background: #f7f8fa; border-radius: 6px; }
.quiz-options label { display: block; margin: 0.25rem 0; }
.quiz-feedback.correct { color: #1d7a3c; }
.quiz-feedback.incorrect { color: #b02e2e; }
.widget-element .widget-item-title { cursor: pointer; margin: 0.5rem 0 0.25rem; }
.embed-element { width: 100%; min-height: 360px; border: 0; }
.pdf-element { width: 100%; min-height: 480px; }
.course-footer { margin-top: 3rem; color: #999; font-size: 0.85rem; }
"#,
    );
    if course.settings.theme == "dark" {
        css.push_str(
            "body.theme-dark { background: #16181d; color: #e8e8e8; }\nbody.theme-dark .quiz-element { background: #22252c; }\n",
        );
    }
    if course.settings.responsive {
        css.push_str(
            "@media (max-width: 600px) {\n  .course-container { padding: 0.5rem; }\n  .course-navigation ul { flex-direction: column; }\n}\n",
        );
    }
    if course.settings.accessibility {
        css.push_str(
            "a:focus, input:focus { outline: 2px solid #1a6baa; outline-offset: 2px; }\n",
        );
    }
    css
}

fn render_course_js(course: &Course) -> String {
    let completion_required = course
        .modules
        .iter()
        .any(|m| m.settings.completion == crate::model::CompletionPolicy::Manual);
    format!(
        r#"(function () {{
  'use strict';
  var manualCompletion = {completion_required};

  function wireQuizzes() {{
    var quizzes = document.querySelectorAll('.quiz-element');
    quizzes.forEach(function (quiz) {{
      var correct = parseInt(quiz.getAttribute('data-correct'), 10);
      var feedback = quiz.querySelector('.quiz-feedback');
      quiz.querySelectorAll('input[type="radio"]').forEach(function (input) {{
        input.addEventListener('change', function () {{
          var ok = parseInt(input.value, 10) === correct;
          feedback.textContent = ok
            ? feedback.getAttribute('data-feedback-correct')
            : feedback.getAttribute('data-feedback-incorrect');
          feedback.className = 'quiz-feedback ' + (ok ? 'correct' : 'incorrect');
          if (ok && window.courseApi) {{
            window.courseApi.reportInteraction(quiz.getAttribute('data-quiz-id'), true);
          }}
        }});
      }});
    }});
  }}

  function wireWidgets() {{
    document.querySelectorAll('.widget-element').forEach(function (widget) {{
      var type = widget.getAttribute('data-element-type');
      if (type === 'accordion' || type === 'tabs') {{
        widget.querySelectorAll('.widget-item-title').forEach(function (title) {{
          title.addEventListener('click', function () {{
            var body = title.nextElementSibling;
            body.style.display = body.style.display === 'none' ? '' : 'none';
          }});
        }});
      }}
    }});
  }}

  function markViewed() {{
    if (!manualCompletion && window.courseApi) {{
      window.courseApi.reportCompletion();
    }}
  }}

  document.addEventListener('DOMContentLoaded', function () {{
    wireQuizzes();
    wireWidgets();
    markViewed();
  }});
}})();
"#,
        completion_required = completion_required,
    )
}

/// SCORM 1.2 runtime glue: finds the LMS-provided `API` object up the frame
/// chain and reports status through it. Packages still load standalone when
/// no API is present.
fn render_course_api_js() -> String {
    r#"(function () {
  'use strict';

  function findApi(win) {
    var tries = 0;
    while (win && tries < 10) {
      if (win.API) { return win.API; }
      if (win.parent === win) { break; }
      win = win.parent;
      tries += 1;
    }
    return null;
  }

  var api = findApi(window) || (window.opener ? findApi(window.opener) : null);
  var initialized = false;

  if (api) {
    initialized = api.LMSInitialize('') === 'true';
  }

  window.courseApi = {
    reportCompletion: function () {
      if (!initialized) { return; }
      api.LMSSetValue('cmi.core.lesson_status', 'completed');
      api.LMSCommit('');
    },
    reportInteraction: function (id, correct) {
      if (!initialized) { return; }
      api.LMSSetValue('cmi.core.lesson_location', id);
      if (correct) { api.LMSSetValue('cmi.core.score.raw', '100'); }
      api.LMSCommit('');
    }
  };

  window.addEventListener('beforeunload', function () {
    if (initialized) { api.LMSFinish(''); }
  });
})();
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Element, ElementKind, ElementSettings, HeadingContent, MediaUpload, Module, QuizContent,
        TextContent,
    };

    fn element(id: &str, kind: ElementKind) -> Element {
        Element {
            id: id.into(),
            kind,
            settings: ElementSettings::default(),
            position: 0,
            upload: None,
        }
    }

    fn course_with_elements(elements: Vec<Element>) -> Course {
        Course {
            title: "Test Course".into(),
            modules: vec![Module {
                id: "m1".into(),
                title: "Module One".into(),
                elements,
                ..Module::default()
            }],
            ..Course::default()
        }
    }

    #[test]
    fn entry_html_carries_all_structural_markers() {
        let files = render_package(&course_with_elements(vec![])).unwrap();
        for marker in [
            MARKER_CONTAINER,
            MARKER_NAVIGATION,
            MARKER_MODULE_CONTENT,
            MARKER_MODULE_ID,
        ] {
            assert!(files.index_html.contains(marker), "missing marker {marker}");
        }
    }

    #[test]
    fn moduleless_course_still_carries_all_structural_markers() {
        let course = Course {
            title: "Empty".into(),
            ..Course::default()
        };
        let files = render_package(&course).unwrap();
        for marker in [
            MARKER_CONTAINER,
            MARKER_NAVIGATION,
            MARKER_MODULE_CONTENT,
            MARKER_MODULE_ID,
        ] {
            assert!(files.index_html.contains(marker), "missing marker {marker}");
        }
        // the placeholder section must not read back as a module
        let recovered = crate::extract::extract_course(&files.index_html).unwrap();
        assert!(recovered.modules.is_empty());
    }

    #[test]
    fn text_and_heading_render_escaped() {
        let files = render_package(&course_with_elements(vec![
            element(
                "e1",
                ElementKind::Text(TextContent {
                    text: "a < b & c".into(),
                }),
            ),
            element(
                "e2",
                ElementKind::Heading(HeadingContent {
                    text: "Big".into(),
                    level: 3,
                }),
            ),
        ]))
        .unwrap();
        assert!(files.index_html.contains("a &lt; b &amp; c"));
        assert!(files.index_html.contains("<h3 class=\"heading-element\">Big</h3>"));
    }

    #[test]
    fn quiz_radio_groups_are_namespaced_per_element() {
        let quiz = |id: &str| {
            element(
                id,
                ElementKind::Quiz(QuizContent {
                    question: "?".into(),
                    options: vec!["a".into(), "b".into()],
                    correct: 1,
                    feedback: Default::default(),
                }),
            )
        };
        let files =
            render_package(&course_with_elements(vec![quiz("q1"), quiz("q2")])).unwrap();
        assert!(files.index_html.contains("name=\"quiz_q1\""));
        assert!(files.index_html.contains("name=\"quiz_q2\""));
    }

    #[test]
    fn unknown_kind_renders_inert_placeholder() {
        let files = render_package(&course_with_elements(vec![element(
            "e1",
            ElementKind::Unknown {
                kind: "hologram".into(),
                content: serde_json::json!({}),
            },
        )]))
        .unwrap();
        assert!(files
            .index_html
            .contains("<div class=\"unknown-element\" data-element-type=\"hologram\"></div>"));
    }

    #[test]
    fn uploaded_media_gets_derived_name_and_zip_entry() {
        let mut el = element(
            "vid1",
            ElementKind::Video(crate::model::MediaContent {
                src: "ignored-when-uploaded".into(),
                ..Default::default()
            }),
        );
        el.upload = Some(MediaUpload {
            bytes: vec![1, 2, 3],
            extension: "mp4".into(),
        });
        let files = render_package(&course_with_elements(vec![el])).unwrap();
        assert_eq!(files.media.len(), 1);
        assert_eq!(files.media[0].name, "media_vid1.mp4");
        assert!(files.index_html.contains("src=\"media_vid1.mp4\""));
        assert!(files.manifest_xml.contains("media_vid1.mp4"));

        let zipped = pack_zip(&files).unwrap();
        let entries = crate::archive::read_entries(&zipped, u64::MAX).unwrap();
        assert!(entries.iter().any(|e| e.name == "media_vid1.mp4"));
    }

    #[test]
    fn url_media_keeps_literal_source() {
        let files = render_package(&course_with_elements(vec![element(
            "img1",
            ElementKind::Image(crate::model::MediaContent {
                src: "https://example.com/pic.png".into(),
                alt: "pic".into(),
                caption: None,
            }),
        )]))
        .unwrap();
        assert!(files
            .index_html
            .contains("src=\"https://example.com/pic.png\""));
    }

    #[test]
    fn hidden_elements_are_tagged_not_dropped() {
        let mut el = element("e1", ElementKind::Text(TextContent { text: "t".into() }));
        el.settings.visible = false;
        let files = render_package(&course_with_elements(vec![el])).unwrap();
        assert!(files.index_html.contains("element-hidden"));
    }

    #[test]
    fn packed_archive_contains_the_required_file_set() {
        let files = render_package(&course_with_elements(vec![])).unwrap();
        let zipped = pack_zip(&files).unwrap();
        let entries = crate::archive::read_entries(&zipped, u64::MAX).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        for required in crate::classify::REQUIRED_FILES {
            assert!(names.contains(&required), "missing {required}");
        }
    }
}
