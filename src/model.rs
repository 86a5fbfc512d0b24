use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// In-memory course model edited by the authoring UI and rendered by the
/// package builder. Serialized shape matches the persisted JSON records
/// (camelCase keys, elements tagged by a `type` string).

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub modules: Vec<Module>,
    #[serde(default)]
    pub settings: CourseSettings,
}

impl Course {
    pub fn element_count(&self) -> usize {
        self.modules.iter().map(|m| m.elements.len()).sum()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CourseSettings {
    pub theme: String,
    pub navigation: String,
    pub responsive: bool,
    pub accessibility: bool,
}

impl Default for CourseSettings {
    fn default() -> Self {
        CourseSettings {
            theme: "light".into(),
            navigation: "sidebar".into(),
            responsive: true,
            accessibility: true,
        }
    }
}

/// One ordered, named collection of content units.
///
/// Module ids are unique within a course and stable across edits; targeted
/// updates and the per-module markers in the rendered HTML both key on them.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub settings: ModuleSettings,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSettings {
    #[serde(default)]
    pub completion: CompletionPolicy,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompletionPolicy {
    Manual,
    #[default]
    Automatic,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    #[serde(flatten)]
    pub kind: ElementKind,
    #[serde(default)]
    pub settings: ElementSettings,
    #[serde(default)]
    pub position: u32,
    /// Raw bytes of an uploaded media file, if the element's source is an
    /// upload rather than a URL. Never persisted with the model; the builder
    /// emits it as a `media_<elementId>.<ext>` archive entry instead.
    #[serde(skip)]
    pub upload: Option<MediaUpload>,
}

#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub bytes: Vec<u8>,
    pub extension: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ElementSettings {
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub animation: Option<String>,
    #[serde(default = "default_true")]
    pub responsive: bool,
}

impl Default for ElementSettings {
    fn default() -> Self {
        ElementSettings {
            visible: true,
            required: false,
            animation: None,
            responsive: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Closed union over content kinds. Foreign or future kinds deserialize into
/// `Unknown` with their raw payload intact, so renderers stay exhaustive
/// without ever rejecting a document.
#[derive(Debug, Clone)]
pub enum ElementKind {
    Text(TextContent),
    Heading(HeadingContent),
    Image(MediaContent),
    Video(MediaContent),
    Audio(MediaContent),
    Quiz(QuizContent),
    Interactive(WidgetContent),
    Accordion(WidgetContent),
    Tabs(WidgetContent),
    Timeline(WidgetContent),
    Gallery(WidgetContent),
    Embed(EmbedContent),
    Pdf(MediaContent),
    Unknown {
        kind: String,
        content: serde_json::Value,
    },
}

impl ElementKind {
    pub fn kind_name(&self) -> &str {
        match self {
            ElementKind::Text(_) => "text",
            ElementKind::Heading(_) => "heading",
            ElementKind::Image(_) => "image",
            ElementKind::Video(_) => "video",
            ElementKind::Audio(_) => "audio",
            ElementKind::Quiz(_) => "quiz",
            ElementKind::Interactive(_) => "interactive",
            ElementKind::Accordion(_) => "accordion",
            ElementKind::Tabs(_) => "tabs",
            ElementKind::Timeline(_) => "timeline",
            ElementKind::Gallery(_) => "gallery",
            ElementKind::Embed(_) => "embed",
            ElementKind::Pdf(_) => "pdf",
            ElementKind::Unknown { kind, .. } => kind,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TextContent {
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct HeadingContent {
    pub text: String,
    #[serde(default = "default_heading_level")]
    pub level: u8,
}

fn default_heading_level() -> u8 {
    2
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MediaContent {
    #[serde(default)]
    pub src: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct EmbedContent {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct WidgetContent {
    #[serde(default)]
    pub items: Vec<WidgetItem>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct WidgetItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct QuizContent {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct: usize,
    #[serde(default)]
    pub feedback: QuizFeedback,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct QuizFeedback {
    #[serde(default)]
    pub correct: String,
    #[serde(default)]
    pub incorrect: String,
}

impl QuizContent {
    /// Remove an option, keeping `correct` a valid index.
    ///
    /// Removing the current correct answer re-resolves `correct` to the
    /// previous option (clamped at 0); removing an earlier option shifts it
    /// down by one; removing a later option leaves it alone.
    pub fn remove_option(&mut self, index: usize) -> Option<String> {
        if index >= self.options.len() {
            return None;
        }
        let removed = self.options.remove(index);
        if index < self.correct {
            self.correct -= 1;
        } else if index == self.correct {
            self.correct = index.saturating_sub(1);
        }
        if !self.options.is_empty() && self.correct >= self.options.len() {
            self.correct = self.options.len() - 1;
        }
        Some(removed)
    }
}

// The `{type, content}` wire shape used by persisted records and the editing
// UI. Serde's adjacent tagging cannot fall through to a catch-all variant,
// so the mapping is spelled out.
#[derive(Serialize, Deserialize)]
struct TaggedKind {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: serde_json::Value,
}

impl Serialize for ElementKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        fn tag<S: Serializer, T: Serialize>(
            kind: &str,
            content: &T,
        ) -> Result<TaggedKind, S::Error> {
            Ok(TaggedKind {
                kind: kind.to_string(),
                content: serde_json::to_value(content).map_err(serde::ser::Error::custom)?,
            })
        }
        let tagged = match self {
            ElementKind::Text(c) => tag::<S, _>("text", c)?,
            ElementKind::Heading(c) => tag::<S, _>("heading", c)?,
            ElementKind::Image(c) => tag::<S, _>("image", c)?,
            ElementKind::Video(c) => tag::<S, _>("video", c)?,
            ElementKind::Audio(c) => tag::<S, _>("audio", c)?,
            ElementKind::Quiz(c) => tag::<S, _>("quiz", c)?,
            ElementKind::Interactive(c) => tag::<S, _>("interactive", c)?,
            ElementKind::Accordion(c) => tag::<S, _>("accordion", c)?,
            ElementKind::Tabs(c) => tag::<S, _>("tabs", c)?,
            ElementKind::Timeline(c) => tag::<S, _>("timeline", c)?,
            ElementKind::Gallery(c) => tag::<S, _>("gallery", c)?,
            ElementKind::Embed(c) => tag::<S, _>("embed", c)?,
            ElementKind::Pdf(c) => tag::<S, _>("pdf", c)?,
            ElementKind::Unknown { kind, content } => TaggedKind {
                kind: kind.clone(),
                content: content.clone(),
            },
        };
        tagged.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ElementKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = TaggedKind::deserialize(deserializer)?;
        fn content<'de, D: Deserializer<'de>, T: DeserializeOwned>(
            value: serde_json::Value,
        ) -> Result<T, D::Error> {
            serde_json::from_value(value).map_err(serde::de::Error::custom)
        }
        Ok(match raw.kind.as_str() {
            "text" => ElementKind::Text(content::<D, _>(raw.content)?),
            "heading" => ElementKind::Heading(content::<D, _>(raw.content)?),
            "image" => ElementKind::Image(content::<D, _>(raw.content)?),
            "video" => ElementKind::Video(content::<D, _>(raw.content)?),
            "audio" => ElementKind::Audio(content::<D, _>(raw.content)?),
            "quiz" => ElementKind::Quiz(content::<D, _>(raw.content)?),
            "interactive" => ElementKind::Interactive(content::<D, _>(raw.content)?),
            "accordion" => ElementKind::Accordion(content::<D, _>(raw.content)?),
            "tabs" => ElementKind::Tabs(content::<D, _>(raw.content)?),
            "timeline" => ElementKind::Timeline(content::<D, _>(raw.content)?),
            "gallery" => ElementKind::Gallery(content::<D, _>(raw.content)?),
            "embed" => ElementKind::Embed(content::<D, _>(raw.content)?),
            "pdf" => ElementKind::Pdf(content::<D, _>(raw.content)?),
            _ => ElementKind::Unknown {
                kind: raw.kind,
                content: raw.content,
            },
        })
    }
}
