//! Workflow template selection and parameter injection.
//!
//! Four ComfyUI API-format graphs ship with the worker, one per
//! combination of [`SubjectMode`] and [`PersonCount`]. Each graph is a
//! JSON object mapping node IDs to `{"class_type", "inputs", ...}`.
//! Job values are written into a fixed set of `(node, input)` slots;
//! every other node passes through untouched.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use infinitetalk_core::media::{PersonCount, SubjectMode};

// ---------------------------------------------------------------------------
// Template node contract
// ---------------------------------------------------------------------------

/// `LoadImage` node of the I2V templates.
pub const NODE_IMAGE: &str = "284";
/// `VHS_LoadVideo` node of the V2V templates.
pub const NODE_VIDEO: &str = "228";
/// First speaker's `LoadAudio` node.
pub const NODE_AUDIO: &str = "125";
/// Text encoder node holding the positive prompt.
pub const NODE_PROMPT: &str = "241";
/// Output width constant.
pub const NODE_WIDTH: &str = "245";
/// Output height constant.
pub const NODE_HEIGHT: &str = "246";
/// Frame count constant.
pub const NODE_MAX_FRAMES: &str = "270";
/// Second speaker's `LoadAudio` node in `I2V_multi.json`.
pub const NODE_SECOND_AUDIO_I2V: &str = "307";
/// Second speaker's `LoadAudio` node in `V2V_multi.json`.
pub const NODE_SECOND_AUDIO_V2V: &str = "313";

/// Errors raised while loading or filling a template.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Failed to read workflow {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid workflow JSON in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Workflow {} is not a JSON object", .0.display())]
    NotAnObject(PathBuf),

    #[error("Workflow node {node} (input '{input}') is missing from the template")]
    MissingNode { node: &'static str, input: &'static str },
}

/// One of the four template shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkflowVariant {
    pub subject: SubjectMode,
    pub persons: PersonCount,
}

impl WorkflowVariant {
    pub fn new(subject: SubjectMode, persons: PersonCount) -> Self {
        Self { subject, persons }
    }

    /// Template file name inside the workflow directory.
    pub fn file_name(&self) -> &'static str {
        match (self.subject, self.persons) {
            (SubjectMode::Image, PersonCount::Single) => "I2V_single.json",
            (SubjectMode::Image, PersonCount::Multi) => "I2V_multi.json",
            (SubjectMode::Video, PersonCount::Single) => "V2V_single.json",
            (SubjectMode::Video, PersonCount::Multi) => "V2V_multi.json",
        }
    }

    /// Node and input that receive the image or video path.
    pub fn media_slot(&self) -> (&'static str, &'static str) {
        match self.subject {
            SubjectMode::Image => (NODE_IMAGE, "image"),
            SubjectMode::Video => (NODE_VIDEO, "video"),
        }
    }

    /// Second speaker's audio node, for multi-person variants.
    pub fn second_audio_node(&self) -> Option<&'static str> {
        match (self.subject, self.persons) {
            (_, PersonCount::Single) => None,
            (SubjectMode::Image, PersonCount::Multi) => Some(NODE_SECOND_AUDIO_I2V),
            (SubjectMode::Video, PersonCount::Multi) => Some(NODE_SECOND_AUDIO_V2V),
        }
    }
}

/// Values injected into a template.
#[derive(Debug, Clone)]
pub struct Bindings {
    pub media_path: PathBuf,
    pub audio_path: PathBuf,
    /// Only used by multi-person variants.
    pub second_audio_path: Option<PathBuf>,
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub max_frames: u32,
}

/// A loaded graph plus the variant it was selected for.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    variant: WorkflowVariant,
    nodes: Map<String, Value>,
}

/// Loads templates from a directory.
#[derive(Debug, Clone)]
pub struct WorkflowTemplateEngine {
    workflow_dir: PathBuf,
}

impl WorkflowTemplateEngine {
    pub fn new(workflow_dir: impl Into<PathBuf>) -> Self {
        Self {
            workflow_dir: workflow_dir.into(),
        }
    }

    pub fn template_path(&self, variant: WorkflowVariant) -> PathBuf {
        self.workflow_dir.join(variant.file_name())
    }

    /// Load the template for `(subject, persons)` verbatim.
    pub async fn build(
        &self,
        subject: SubjectMode,
        persons: PersonCount,
    ) -> Result<WorkflowTemplate, WorkflowError> {
        let variant = WorkflowVariant::new(subject, persons);
        let path = self.template_path(variant);
        tracing::info!(path = %path.display(), "Loading workflow template");

        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| WorkflowError::Read {
                path: path.clone(),
                source,
            })?;
        let value: Value = serde_json::from_str(&text).map_err(|source| WorkflowError::Parse {
            path: path.clone(),
            source,
        })?;

        WorkflowTemplate::from_value(variant, value).ok_or(WorkflowError::NotAnObject(path))
    }
}

impl WorkflowTemplate {
    /// Wrap an already-parsed graph. Returns `None` if it is not an object.
    pub fn from_value(variant: WorkflowVariant, value: Value) -> Option<Self> {
        match value {
            Value::Object(nodes) => Some(Self { variant, nodes }),
            _ => None,
        }
    }

    pub fn variant(&self) -> WorkflowVariant {
        self.variant
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn has_node(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    /// Current value of `node.inputs.input`.
    pub fn input(&self, node: &str, input: &str) -> Option<&Value> {
        self.nodes.get(node)?.get("inputs")?.get(input)
    }

    /// Write `bindings` into the template's fixed slots.
    ///
    /// A multi-person template without its second audio node is accepted
    /// and leaves the second speaker unbound.
    pub fn apply(&mut self, bindings: &Bindings) -> Result<(), WorkflowError> {
        let (media_node, media_input) = self.variant.media_slot();
        self.set_input(media_node, media_input, path_value(&bindings.media_path))?;
        self.set_input(NODE_AUDIO, "audio", path_value(&bindings.audio_path))?;
        self.set_input(
            NODE_PROMPT,
            "positive_prompt",
            Value::String(bindings.prompt.clone()),
        )?;
        self.set_input(NODE_WIDTH, "value", Value::from(bindings.width))?;
        self.set_input(NODE_HEIGHT, "value", Value::from(bindings.height))?;
        self.set_input(NODE_MAX_FRAMES, "value", Value::from(bindings.max_frames))?;

        if let Some(node) = self.variant.second_audio_node() {
            match &bindings.second_audio_path {
                Some(path) if self.has_node(node) => {
                    self.set_input(node, "audio", path_value(path))?;
                }
                Some(_) => {
                    tracing::warn!(
                        template = self.variant.file_name(),
                        node,
                        "Template has no second audio node, second speaker audio not applied",
                    );
                }
                None => {
                    tracing::info!(node, "No second audio supplied, leaving template default");
                }
            }
        }

        tracing::debug!(
            template = self.variant.file_name(),
            nodes = self.node_count(),
            "Workflow parameters applied",
        );
        Ok(())
    }

    /// The graph as submitted to ComfyUI.
    pub fn to_value(&self) -> Value {
        Value::Object(self.nodes.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.nodes)
    }

    fn set_input(
        &mut self,
        node: &'static str,
        input: &'static str,
        value: Value,
    ) -> Result<(), WorkflowError> {
        let inputs = self
            .nodes
            .get_mut(node)
            .and_then(Value::as_object_mut)
            .map(|n| {
                n.entry("inputs")
                    .or_insert_with(|| Value::Object(Map::new()))
            })
            .and_then(Value::as_object_mut)
            .ok_or(WorkflowError::MissingNode { node, input })?;

        inputs.insert(input.to_string(), value);
        Ok(())
    }
}

fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}
