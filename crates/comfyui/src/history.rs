//! Execution records returned by `GET /history/{prompt_id}`.
//!
//! ComfyUI answers with `{"<prompt_id>": {"outputs": {"<node>": {...}}, ...}}`
//! once a prompt has run, and with `{}` when it knows nothing about it.

use serde_json::{Map, Value};

/// Output field under which video-combine nodes list produced files.
pub const MEDIA_OUTPUT_FIELD: &str = "gifs";

/// Per-node outputs of one finished prompt.
///
/// Node order is the order ComfyUI serialized them in, which is not
/// necessarily the graph's submission order.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub prompt_id: String,
    pub outputs: Map<String, Value>,
}

/// One produced file as listed in a node's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    /// Node that produced the file.
    pub node_id: String,
    /// Absolute path on the ComfyUI host, when the node reports one.
    pub fullpath: Option<String>,
    pub filename: Option<String>,
    pub subfolder: String,
    /// Folder type (`output`, `temp`, ...).
    pub folder_type: String,
}

impl ExecutionRecord {
    /// Pick the record for `prompt_id` out of a history response.
    ///
    /// Returns `None` when the response has no entry for the prompt.
    pub fn from_history(prompt_id: &str, history: &Value) -> Option<Self> {
        let entry = history.get(prompt_id)?;
        let outputs = entry
            .get("outputs")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Some(Self {
            prompt_id: prompt_id.to_string(),
            outputs,
        })
    }

    /// All media artifacts, walking nodes in record order.
    pub fn artifacts(&self) -> impl Iterator<Item = ArtifactRef> + '_ {
        self.outputs.iter().flat_map(|(node_id, node_output)| {
            node_output
                .get(MEDIA_OUTPUT_FIELD)
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(move |entry| ArtifactRef::from_entry(node_id, entry))
        })
    }

    /// The first artifact of the first node that produced any.
    pub fn first_artifact(&self) -> Option<ArtifactRef> {
        self.artifacts().next()
    }
}

impl ArtifactRef {
    fn from_entry(node_id: &str, entry: &Value) -> Option<Self> {
        let text = |key: &str| entry.get(key).and_then(Value::as_str).map(str::to_string);
        let fullpath = text("fullpath");
        let filename = text("filename");
        if fullpath.is_none() && filename.is_none() {
            return None;
        }

        Some(Self {
            node_id: node_id.to_string(),
            fullpath,
            filename,
            subfolder: text("subfolder").unwrap_or_default(),
            folder_type: text("type").unwrap_or_else(|| "output".to_string()),
        })
    }
}
