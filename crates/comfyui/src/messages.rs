//! Frames ComfyUI pushes over `/ws`.
//!
//! Text frames are `{"type": "<kind>", "data": {...}}`. Binary frames carry
//! preview images and are dropped by the monitor before they get here.

use serde::Deserialize;

use crate::history::MEDIA_OUTPUT_FIELD;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ComfyUIMessage {
    Status(StatusData),
    ExecutionStart(PromptStarted),
    ExecutionCached(CachedNodes),
    /// `node: null` for a prompt marks that prompt as done.
    Executing(ExecutingData),
    Progress(ProgressData),
    Executed(ExecutedData),
    ExecutionError(ErrorData),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    status: QueueState,
}

#[derive(Debug, Clone, Deserialize)]
struct QueueState {
    exec_info: ExecInfo,
}

#[derive(Debug, Clone, Deserialize)]
struct ExecInfo {
    queue_remaining: i32,
}

impl StatusData {
    /// Prompts still waiting in the ComfyUI queue.
    pub fn queue_remaining(&self) -> i32 {
        self.status.exec_info.queue_remaining
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptStarted {
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CachedNodes {
    pub prompt_id: String,
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// `node` is absent, null or empty once nothing is left to run.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

impl ExecutingData {
    pub fn is_idle(&self) -> bool {
        self.node.as_deref().map_or(true, str::is_empty)
    }

    /// Terminal event for `prompt_id`.
    pub fn finishes(&self, prompt_id: &str) -> bool {
        self.is_idle() && self.prompt_id.as_deref() == Some(prompt_id)
    }
}

/// Sampler step counter.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    pub value: u32,
    pub max: u32,
    #[serde(default)]
    pub node: Option<String>,
}

impl ProgressData {
    pub fn percent(&self) -> u8 {
        if self.max == 0 {
            return 0;
        }
        (u64::from(self.value.min(self.max)) * 100 / u64::from(self.max)) as u8
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    pub node: String,
    pub prompt_id: String,
    #[serde(default)]
    pub output: serde_json::Value,
}

impl ExecutedData {
    /// File names the node wrote under the video output field.
    pub fn media_files(&self) -> Vec<&str> {
        self.output
            .get(MEDIA_OUTPUT_FIELD)
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.get("filename").and_then(|f| f.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub prompt_id: String,
    pub node_id: String,
    pub exception_type: String,
    pub exception_message: String,
}

/// Unknown `type` values (custom-node chatter such as `crystools.monitor`)
/// come back as `Err`; the monitor skips them.
pub fn parse_message(text: &str) -> Result<ComfyUIMessage, serde_json::Error> {
    serde_json::from_str(text)
}
