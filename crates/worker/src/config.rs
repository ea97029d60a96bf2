use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use infinitetalk_comfyui::connector::{ConnectorConfig, RetryLadder};
use infinitetalk_pipeline::OrchestratorConfig;

/// A configuration variable that could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("{var} has invalid value {value:?}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults matching a worker deployed next to ComfyUI.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Intake bind address (default: `0.0.0.0`).
    pub host: String,
    /// Intake bind port (default: `8000`).
    pub port: u16,
    /// Everything the job pipeline needs.
    pub orchestrator: OrchestratorConfig,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                   | Default               |
    /// |---------------------------|-----------------------|
    /// | `HOST`                    | `0.0.0.0`             |
    /// | `PORT`                    | `8000`                |
    /// | `SERVER_ADDRESS`          | `127.0.0.1`           |
    /// | `COMFYUI_PORT`            | `8188`                |
    /// | `WORKFLOW_DIR`            | `./workflows`         |
    /// | `SCRATCH_ROOT`            | `.`                   |
    /// | `DEFAULT_IMAGE_PATH`      | `/examples/image.jpg` |
    /// | `DEFAULT_AUDIO_PATH`      | `/examples/audio.mp3` |
    /// | `DEFAULT_FPS`             | `25`                  |
    /// | `DOWNLOAD_TIMEOUT_SECS`   | `60`                  |
    /// | `PROBE_ATTEMPTS`          | `180`                 |
    /// | `PROBE_INTERVAL_MS`       | `1000`                |
    /// | `PROBE_TIMEOUT_SECS`      | `5`                   |
    /// | `CONNECT_ATTEMPTS`        | `36`                  |
    /// | `CONNECT_INTERVAL_MS`     | `5000`                |
    /// | `COMPLETION_TIMEOUT_SECS` | `1800` (`0` disables) |
    ///
    /// `client_id` identifies this process to ComfyUI for its lifetime.
    pub fn from_env(client_id: impl Into<String>) -> Result<Self, ConfigError> {
        Self::from_lookup(client_id, |var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(client_id: impl Into<String>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let mut orchestrator = OrchestratorConfig::new(client_id);
        let defaults = ConnectorConfig::default();

        if let Some(host) = env.string("SERVER_ADDRESS") {
            orchestrator.comfyui_host = host;
        }
        orchestrator.comfyui_port = env.parse("COMFYUI_PORT", orchestrator.comfyui_port)?;
        orchestrator.workflow_dir = env
            .string("WORKFLOW_DIR")
            .map_or_else(|| PathBuf::from("./workflows"), PathBuf::from);
        if let Some(dir) = env.string("SCRATCH_ROOT") {
            orchestrator.scratch_root = dir.into();
        }
        if let Some(path) = env.string("DEFAULT_IMAGE_PATH") {
            orchestrator.default_image_path = path.into();
        }
        if let Some(path) = env.string("DEFAULT_AUDIO_PATH") {
            orchestrator.default_audio_path = path.into();
        }

        orchestrator.fps = env.parse("DEFAULT_FPS", orchestrator.fps)?;
        if orchestrator.fps == 0 {
            return Err(ConfigError {
                var: "DEFAULT_FPS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        orchestrator.download_timeout = Duration::from_secs(
            env.parse("DOWNLOAD_TIMEOUT_SECS", orchestrator.download_timeout.as_secs())?,
        );

        orchestrator.connector = ConnectorConfig {
            probe: RetryLadder::new(
                env.parse("PROBE_ATTEMPTS", defaults.probe.attempts)?,
                env.millis("PROBE_INTERVAL_MS", defaults.probe.interval)?,
            ),
            probe_timeout: Duration::from_secs(
                env.parse("PROBE_TIMEOUT_SECS", defaults.probe_timeout.as_secs())?,
            ),
            connect: RetryLadder::new(
                env.parse("CONNECT_ATTEMPTS", defaults.connect.attempts)?,
                env.millis("CONNECT_INTERVAL_MS", defaults.connect.interval)?,
            ),
        };

        let completion_secs: u64 = env.parse(
            "COMPLETION_TIMEOUT_SECS",
            orchestrator
                .completion_timeout
                .map_or(0, |timeout| timeout.as_secs()),
        )?;
        orchestrator.completion_timeout =
            (completion_secs > 0).then(|| Duration::from_secs(completion_secs));

        Ok(Self {
            host: env.string("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: env.parse("PORT", 8000)?,
            orchestrator,
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty, trimmed value of `var`.
    fn string(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(var) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError {
                var,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn millis(&self, var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        let ms = self.parse(var, u64::try_from(default.as_millis()).unwrap_or(u64::MAX))?;
        Ok(Duration::from_millis(ms))
    }
}
