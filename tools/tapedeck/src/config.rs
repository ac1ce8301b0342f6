use crate::errors::TapedeckError;
use crate::harness::{HarnessOptions, RecordMode};
use crate::logging::{init_event_log, JsonlLogger, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::replay::replayer::OrderScope;
use crate::runtime::FileSystem;
use crate::store::SerializationOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TapedeckConfig {
    pub cassettes: CassettesConfig,
    pub recording: RecordingConfig,
    pub playback: PlaybackConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CassettesConfig {
    pub dir: PathBuf,
    pub pretty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordingConfig {
    pub mode: RecordMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaybackConfig {
    pub order_scope: OrderScope,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub event_log: Option<PathBuf>,
    pub max_payload_bytes: usize,
}

impl Default for TapedeckConfig {
    fn default() -> Self {
        Self {
            cassettes: CassettesConfig {
                dir: PathBuf::from("tests/cassettes"),
                pretty: true,
            },
            recording: RecordingConfig {
                mode: RecordMode::Once,
            },
            playback: PlaybackConfig {
                order_scope: OrderScope::PerKey,
            },
            logging: LoggingConfig {
                event_log: None,
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            },
        }
    }
}

impl TapedeckConfig {
    pub fn harness_options(&self) -> HarnessOptions {
        HarnessOptions {
            record_mode: self.recording.mode,
            order_scope: self.playback.order_scope,
            serialization: SerializationOptions {
                pretty: self.cassettes.pretty,
            },
        }
    }

    /// Route session events to the configured JSONL file, if any.
    pub fn init_event_log(&self) {
        if let Some(path) = &self.logging.event_log {
            let mut logger = JsonlLogger::new(path);
            logger.max_payload_bytes = self.logging.max_payload_bytes;
            init_event_log(logger);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialTapedeckConfig {
    cassettes: Option<PartialCassettesConfig>,
    recording: Option<PartialRecordingConfig>,
    playback: Option<PartialPlaybackConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialCassettesConfig {
    dir: Option<PathBuf>,
    pretty: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialRecordingConfig {
    mode: Option<RecordMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialPlaybackConfig {
    order_scope: Option<OrderScope>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
    event_log: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
}

/// Defaults, overlaid with the TOML file at `path` when one is given.
pub fn load_config(
    path: Option<&Path>,
    fs: &dyn FileSystem,
) -> Result<TapedeckConfig, TapedeckError> {
    let mut cfg = TapedeckConfig::default();

    if let Some(path) = path {
        let file_contents = fs.read_to_string(path)?;
        let partial: PartialTapedeckConfig = toml::from_str(&file_contents)
            .map_err(|e| TapedeckError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut TapedeckConfig, partial: PartialTapedeckConfig) {
    if let Some(cassettes) = partial.cassettes {
        if let Some(dir) = cassettes.dir {
            cfg.cassettes.dir = dir;
        }
        if let Some(pretty) = cassettes.pretty {
            cfg.cassettes.pretty = pretty;
        }
    }

    if let Some(recording) = partial.recording {
        if let Some(mode) = recording.mode {
            cfg.recording.mode = mode;
        }
    }

    if let Some(playback) = partial.playback {
        if let Some(order_scope) = playback.order_scope {
            cfg.playback.order_scope = order_scope;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(event_log) = logging.event_log {
            cfg.logging.event_log = Some(event_log);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
    }
}

fn validate_config(cfg: &TapedeckConfig) -> Result<(), TapedeckError> {
    if cfg.cassettes.dir.as_os_str().is_empty() {
        return Err(TapedeckError::InvalidConfig(
            "cassettes.dir must not be empty".to_string(),
        ));
    }

    if cfg.logging.max_payload_bytes == 0 {
        return Err(TapedeckError::InvalidConfig(
            "logging.max_payload_bytes must be greater than zero".to_string(),
        ));
    }

    if !cfg.playback.order_scope.is_supported() {
        return Err(TapedeckError::InvalidConfig(format!(
            "playback.order_scope {} is not implemented; use per_key",
            cfg.playback.order_scope
        )));
    }

    Ok(())
}
