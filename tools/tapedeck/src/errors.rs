use crate::replay::replayer::OrderScope;
use sha2::{Digest, Sha256};
use thiserror::Error;

const DISPLAY_KEY_THRESHOLD: usize = 256;

#[derive(Debug, Error)]
pub enum TapedeckError {
    #[error("invalid specs: {0}")]
    InvalidSpecs(String),
    #[error("ambiguous session state: {modes} sessions are active at the same time")]
    AmbiguousSessionState { modes: String },
    #[error(
        "cassette exhausted: no recorded call left for {target_id} with arg key {}",
        display_key(.arg_key)
    )]
    ExhaustedCassette {
        target_id: String,
        arg_key: serde_json::Value,
    },
    #[error("invalid cassette name: {0}")]
    InvalidCassetteName(String),
    #[error("unsupported order scope: {0}")]
    UnsupportedOrderScope(OrderScope),
    #[error("call to {target_id} failed: {message}")]
    Call { target_id: String, message: String },
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
}

impl TapedeckError {
    pub fn exhausted(target_id: &str, arg_key: &serde_json::Value) -> Self {
        Self::ExhaustedCassette {
            target_id: target_id.to_string(),
            arg_key: arg_key.clone(),
        }
    }

    pub fn call(target_id: &str, message: impl Into<String>) -> Self {
        Self::Call {
            target_id: target_id.to_string(),
            message: message.into(),
        }
    }
}

/// Render an arg key for humans, fingerprinting keys too large to print.
pub fn display_key(key: &serde_json::Value) -> String {
    let rendered = key.to_string();
    if rendered.len() <= DISPLAY_KEY_THRESHOLD {
        return rendered;
    }
    let hash = Sha256::digest(rendered.as_bytes());
    let prefix: String = hash[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("<hash:sha256:{prefix}>")
}
