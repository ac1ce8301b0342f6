//! Cassette-scoped runs: pick record or playback from what the store holds.

use crate::errors::TapedeckError;
use crate::logging::log_event;
use crate::replay::recorder::record;
use crate::replay::recording::{Cassette, CassetteName};
use crate::replay::replayer::{playback_with_scope, OrderScope};
use crate::replay::spec::SpecSource;
use crate::store::{CassetteStore, SerializationOptions};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordMode {
    /// Play back an existing cassette, record a missing one.
    #[default]
    Once,
    /// Append new calls to an existing cassette.
    Accumulate,
    /// Always record and overwrite.
    Always,
}

impl RecordMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordMode::Once => "once",
            RecordMode::Accumulate => "accumulate",
            RecordMode::Always => "always",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarnessOptions {
    pub record_mode: RecordMode,
    pub order_scope: OrderScope,
    pub serialization: SerializationOptions,
}

pub fn with_cassette<T>(
    store: &dyn CassetteStore,
    name: &str,
    specs: impl Into<SpecSource>,
    options: &HarnessOptions,
    body: impl FnOnce() -> Result<T, TapedeckError>,
) -> Result<T, TapedeckError> {
    let name = CassetteName::parse(name)?;
    let exists = store.exists(&name);
    match (options.record_mode, exists) {
        (RecordMode::Once, true) => {
            let cassette = store.read(&name, &options.serialization)?;
            playback_with_scope(specs, &cassette, options.order_scope, body)
        }
        (RecordMode::Accumulate, true) => {
            let seed = store.read(&name, &options.serialization)?;
            record_and_write(store, &name, specs, options, body, Some(seed))
        }
        _ => record_and_write(store, &name, specs, options, body, None),
    }
}

fn record_and_write<T>(
    store: &dyn CassetteStore,
    name: &CassetteName,
    specs: impl Into<SpecSource>,
    options: &HarnessOptions,
    body: impl FnOnce() -> Result<T, TapedeckError>,
    seed: Option<Cassette>,
) -> Result<T, TapedeckError> {
    let (result, cassette) = record(specs, body, seed)?;
    store.write(name, &cassette, &options.serialization)?;
    log_event(
        "info",
        "cassette_written",
        json!({
            "name": name.as_str(),
            "record_mode": options.record_mode.as_str(),
            "calls": cassette.calls.len(),
        }),
    );
    Ok(result)
}
