//! Audit logs.
//!
//! Per-chain event logs record discovered intents and submission outcomes;
//! `Error.log` is the single sink every relay error passes through. Writes are
//! best effort: a failing audit write is reported through `tracing` and never
//! interrupts relaying.

use std::fmt;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use tracing::error;

use super::{append_line, StorageLayout};
use crate::intent::Chain;

/// Where an error happened: chain, contract, action and a human note.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub chain: Chain,
    pub contract: String,
    pub action: String,
    pub context: String,
}

impl ErrorContext {
    pub fn new(
        chain: Chain,
        contract: impl Into<String>,
        action: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            chain,
            contract: contract.into(),
            action: action.into(),
            context: context.into(),
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.chain, self.contract, self.action, self.context)
    }
}

/// Writer for the chain event logs and the shared error log.
#[derive(Debug, Clone)]
pub struct OracleLogs {
    layout: StorageLayout,
}

impl OracleLogs {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Appends `"<timestamp> <message>"` to a chain log.
    pub fn chain_text(&self, chain: Chain, message: &str) {
        let line = format!("{} {}", timestamp(), flatten(message));
        write_best_effort(&self.layout.chain_log(chain), &line);
    }

    /// Appends a JSON record (with a `timeStamp` field for objects) to a chain log.
    pub fn chain_json(&self, chain: Chain, record: serde_json::Value) {
        let record = match record {
            serde_json::Value::Object(mut map) => {
                map.insert("timeStamp".to_string(), serde_json::Value::String(timestamp()));
                serde_json::Value::Object(map)
            }
            other => other,
        };
        write_best_effort(&self.layout.chain_log(chain), &record.to_string());
    }

    /// Records an error in `Error.log` and the tracing output.
    pub fn record_error(&self, context: &ErrorContext, err: &dyn fmt::Display) {
        let message = flatten(&format!("{}: {}", context, err));
        error!("{}", message);
        write_best_effort(
            &self.layout.error_log(),
            &format!("{} {}", timestamp(), message),
        );
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Keeps one record per line.
fn flatten(message: &str) -> String {
    message.replace("\r\n", ", ").replace(['\n', '\r'], ", ")
}

fn write_best_effort(path: &Path, line: &str) {
    if let Err(e) = append_line(path, line) {
        error!("Failed to write audit log {}: {:#}", path.display(), e);
    }
}
