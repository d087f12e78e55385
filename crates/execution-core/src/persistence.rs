//! Tracking-state snapshots for restarts.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dedup::Watermark;
use crate::error::PersistenceError;
use crate::event::OrderEvent;
use crate::order::TrackedOrder;

/// Everything needed to resume reconciliation: in-flight orders, trade
/// watermarks and events that were produced but not yet delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingState {
    pub orders: HashMap<String, TrackedOrder>,
    /// Trade watermark (timestamp in ms) per trading pair.
    pub watermarks: BTreeMap<String, Watermark<i64>>,
    #[serde(default)]
    pub pending_events: Vec<OrderEvent>,
}

impl TrackingState {
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty() && self.watermarks.is_empty() && self.pending_events.is_empty()
    }
}

/// Load/save interface for tracking state.
pub trait TrackingStateStore: Send + Sync {
    /// `Ok(None)` when nothing was saved yet.
    fn load(&self) -> Result<Option<TrackingState>, PersistenceError>;

    fn save(&self, state: &TrackingState) -> Result<(), PersistenceError>;
}

/// Stores tracking state as pretty JSON in a single file.
///
/// Writes go to a sibling temp file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrackingStateStore for JsonFileStore {
    fn load(&self) -> Result<Option<TrackingState>, PersistenceError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state: TrackingState = serde_json::from_str(&raw)?;
        debug!(
            path = %self.path.display(),
            orders = state.orders.len(),
            "tracking state loaded"
        );
        Ok(Some(state))
    }

    fn save(&self, state: &TrackingState) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        debug!(
            path = %self.path.display(),
            orders = state.orders.len(),
            "tracking state saved"
        );
        Ok(())
    }
}
