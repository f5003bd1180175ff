//! Dispatch records are used to remember which assertions have already been
//! processed, and with what outcome.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatch::Outcome;
use crate::provider::{DispatchStore, Result};

/// The duration for which a stored item is valid.
pub enum Expire {
    /// A dispatch record, long enough to outlive any redelivery of the
    /// assertion.
    Dispatch,

    /// The persistent identifier remembered for the next log on.
    PersistentIdentifier,
}

impl Expire {
    /// Returns the duration for which the item is valid.
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        match self {
            Self::Dispatch => TimeDelta::try_hours(1).unwrap_or_default(),
            Self::PersistentIdentifier => TimeDelta::try_days(14).unwrap_or_default(),
        }
    }
}

/// The processed state of one assertion, keyed by its fingerprint.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRecord {
    /// Fingerprint of the raw assertion parameters.
    pub fingerprint: String,

    /// Set once the assertion has been classified and its side effects
    /// claimed.
    pub processed: bool,

    /// The outcome of processing.
    pub outcome: Outcome,

    /// The time this record should expire.
    pub expires_at: DateTime<Utc>,
}

/// In-memory [`DispatchStore`]. Used for stateless contexts and suitable for
/// single-process hosts.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<String, (DispatchRecord, DateTime<Utc>)>>>,
}

impl DispatchStore for MemoryStore {
    async fn get(&self, fingerprint: &str) -> Result<Option<DispatchRecord>> {
        let records = self.records.lock().map_err(|e| anyhow!("issue locking records: {e}"))?;
        let record = records
            .get(fingerprint)
            .filter(|(_, expiry)| *expiry > Utc::now())
            .map(|(record, _)| record.clone());
        Ok(record)
    }

    async fn put_if_absent(
        &self, record: &DispatchRecord, expiry: DateTime<Utc>,
    ) -> Result<Option<DispatchRecord>> {
        let mut records =
            self.records.lock().map_err(|e| anyhow!("issue locking records: {e}"))?;

        let now = Utc::now();
        records.retain(|_, (_, expires)| *expires > now);

        match records.entry(record.fingerprint.clone()) {
            Entry::Occupied(existing) => Ok(Some(existing.get().0.clone())),
            Entry::Vacant(vacant) => {
                vacant.insert((record.clone(), expiry));
                Ok(None)
            }
        }
    }
}
