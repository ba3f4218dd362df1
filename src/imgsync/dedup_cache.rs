use crate::imgsync::util::write_atomic;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// What is known about one channel message. Field order matches the
/// on-disk layout (`dig, fwd, name, rct`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub dig: String,
    pub fwd: u64,
    /// Archive file holding this message's photo; `None` when the original
    /// bytes are unrecoverable.
    pub name: Option<String>,
    pub rct: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupCache {
    records: BTreeMap<u64, RemoteRecord>,
}

impl DedupCache {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let keyed: BTreeMap<String, RemoteRecord> = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        let mut records = BTreeMap::new();
        for (key, record) in keyed {
            let id = key
                .parse::<u64>()
                .with_context(|| format!("invalid message id {key:?} in {}", path.display()))?;
            records.insert(id, record);
        }
        Ok(Self { records })
    }

    /// One-space indented JSON with keys sorted as strings.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let keyed: BTreeMap<String, &RemoteRecord> = self
            .records
            .iter()
            .map(|(id, record)| (id.to_string(), record))
            .collect();
        let mut ser = serde_json::Serializer::with_formatter(
            Vec::new(),
            PrettyFormatter::with_indent(b" "),
        );
        keyed.serialize(&mut ser)?;
        Ok(ser.into_inner())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_bytes()?)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, id: u64) -> Option<&RemoteRecord> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.records.contains_key(&id)
    }

    /// Lowest message id worth fetching: everything for an empty cache,
    /// otherwise a window below the newest id so recent counters refresh.
    pub fn min_fetch_id(&self, lookback: u64) -> u64 {
        self.records
            .last_key_value()
            .map(|(max_id, _)| max_id.saturating_sub(lookback))
            .unwrap_or(0)
    }

    /// Update the mutable counters of a known message. Returns whether
    /// anything changed; unknown ids are left alone.
    pub fn refresh_counters(&mut self, id: u64, fwd: u64, rct: u64) -> bool {
        let Some(record) = self.records.get_mut(&id) else {
            return false;
        };
        if record.fwd == fwd && record.rct == rct {
            return false;
        }
        record.fwd = fwd;
        record.rct = rct;
        true
    }

    pub fn insert(&mut self, id: u64, record: RemoteRecord) {
        self.records.insert(id, record);
    }
}
