//! Append-only ledger of per-pass add/modify/remove counts.
//!
//! Encoded form: `key=KIND:count;KIND:count|key=...`. Keys are
//! `<event-id>:<timestamp>` and may contain `:` but never `|`, `=` or `;`.
//! Records are appended on every merge, so the same key can appear more
//! than once in a stored ledger; decoding sums such repeats.

use crate::catalog::Subset;
use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const RECORD_SEP: char = '|';
const KEY_SEP: char = '=';
const KIND_SEP: char = ';';
const COUNT_SEP: char = ':';

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
  Added,
  Modified,
  Removed,
}

impl ChangeKind {
  pub const ALL: [ChangeKind; 3] = [ChangeKind::Added, ChangeKind::Modified, ChangeKind::Removed];

  pub fn as_str(&self) -> &'static str {
    match self {
      ChangeKind::Added => "ADDED",
      ChangeKind::Modified => "MODIFIED",
      ChangeKind::Removed => "REMOVED",
    }
  }
}

impl fmt::Display for ChangeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ChangeKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "ADDED" => Ok(ChangeKind::Added),
      "MODIFIED" => Ok(ChangeKind::Modified),
      "REMOVED" => Ok(ChangeKind::Removed),
      other => Err(Error::AuditFormat(format!("unknown change kind '{}'", other))),
    }
  }
}

/// Event key -> change kind -> count
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditSummary {
  events: BTreeMap<String, BTreeMap<ChangeKind, u64>>,
}

impl AuditSummary {
  pub fn new() -> Self {
    Self::default()
  }

  /// Ledger key for one pass
  pub fn event_key(event_id: Option<u64>, time: DateTime<Utc>) -> String {
    let event = event_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
    format!("{}:{}", event, time.to_rfc3339_opts(SecondsFormat::Millis, true))
  }

  /// Add `count` changes of `kind` under `key`. Zero counts are not stored.
  pub fn record(&mut self, key: &str, kind: ChangeKind, count: u64) {
    if count == 0 {
      return;
    }
    *self.events.entry(sanitize_key(key)).or_default().entry(kind).or_insert(0) += count;
  }

  pub fn count(&self, key: &str, kind: ChangeKind) -> u64 {
    self
      .events
      .get(key)
      .and_then(|kinds| kinds.get(&kind))
      .copied()
      .unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.events.values().all(|kinds| kinds.values().all(|c| *c == 0))
  }

  pub fn events(&self) -> impl Iterator<Item = (&str, &BTreeMap<ChangeKind, u64>)> {
    self.events.iter().map(|(key, kinds)| (key.as_str(), kinds))
  }

  /// Sum of each kind across every event
  pub fn totals(&self) -> BTreeMap<ChangeKind, u64> {
    let mut totals = BTreeMap::new();
    for kinds in self.events.values() {
      for (kind, count) in kinds {
        *totals.entry(*kind).or_insert(0) += count;
      }
    }
    totals
  }

  /// Additively fold another summary into this one
  pub fn absorb(&mut self, other: &AuditSummary) {
    for (key, kinds) in &other.events {
      for (kind, count) in kinds {
        self.record(key, *kind, *count);
      }
    }
  }

  pub fn encode(&self) -> String {
    let mut records = Vec::with_capacity(self.events.len());
    for (key, kinds) in &self.events {
      let pairs: Vec<String> = kinds
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(kind, count)| format!("{}{}{}", kind.as_str(), COUNT_SEP, count))
        .collect();
      if pairs.is_empty() {
        continue;
      }
      records.push(format!("{}{}{}", key, KEY_SEP, pairs.join(&KIND_SEP.to_string())));
    }
    records.join(&RECORD_SEP.to_string())
  }

  pub fn decode(encoded: &str) -> Result<Self> {
    let mut summary = Self::new();

    // Split on the literal separator character; no pattern interpretation.
    for record in encoded.split(RECORD_SEP) {
      let record = record.trim();
      if record.is_empty() {
        continue;
      }

      let (key, kinds) = record
        .split_once(KEY_SEP)
        .ok_or_else(|| Error::AuditFormat(format!("record '{}' has no '{}'", record, KEY_SEP)))?;
      if key.is_empty() {
        return Err(Error::AuditFormat(format!("record '{}' has an empty key", record)));
      }

      for pair in kinds.split(KIND_SEP) {
        let pair = pair.trim();
        if pair.is_empty() {
          continue;
        }
        let (kind, count) = pair
          .rsplit_once(COUNT_SEP)
          .ok_or_else(|| Error::AuditFormat(format!("pair '{}' has no '{}'", pair, COUNT_SEP)))?;
        let kind: ChangeKind = kind.parse()?;
        let count: u64 = count
          .parse()
          .map_err(|_| Error::AuditFormat(format!("count '{}' is not a number", count)))?;
        summary.record(key, kind, count);
      }
    }

    Ok(summary)
  }

  /// Append `new` to an already-encoded ledger. Existing records are kept verbatim.
  pub fn merge(existing: Option<&str>, new: &AuditSummary) -> String {
    let appended = new.encode();
    match existing.map(str::trim).filter(|s| !s.is_empty()) {
      None => appended,
      Some(existing) if appended.is_empty() => existing.to_string(),
      Some(existing) => format!("{}{}{}", existing, RECORD_SEP, appended),
    }
  }

  /// Reconstruct a ledger from entry provenance, for catalogs written before auditing existed
  pub fn rebuild(root: &Subset) -> Self {
    let mut summary = Self::new();
    for entry in root.all_entries() {
      if let Some(time) = entry.created.time {
        summary.record(&Self::event_key(entry.created.event_id, time), ChangeKind::Added, 1);
      }
      if let Some(modified) = &entry.modified
        && let Some(time) = modified.time
      {
        summary.record(&Self::event_key(modified.event_id, time), ChangeKind::Modified, 1);
      }
    }
    summary
  }
}

fn sanitize_key(key: &str) -> String {
  key
    .chars()
    .map(|c| match c {
      RECORD_SEP | KEY_SEP | KIND_SEP => '_',
      c => c,
    })
    .collect()
}
