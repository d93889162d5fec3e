//! Catalog document model.
//!
//! A catalog is a tree of subsets whose leaves are file entries. The root
//! subset carries the document-level fields (format marker, stored totals,
//! and the audit ledger in its metadata).

use crate::resource::ResourceInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Format marker written into every catalog document
pub const CATALOG_FORMAT: &str = "filecatalog/1";

/// Any document whose format starts with this prefix is treated as a catalog
pub const CATALOG_FORMAT_PREFIX: &str = "filecatalog/";

/// Metadata field on the root subset holding the encoded audit ledger
pub const AUDIT_FIELD: &str = "AUDIT";

/// Declared format for dicom entries, whose own metadata never carries one
pub const DICOM_FORMAT: &str = "DICOM";

pub fn is_catalog_format(format: &str) -> bool {
  format.starts_with(CATALOG_FORMAT_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaField {
  pub name: String,
  pub value: String,
}

impl MetaField {
  pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      value: value.into(),
    }
  }
}

/// Who touched an entry, when, and under which event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Provenance {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub user: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub time: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub event_id: Option<u64>,
}

/// Leaf discriminant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
  #[default]
  File,
  Dicom,
}

impl EntryKind {
  /// Kind assigned to a newly discovered file
  pub fn for_file_name(name: &str) -> Self {
    if name.to_ascii_lowercase().ends_with(".dcm") {
      EntryKind::Dicom
    } else {
      EntryKind::File
    }
  }
}

/// One file reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
  /// Path relative to the catalog's directory, `/`-separated
  pub uri: String,
  pub name: String,
  #[serde(default)]
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub digest: Option<String>,
  #[serde(default)]
  pub kind: EntryKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub format: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tags: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub metadata: Vec<MetaField>,
  #[serde(default)]
  pub created: Provenance,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub modified: Option<Provenance>,
}

impl Entry {
  pub fn new(uri: impl Into<String>) -> Self {
    let uri = uri.into();
    let name = uri.rsplit('/').next().unwrap_or(&uri).to_string();
    Self {
      kind: EntryKind::for_file_name(&name),
      uri,
      name,
      id: String::new(),
      digest: None,
      format: None,
      content: None,
      description: None,
      tags: Vec::new(),
      metadata: Vec::new(),
      created: Provenance::default(),
      modified: None,
    }
  }

  /// Build a fresh entry stamped with the creation details of `info`
  pub fn created_from(uri: impl Into<String>, id_prefix: &str, info: &ResourceInfo) -> Self {
    let mut entry = Self::new(uri);
    entry.id = compose_id(id_prefix, &entry.uri);
    entry.format = info.format.clone();
    entry.content = info.content.clone();
    entry.description = info.description.clone();
    entry.tags = info.tags.clone();
    entry.metadata = info.metadata.clone();
    entry.created = info.creation();
    entry.enforce_kind_format();
    entry
  }

  pub fn has_digest(&self) -> bool {
    self.digest.as_deref().is_some_and(|d| !d.is_empty())
  }

  /// Fill in missing creation provenance and identifier. Returns true if anything changed.
  pub fn backfill(&mut self, id_prefix: &str, info: &ResourceInfo) -> bool {
    let mut changed = false;

    if self.created.user.is_none() && info.user.is_some() {
      self.created.user = info.user.clone();
      changed = true;
    }
    if self.created.time.is_none() {
      self.created.time = Some(info.created);
      changed = true;
    }
    if self.created.event_id.is_none() && info.event_id.is_some() {
      self.created.event_id = info.event_id;
      changed = true;
    }
    if self.id.is_empty() {
      self.id = compose_id(id_prefix, &self.uri);
      changed = true;
    }

    changed
  }

  /// Dicom entries always declare the dicom format. Returns true if the format was rewritten.
  pub fn enforce_kind_format(&mut self) -> bool {
    if self.kind == EntryKind::Dicom && self.format.as_deref() != Some(DICOM_FORMAT) {
      self.format = Some(DICOM_FORMAT.to_string());
      return true;
    }
    false
  }

  pub fn stamp_modified(&mut self, info: &ResourceInfo) {
    self.modified = Some(info.modification());
  }
}

fn compose_id(id_prefix: &str, uri: &str) -> String {
  if id_prefix.is_empty() {
    uri.to_string()
  } else {
    format!("{}/{}", id_prefix, uri)
  }
}

/// A child of a subset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
  Entry(Entry),
  Subset(Subset),
}

/// Nested grouping of entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subset {
  #[serde(default)]
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tags: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub metadata: Vec<MetaField>,
  #[serde(default)]
  pub children: Vec<Node>,
}

impl Subset {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      ..Default::default()
    }
  }

  pub fn push_entry(&mut self, entry: Entry) {
    self.children.push(Node::Entry(entry));
  }

  pub fn push_subset(&mut self, subset: Subset) {
    self.children.push(Node::Subset(subset));
  }

  /// Direct leaves, in document order
  pub fn entries(&self) -> impl Iterator<Item = &Entry> {
    self.children.iter().filter_map(|node| match node {
      Node::Entry(entry) => Some(entry),
      Node::Subset(_) => None,
    })
  }

  /// Direct nested subsets, in document order
  pub fn subsets(&self) -> impl Iterator<Item = &Subset> {
    self.children.iter().filter_map(|node| match node {
      Node::Subset(subset) => Some(subset),
      Node::Entry(_) => None,
    })
  }

  /// Every leaf in this subtree, depth first
  pub fn all_entries(&self) -> Vec<&Entry> {
    let mut out = Vec::new();
    collect_entries(self, &mut out);
    out
  }

  pub fn entry_count(&self) -> usize {
    self
      .children
      .iter()
      .map(|node| match node {
        Node::Entry(_) => 1,
        Node::Subset(subset) => subset.entry_count(),
      })
      .sum()
  }

  /// Walk down a chain of child positions, each naming a nested subset
  pub fn subset_at(&self, path: &[usize]) -> Option<&Subset> {
    let Some((first, rest)) = path.split_first() else {
      return Some(self);
    };
    match self.children.get(*first)? {
      Node::Subset(subset) => subset.subset_at(rest),
      Node::Entry(_) => None,
    }
  }

  pub fn subset_at_mut(&mut self, path: &[usize]) -> Option<&mut Subset> {
    let Some((first, rest)) = path.split_first() else {
      return Some(self);
    };
    match self.children.get_mut(*first)? {
      Node::Subset(subset) => subset.subset_at_mut(rest),
      Node::Entry(_) => None,
    }
  }

  pub fn entry_at_mut(&mut self, position: usize) -> Option<&mut Entry> {
    match self.children.get_mut(position)? {
      Node::Entry(entry) => Some(entry),
      Node::Subset(_) => None,
    }
  }

  /// Drop direct leaves whose URI is in `uris`. Returns how many were dropped.
  pub fn remove_entries(&mut self, uris: &HashSet<String>) -> usize {
    let before = self.children.len();
    self
      .children
      .retain(|node| !matches!(node, Node::Entry(entry) if uris.contains(&entry.uri)));
    before - self.children.len()
  }

  /// URIs appearing more than once anywhere in this subtree
  pub fn duplicate_uris(&self) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut dupes = Vec::new();
    for entry in self.all_entries() {
      if !seen.insert(entry.uri.as_str()) {
        dupes.push(entry.uri.clone());
      }
    }
    dupes
  }

  pub fn meta(&self, name: &str) -> Option<&str> {
    self.metadata.iter().find(|m| m.name == name).map(|m| m.value.as_str())
  }

  pub fn set_meta(&mut self, name: &str, value: impl Into<String>) {
    let value = value.into();
    match self.metadata.iter_mut().find(|m| m.name == name) {
      Some(field) => field.value = value,
      None => self.metadata.push(MetaField::new(name, value)),
    }
  }
}

fn collect_entries<'a>(subset: &'a Subset, out: &mut Vec<&'a Entry>) {
  for node in &subset.children {
    match node {
      Node::Entry(entry) => out.push(entry),
      Node::Subset(nested) => collect_entries(nested, out),
    }
  }
}

/// Byte and file totals last observed on disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
  pub file_count: u64,
  pub file_size: u64,
}

/// Root of a catalog document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
  pub format: String,
  #[serde(flatten)]
  pub root: Subset,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stats: Option<CatalogStats>,
}

impl Catalog {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      format: CATALOG_FORMAT.to_string(),
      root: Subset::new(id),
      stats: None,
    }
  }

  pub fn audit_field(&self) -> Option<&str> {
    self.root.meta(AUDIT_FIELD)
  }

  pub fn set_audit_field(&mut self, encoded: impl Into<String>) {
    self.root.set_meta(AUDIT_FIELD, encoded);
  }

  pub fn entry_count(&self) -> usize {
    self.root.entry_count()
  }

  pub fn find_entry(&self, uri: &str) -> Option<&Entry> {
    self.root.all_entries().into_iter().find(|entry| entry.uri == uri)
  }
}
