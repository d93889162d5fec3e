//! Flat lookup over a catalog tree, keyed by entry URI.
//!
//! Built fresh for each reconciliation pass and thrown away afterwards. The
//! only mutation it sees is flipping `exists_on_disk` as the walk finds files.

use catalog_core::{Node, Subset};
use std::collections::HashMap;
use tracing::warn;

/// Where one indexed entry lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedEntry {
  /// Child positions from the root down to the owning subset
  pub subset: Vec<usize>,
  /// Position of the entry among the owning subset's children
  pub position: usize,
  /// `/`-joined ids of the nested subsets above the entry (root excluded)
  pub id_prefix: String,
  pub exists_on_disk: bool,
}

#[derive(Debug, Default)]
pub struct ManifestIndex {
  entries: HashMap<String, IndexedEntry>,
}

impl ManifestIndex {
  pub fn build(root: &Subset) -> Self {
    let mut index = Self::default();
    let mut path = Vec::new();
    index.visit(root, &mut path, "");
    index
  }

  fn visit(&mut self, subset: &Subset, path: &mut Vec<usize>, prefix: &str) {
    // Nested subsets first, so inner entries carry their full prefix
    for (position, node) in subset.children.iter().enumerate() {
      if let Node::Subset(nested) = node {
        let nested_prefix = join_prefix(prefix, &nested.id);
        path.push(position);
        self.visit(nested, path, &nested_prefix);
        path.pop();
      }
    }

    for (position, node) in subset.children.iter().enumerate() {
      if let Node::Entry(entry) = node {
        if self.entries.contains_key(&entry.uri) {
          warn!("Duplicate catalog entry {}, keeping the first occurrence", entry.uri);
          continue;
        }
        self.entries.insert(
          entry.uri.clone(),
          IndexedEntry {
            subset: path.clone(),
            position,
            id_prefix: prefix.to_string(),
            exists_on_disk: false,
          },
        );
      }
    }
  }

  pub fn get(&self, uri: &str) -> Option<&IndexedEntry> {
    self.entries.get(uri)
  }

  pub fn contains(&self, uri: &str) -> bool {
    self.entries.contains_key(uri)
  }

  /// Record that the file behind `uri` was seen. Returns the entry's location.
  pub fn mark_present(&mut self, uri: &str) -> Option<IndexedEntry> {
    let slot = self.entries.get_mut(uri)?;
    slot.exists_on_disk = true;
    Some(slot.clone())
  }

  /// Entries the walk never saw
  pub fn missing(&self) -> impl Iterator<Item = (&str, &IndexedEntry)> {
    self
      .entries
      .iter()
      .filter(|(_, slot)| !slot.exists_on_disk)
      .map(|(uri, slot)| (uri.as_str(), slot))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// `/`-join a subset id onto its parent's prefix, skipping empty parts
pub(crate) fn join_prefix(prefix: &str, id: &str) -> String {
  match (prefix.is_empty(), id.is_empty()) {
    (_, true) => prefix.to_string(),
    (true, false) => id.to_string(),
    (false, false) => format!("{}/{}", prefix, id),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use catalog_core::Entry;

  fn tree() -> Subset {
    let mut inner = Subset::new("echo1");
    inner.push_entry(Entry::new("series/echo1/img.dcm"));

    let mut outer = Subset::new("series");
    outer.push_entry(Entry::new("series/readme.txt"));
    outer.push_subset(inner);

    let mut root = Subset::new("scan");
    root.push_entry(Entry::new("a.txt"));
    root.push_subset(outer);
    root.push_entry(Entry::new("b.txt"));
    root
  }

  #[test]
  fn test_build_locates_every_entry() {
    let index = ManifestIndex::build(&tree());
    assert_eq!(index.len(), 4);

    let a = index.get("a.txt").unwrap();
    assert!(a.subset.is_empty());
    assert_eq!(a.position, 0);
    assert_eq!(a.id_prefix, "");

    let b = index.get("b.txt").unwrap();
    assert_eq!(b.position, 2);

    let readme = index.get("series/readme.txt").unwrap();
    assert_eq!(readme.subset, vec![1]);
    assert_eq!(readme.id_prefix, "series");

    let img = index.get("series/echo1/img.dcm").unwrap();
    assert_eq!(img.subset, vec![1, 1]);
    assert_eq!(img.position, 0);
    assert_eq!(img.id_prefix, "series/echo1");
  }

  #[test]
  fn test_locations_resolve_in_tree() {
    let root = tree();
    let index = ManifestIndex::build(&root);
    for uri in ["a.txt", "b.txt", "series/readme.txt", "series/echo1/img.dcm"] {
      let slot = index.get(uri).unwrap();
      let subset = root.subset_at(&slot.subset).unwrap();
      match &subset.children[slot.position] {
        Node::Entry(entry) => assert_eq!(entry.uri, uri),
        Node::Subset(_) => panic!("{} resolved to a subset", uri),
      }
    }
  }

  #[test]
  fn test_everything_starts_missing() {
    let mut index = ManifestIndex::build(&tree());
    assert_eq!(index.missing().count(), 4);

    assert!(index.mark_present("a.txt").is_some());
    assert!(index.mark_present("nope").is_none());
    let missing: Vec<_> = index.missing().map(|(uri, _)| uri.to_string()).collect();
    assert_eq!(missing.len(), 3);
    assert!(!missing.contains(&"a.txt".to_string()));
  }

  #[test]
  fn test_duplicates_keep_first() {
    let mut root = Subset::new("c");
    root.push_entry(Entry::new("a.txt"));
    root.push_entry(Entry::new("a.txt"));
    let index = ManifestIndex::build(&root);
    assert_eq!(index.len(), 1);
    assert_eq!(index.get("a.txt").unwrap().position, 0);
  }

  #[test]
  fn test_join_prefix_skips_empty_parts() {
    assert_eq!(join_prefix("", "series"), "series");
    assert_eq!(join_prefix("series", ""), "series");
    assert_eq!(join_prefix("series", "echo1"), "series/echo1");
    assert_eq!(join_prefix("", ""), "");
  }

  #[test]
  fn test_build_leaves_tree_untouched() {
    let root = tree();
    let before = root.clone();
    let _ = ManifestIndex::build(&root);
    assert_eq!(root, before);
  }
}
