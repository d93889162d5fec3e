use crate::catalog::{MetaField, Provenance};
use chrono::{DateTime, Utc};

/// Caller-supplied details used to stamp new and modified entries.
///
/// Never persisted by itself; its fields are copied onto entries.
#[derive(Debug, Clone)]
pub struct ResourceInfo {
  pub description: Option<String>,
  pub format: Option<String>,
  pub content: Option<String>,
  pub tags: Vec<String>,
  pub metadata: Vec<MetaField>,
  pub user: Option<String>,
  pub created: DateTime<Utc>,
  pub modified: DateTime<Utc>,
  pub event_id: Option<u64>,
}

impl ResourceInfo {
  /// Stamp for an action happening now
  pub fn new(user: Option<String>, event_id: Option<u64>) -> Self {
    Self::at(user, event_id, Utc::now())
  }

  pub fn at(user: Option<String>, event_id: Option<u64>, time: DateTime<Utc>) -> Self {
    Self {
      description: None,
      format: None,
      content: None,
      tags: Vec::new(),
      metadata: Vec::new(),
      user,
      created: time,
      modified: time,
      event_id,
    }
  }

  pub fn with_format(mut self, format: impl Into<String>) -> Self {
    self.format = Some(format.into());
    self
  }

  pub fn with_content(mut self, content: impl Into<String>) -> Self {
    self.content = Some(content.into());
    self
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn with_tags(mut self, tags: Vec<String>) -> Self {
    self.tags = tags;
    self
  }

  pub fn with_metadata(mut self, metadata: Vec<MetaField>) -> Self {
    self.metadata = metadata;
    self
  }

  pub fn creation(&self) -> Provenance {
    Provenance {
      user: self.user.clone(),
      time: Some(self.created),
      event_id: self.event_id,
    }
  }

  pub fn modification(&self) -> Provenance {
    Provenance {
      user: self.user.clone(),
      time: Some(self.modified),
      event_id: self.event_id,
    }
  }
}
