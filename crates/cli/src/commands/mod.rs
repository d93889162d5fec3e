//! CLI command implementations

mod audit;
mod config;
mod files;
mod refresh;

pub use audit::cmd_audit;
pub use config::{cmd_config_init, cmd_config_show, load_config};
pub use files::{cmd_remove, cmd_replace};
pub use refresh::{cmd_formalize, cmd_refresh};

use catalog_core::ResourceInfo;
use clap::Args;

/// Who is acting and under which event
#[derive(Args, Debug, Clone, Default)]
pub struct StampArgs {
  /// Acting user (default: $USER)
  #[arg(long)]
  pub user: Option<String>,
  /// Event id recorded in provenance and the audit ledger
  #[arg(long)]
  pub event: Option<u64>,
  /// Description for new entries
  #[arg(long)]
  pub description: Option<String>,
  /// Declared format for new entries
  #[arg(long)]
  pub format: Option<String>,
  /// Tag for new entries (repeatable)
  #[arg(long = "tag")]
  pub tags: Vec<String>,
}

impl StampArgs {
  pub fn resource_info(&self) -> ResourceInfo {
    let user = self.user.clone().or_else(|| std::env::var("USER").ok());
    let mut info = ResourceInfo::new(user, self.event).with_tags(self.tags.clone());
    if let Some(description) = &self.description {
      info = info.with_description(description);
    }
    if let Some(format) = &self.format {
      info = info.with_format(format);
    }
    info
  }
}
