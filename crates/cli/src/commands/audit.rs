use anyhow::{Context, Result};
use catalog_core::{ChangeKind, Config};
use reconcile::CatalogService;
use std::path::Path;

/// Print a catalog's change ledger, one line per pass
pub fn cmd_audit(config: Config, catalog: &Path, json: bool) -> Result<()> {
  let service = CatalogService::new(config);
  let audit = service
    .audit(catalog)
    .with_context(|| format!("Failed to read audit ledger of {}", catalog.display()))?;

  if json {
    let events: Vec<_> = audit
      .summary
      .events()
      .map(|(key, kinds)| {
        let counts: serde_json::Map<String, serde_json::Value> = kinds
          .iter()
          .map(|(kind, count)| (kind.to_string(), serde_json::Value::from(*count)))
          .collect();
        serde_json::json!({ "event": key, "counts": counts })
      })
      .collect();
    let totals: serde_json::Map<String, serde_json::Value> = audit
      .totals
      .iter()
      .map(|(kind, count)| (kind.to_string(), serde_json::Value::from(*count)))
      .collect();
    let value = serde_json::json!({ "events": events, "totals": totals });
    println!("{}", serde_json::to_string_pretty(&value)?);
    return Ok(());
  }

  if audit.summary.is_empty() {
    println!("No recorded changes in {}", catalog.display());
    return Ok(());
  }

  println!("Audit ledger for {}", catalog.display());
  println!();
  println!("{:<36} {:>8} {:>8} {:>8}", "EVENT", "ADDED", "MODIFIED", "REMOVED");
  for (key, kinds) in audit.summary.events() {
    let count = |kind: ChangeKind| kinds.get(&kind).copied().unwrap_or(0);
    println!(
      "{:<36} {:>8} {:>8} {:>8}",
      key,
      count(ChangeKind::Added),
      count(ChangeKind::Modified),
      count(ChangeKind::Removed)
    );
  }

  let total = |kind: ChangeKind| audit.totals.get(&kind).copied().unwrap_or(0);
  println!(
    "{:<36} {:>8} {:>8} {:>8}",
    "TOTAL",
    total(ChangeKind::Added),
    total(ChangeKind::Modified),
    total(ChangeKind::Removed)
  );

  Ok(())
}
