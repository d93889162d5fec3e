const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Human-readable byte count using binary (1024) steps
pub fn format_bytes(bytes: u64) -> String {
  if bytes < 1024 {
    return format!("{} B", bytes);
  }

  let mut value = bytes as f64;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }

  format!("{:.1} {}", value, UNITS[unit])
}
