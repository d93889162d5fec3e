use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  #[error("Malformed audit summary: {0}")]
  AuditFormat(String),

  #[error("Config: {0}")]
  Config(String),

  #[error("Document: {0}")]
  Document(#[from] serde_json::Error),

  #[error("IO: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
