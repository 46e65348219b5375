use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, validating, or watching the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed reading config file {path}: {source}")]
	Io { path: PathBuf, source: std::io::Error },

	#[error("failed parsing config file {path}: {source}")]
	Parse { path: PathBuf, source: serde_yaml_ng::Error },

	#[error("duplicate segment id {id} in config")]
	DuplicateId { id: u16 },

	#[error("failed to watch config file for changes: {0}")]
	Watch(#[from] notify::Error),
}
