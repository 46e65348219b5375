use thiserror::Error;

/// Errors raised while resolving, binding, or operating a raw interface socket.
#[derive(Debug, Error)]
pub enum IfaceError {
	#[error("interface {name:?} not found by name or by alias/altname")]
	NotFound { name: String },

	#[error("failed binding to interface {name:?}: {source}")]
	Bind { name: String, source: std::io::Error },

	#[error("failed setting socket option on interface {name:?}: {source}")]
	SetOpt { name: String, source: std::io::Error },

	#[error(transparent)]
	Io(#[from] std::io::Error),
}
