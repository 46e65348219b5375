use thiserror::Error;

/// Top-level error union the binary reports at its boundary: a process-exit-worthy failure,
/// tagged with which subsystem produced it.
#[derive(Debug, Error)]
pub enum AppError {
	#[error(transparent)]
	Connectivity(#[from] segment::SegmentError),

	#[error(transparent)]
	Message(#[from] wire::WireError),

	#[error(transparent)]
	Bind(#[from] iface::IfaceError),

	#[error(transparent)]
	Config(#[from] config::ConfigError),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}
