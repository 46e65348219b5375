use thiserror::Error;

/// Errors a segment worker surfaces upward to the manager.
#[derive(Debug, Error)]
pub enum SegmentError {
	#[error("segment {segment_id}: failed dialing destination {destination:?}: {source}")]
	Connectivity { segment_id: u16, destination: String, source: std::io::Error },

	#[error("segment {segment_id}: failed binding interface {interface:?}: {source}")]
	Bind { segment_id: u16, interface: String, source: iface::IfaceError },
}
