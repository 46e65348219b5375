use thiserror::Error;

/// Errors raised while encoding or decoding the wire protocol.
#[derive(Debug, Error)]
pub enum WireError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("connection closed before a message header was read")]
	Eof,

	#[error("short read: expected {expected} bytes, got {got}")]
	Truncated { expected: usize, got: usize },

	#[error("header must be exactly 32 bytes, got {got}")]
	HeaderLength { got: usize },

	#[error("header field {field:?} is not a legal zero-padded decimal")]
	BadField { field: &'static str },

	#[error("body of {size} bytes exceeds the maximum of 65500 bytes")]
	BodyTooLarge { size: u16 },
}
