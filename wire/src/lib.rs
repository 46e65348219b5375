//! The wire codec: the 32-byte ASCII header, the framed message built from it, and the
//! sender-tag hash used for loop prevention. Pure byte-level logic, no I/O beyond `Read`/`Write`.

mod error;
mod header;
mod message;
mod sender;

pub use error::WireError;
pub use header::{Header, HEADER_SIZE, MAX_BODY_SIZE, SENDER_SIZE};
pub use message::Message;
pub use sender::sender_tag;
