use crate::error::WireError;

const ID_FIELD: usize = 5;
const SIZE_FIELD: usize = 5;
/// Length in bytes of the sender tag field.
pub const SENDER_SIZE: usize = 10;
const RESERVED_FIELD: usize = 12;

/// Total size of the fixed ASCII header block.
pub const HEADER_SIZE: usize = ID_FIELD + SIZE_FIELD + SENDER_SIZE + RESERVED_FIELD;

/// Maximum body size carried by a single message -- also the size of the buffer an interface
/// endpoint reads raw frames into.
pub const MAX_BODY_SIZE: usize = 65_500;

/// The fixed 32-byte ASCII-decimal header prepended to every message on the wire.
///
/// Lengths are kept as zero-padded decimal ASCII rather than big-endian binary so the protocol
/// stays readable in a packet capture; this is an eccentric choice but an intentional one; keep it
/// bit-exact with existing peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
	pub id: u16,
	pub size: u16,
	pub sender: [u8; SENDER_SIZE],
}

impl Header {
	pub fn new(id: u16, sender: [u8; SENDER_SIZE], size: u16) -> Self {
		Self { id, size, sender }
	}

	/// Encodes the header as its fixed 32-byte ASCII representation.
	pub fn encode(&self) -> [u8; HEADER_SIZE] {
		let mut out = [b'0'; HEADER_SIZE];

		write_padded(&mut out[0..ID_FIELD], self.id as u32);
		write_padded(&mut out[ID_FIELD..ID_FIELD + SIZE_FIELD], self.size as u32);
		out[ID_FIELD + SIZE_FIELD..ID_FIELD + SIZE_FIELD + SENDER_SIZE].copy_from_slice(&self.sender);
		// bytes [20, 32) stay at the zero-ASCII fill: reserved for future use.

		out
	}

	/// Decodes a header from an exactly-32-byte block.
	pub fn decode(raw: &[u8]) -> Result<Self, WireError> {
		if raw.len() != HEADER_SIZE {
			return Err(WireError::HeaderLength { got: raw.len() });
		}

		let id = parse_padded(&raw[0..ID_FIELD]).ok_or(WireError::BadField { field: "id" })?;
		let size = parse_padded(&raw[ID_FIELD..ID_FIELD + SIZE_FIELD]).ok_or(WireError::BadField { field: "size" })?;

		let id = u16::try_from(id).map_err(|_| WireError::BadField { field: "id" })?;
		let size = u16::try_from(size).map_err(|_| WireError::BadField { field: "size" })?;

		if size as usize > MAX_BODY_SIZE {
			return Err(WireError::BodyTooLarge { size });
		}

		let mut sender = [0u8; SENDER_SIZE];
		sender.copy_from_slice(&raw[ID_FIELD + SIZE_FIELD..ID_FIELD + SIZE_FIELD + SENDER_SIZE]);

		Ok(Self { id, size, sender })
	}
}

fn write_padded(out: &mut [u8], value: u32) {
	let s = format!("{:0width$}", value, width = out.len());
	out.copy_from_slice(s.as_bytes());
}

fn parse_padded(raw: &[u8]) -> Option<u32> {
	let s = std::str::from_utf8(raw).ok()?;
	let trimmed = s.trim_start_matches('0');

	if trimmed.is_empty() {
		return Some(0);
	}

	trimmed.parse().ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sender(s: &str) -> [u8; SENDER_SIZE] {
		let mut out = [0u8; SENDER_SIZE];
		out.copy_from_slice(s.as_bytes());
		out
	}

	#[test]
	fn encodes_bit_exact() {
		let header = Header::new(7, sender("aaaaaaaaaa"), 2);
		assert_eq!(&header.encode(), b"0000700002aaaaaaaaaa000000000000");
	}

	#[test]
	fn round_trips() {
		let header = Header::new(65535, sender("0123456789"), 65500);
		let raw = header.encode();
		assert_eq!(Header::decode(&raw).unwrap(), header);
	}

	#[test]
	fn rejects_wrong_length() {
		let err = Header::decode(&[0u8; 31]).unwrap_err();
		assert!(matches!(err, WireError::HeaderLength { got: 31 }));
	}

	#[test]
	fn rejects_non_decimal_field() {
		let mut raw = *b"0000700002aaaaaaaaaa000000000000";
		raw[0] = b'x';
		let err = Header::decode(&raw).unwrap_err();
		assert!(matches!(err, WireError::BadField { field: "id" }));
	}

	#[test]
	fn rejects_oversized_body() {
		let raw = Header::new(0, sender("aaaaaaaaaa"), 65501).encode();
		let err = Header::decode(&raw).unwrap_err();
		assert!(matches!(err, WireError::BodyTooLarge { size: 65501 }));
	}

	#[test]
	fn empty_field_is_zero() {
		assert_eq!(parse_padded(b"00000"), Some(0));
	}
}
