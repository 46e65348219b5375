use std::io::{self, ErrorKind, Read, Write};

use bytes::Bytes;

use crate::error::WireError;
use crate::header::{Header, HEADER_SIZE, MAX_BODY_SIZE, SENDER_SIZE};

/// A single framed message: a [`Header`] and its body.
///
/// The body is a `bytes::Bytes` rather than an owned `Vec<u8>` so that fanning one interface-read
/// message out to many destination queues is a cheap refcount bump, not a copy per destination.
#[derive(Debug, Clone)]
pub struct Message {
	pub header: Header,
	pub body: Bytes,
}

impl Message {
	/// Builds a message from a tunnel id, sender tag, and body, deriving the header's `size` field.
	pub fn new(id: u16, sender: [u8; SENDER_SIZE], body: impl Into<Bytes>) -> Result<Self, WireError> {
		let body = body.into();

		if body.len() > MAX_BODY_SIZE {
			return Err(WireError::BodyTooLarge { size: body.len().min(u16::MAX as usize) as u16 });
		}

		let size = body.len() as u16;

		Ok(Self { header: Header::new(id, sender, size), body })
	}

	/// Encodes the full wire representation: header followed by body.
	pub fn encode(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(HEADER_SIZE + self.body.len());
		out.extend_from_slice(&self.header.encode());
		out.extend_from_slice(&self.body);
		out
	}

	/// Writes the full wire representation to `w`.
	pub fn write_to(&self, mut w: impl Write) -> io::Result<()> {
		w.write_all(&self.header.encode())?;
		w.write_all(&self.body)
	}

	/// Reads one framed message from `r`, looping until the declared body size is satisfied.
	///
	/// A clean EOF before any header bytes are read is reported as [`WireError::Eof`] (the normal
	/// way a peer closes a connection); any other short read, including inside the body, is a
	/// framing error.
	pub fn read_from(mut r: impl Read) -> Result<Self, WireError> {
		let mut header_raw = [0u8; HEADER_SIZE];
		read_header(&mut r, &mut header_raw)?;

		let header = Header::decode(&header_raw)?;

		let mut body = vec![0u8; header.size as usize];
		read_body(&mut r, &mut body)?;

		Ok(Self { header, body: body.into() })
	}
}

fn read_header(mut r: impl Read, buf: &mut [u8]) -> Result<(), WireError> {
	let mut filled = 0;

	while filled < buf.len() {
		match r.read(&mut buf[filled..]) {
			Ok(0) if filled == 0 => return Err(WireError::Eof),
			Ok(0) => return Err(WireError::Truncated { expected: buf.len(), got: filled }),
			Ok(n) => filled += n,
			Err(e) if e.kind() == ErrorKind::Interrupted => continue,
			Err(e) => return Err(WireError::Io(e)),
		}
	}

	Ok(())
}

fn read_body(mut r: impl Read, buf: &mut [u8]) -> Result<(), WireError> {
	let mut filled = 0;

	while filled < buf.len() {
		match r.read(&mut buf[filled..]) {
			Ok(0) => return Err(WireError::Truncated { expected: buf.len(), got: filled }),
			Ok(n) => filled += n,
			Err(e) if e.kind() == ErrorKind::Interrupted => continue,
			Err(e) => return Err(WireError::Io(e)),
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use super::*;

	fn sender(s: &str) -> [u8; SENDER_SIZE] {
		let mut out = [0u8; SENDER_SIZE];
		out.copy_from_slice(s.as_bytes());
		out
	}

	#[test]
	fn encodes_s1_scenario() {
		let msg = Message::new(7, sender("aaaaaaaaaa"), &b"hi"[..]).unwrap();
		assert_eq!(msg.encode(), b"0000700002aaaaaaaaaa000000000000hi");
	}

	#[test]
	fn round_trips_through_a_reader() {
		let msg = Message::new(7, sender("aaaaaaaaaa"), &b"hi"[..]).unwrap();
		let encoded = msg.encode();

		let decoded = Message::read_from(Cursor::new(encoded)).unwrap();
		assert_eq!(decoded.header, msg.header);
		assert_eq!(decoded.body, msg.body);
	}

	/// A reader that dribbles out bytes a handful at a time, to exercise the short-read loop.
	struct Dribble<'a> {
		data: &'a [u8],
		chunk: usize,
	}

	impl Read for Dribble<'_> {
		fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
			let n = self.chunk.min(buf.len()).min(self.data.len());
			buf[..n].copy_from_slice(&self.data[..n]);
			self.data = &self.data[n..];
			Ok(n)
		}
	}

	#[test]
	fn loops_over_short_reads() {
		let msg = Message::new(2, sender("bbbbbbbbbb"), &b"hello world"[..]).unwrap();
		let encoded = msg.encode();

		let decoded = Message::read_from(Dribble { data: &encoded, chunk: 3 }).unwrap();
		assert_eq!(decoded.header, msg.header);
		assert_eq!(&decoded.body[..], b"hello world");
	}

	#[test]
	fn clean_eof_before_header_is_eof() {
		let err = Message::read_from(Cursor::new(Vec::<u8>::new())).unwrap_err();
		assert!(matches!(err, WireError::Eof));
	}

	#[test]
	fn truncated_header_is_a_framing_error() {
		let err = Message::read_from(Cursor::new(vec![b'0'; 10])).unwrap_err();
		assert!(matches!(err, WireError::Truncated { .. }));
	}

	#[test]
	fn truncated_body_is_a_framing_error() {
		let msg = Message::new(2, sender("bbbbbbbbbb"), &b"hello world"[..]).unwrap();
		let mut encoded = msg.encode();
		encoded.truncate(encoded.len() - 3);

		let err = Message::read_from(Cursor::new(encoded)).unwrap_err();
		assert!(matches!(err, WireError::Truncated { .. }));
	}

	#[test]
	fn rejects_body_over_max_size() {
		let err = Message::new(1, sender("cccccccccc"), vec![0u8; 65_501]).unwrap_err();
		assert!(matches!(err, WireError::BodyTooLarge { .. }));
	}
}
