//! A minimal atom codec: headers, child iteration and a size-patching writer.

use std::fmt;
use std::io::Read;

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// A four character code identifying an atom.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC([u8; 4]);

impl FourCC {
	pub const FTYP: Self = Self::new(b"ftyp");
	pub const STYP: Self = Self::new(b"styp");
	pub const MOOV: Self = Self::new(b"moov");
	pub const TRAK: Self = Self::new(b"trak");
	pub const MOOF: Self = Self::new(b"moof");
	pub const TRAF: Self = Self::new(b"traf");
	pub const TFDT: Self = Self::new(b"tfdt");
	pub const TRUN: Self = Self::new(b"trun");
	pub const MDAT: Self = Self::new(b"mdat");
	pub const EMSG: Self = Self::new(b"emsg");
	pub const PRFT: Self = Self::new(b"prft");
	pub const MFRA: Self = Self::new(b"mfra");
	pub const FREE: Self = Self::new(b"free");
	pub const SIDX: Self = Self::new(b"sidx");

	pub const fn new(value: &[u8; 4]) -> Self {
		Self(*value)
	}

	pub fn as_bytes(&self) -> &[u8; 4] {
		&self.0
	}
}

impl From<&[u8; 4]> for FourCC {
	fn from(value: &[u8; 4]) -> Self {
		Self::new(value)
	}
}

impl fmt::Display for FourCC {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", String::from_utf8_lossy(&self.0))
	}
}

impl fmt::Debug for FourCC {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self)
	}
}

/// An atom header, which contains the atom's kind and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
	pub kind: FourCC,

	/// The size of the atom, **including** the header.
	pub size: usize,

	/// The size of the header itself, 8 or 16 bytes.
	pub len: usize,
}

impl Header {
	/// Parse the header at the start of `buf`.
	///
	/// The atom must fit within `buf`; a size of zero extends to the end of it.
	pub fn parse(buf: &[u8]) -> Result<Self> {
		if buf.len() < 8 {
			return Err(Error::Truncated);
		}

		let size = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
		let kind = FourCC([buf[4], buf[5], buf[6], buf[7]]);

		let (size, len) = match size {
			0 => (buf.len(), 8),
			1 => {
				if buf.len() < 16 {
					return Err(Error::Truncated);
				}

				let mut large = [0u8; 8];
				large.copy_from_slice(&buf[8..16]);
				let large = usize::try_from(u64::from_be_bytes(large)).map_err(|_| Error::InvalidSize)?;
				(large, 16)
			}
			size => (size, 8),
		};

		if size < len {
			return Err(Error::InvalidSize);
		}

		if size > buf.len() {
			return Err(Error::Truncated);
		}

		Ok(Self { kind, size, len })
	}
}

/// Iterate over the children of the container atom found at `at` within `buf`.
///
/// Yields the absolute offset of each child along with its header.
pub fn children<'a>(buf: &'a [u8], at: usize, parent: &Header) -> Children<'a> {
	Children {
		buf,
		pos: at + parent.len,
		end: at + parent.size,
	}
}

pub struct Children<'a> {
	buf: &'a [u8],
	pos: usize,
	end: usize,
}

impl Iterator for Children<'_> {
	type Item = Result<(usize, Header)>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.pos >= self.end {
			return None;
		}

		let at = self.pos;
		match Header::parse(&self.buf[at..self.end]) {
			Ok(header) => {
				self.pos += header.size;
				Some(Ok((at, header)))
			}
			Err(err) => {
				self.pos = self.end;
				Some(Err(err))
			}
		}
	}
}

// Read a full MP4 atom into memory, or None at the end of the input.
pub fn read_atom<R: Read>(reader: &mut R) -> Result<Option<Bytes>> {
	// Read the 8 bytes for the size + type
	let mut buf = [0u8; 8];
	let n = read_up_to(reader, &mut buf)?;
	match n {
		0 => return Ok(None),
		8 => {}
		_ => return Err(Error::Truncated),
	}

	// Convert the first 4 bytes into the size.
	let size = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as u64;

	let mut raw = buf.to_vec();

	let (mut limit, expected) = match size {
		// Runs until the end of the file.
		0 => (reader.take(u64::MAX), None),

		// The next 8 bytes are the extended size to be used instead.
		1 => {
			reader.read_exact(&mut buf)?;
			raw.extend_from_slice(&buf);

			let size_large = u64::from_be_bytes(buf);
			if size_large < 16 {
				return Err(Error::InvalidSize);
			}

			(reader.take(size_large - 16), Some(size_large))
		}

		2..=7 => return Err(Error::InvalidSize),

		// Otherwise read based on the size.
		size => (reader.take(size - 8), Some(size)),
	};

	// Append to the vector and return it.
	limit.read_to_end(&mut raw)?;

	if let Some(expected) = expected {
		if raw.len() as u64 != expected {
			return Err(Error::Truncated);
		}
	}

	Ok(Some(raw.into()))
}

// Like read_exact, but a clean EOF before the first byte is not an error.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
	let mut filled = 0;
	while filled < buf.len() {
		match reader.read(&mut buf[filled..]) {
			Ok(0) => break,
			Ok(n) => filled += n,
			Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
			Err(err) => return Err(err.into()),
		}
	}

	Ok(filled)
}

/// Write an atom of the given kind, filling in the size once `body` returns.
//
// We can't know the size upfront without encoding the body twice.
// Instead we write 0 for the size, then write the body, then go back and fix the size.
pub fn write_atom<F: FnOnce(&mut BytesMut)>(buf: &mut BytesMut, kind: FourCC, body: F) {
	let start = buf.len();
	buf.put_u32(0);
	buf.put_slice(kind.as_bytes());

	body(buf);

	let size = (buf.len() - start) as u32;
	buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

/// Write a full atom, which is prefixed with a version and 24 bits of flags.
pub fn write_full_atom<F: FnOnce(&mut BytesMut)>(buf: &mut BytesMut, kind: FourCC, version: u8, flags: u32, body: F) {
	write_atom(buf, kind, |buf| {
		buf.put_u32(((version as u32) << 24) | (flags & 0x00ff_ffff));
		body(buf);
	})
}

/// Write a null terminated UTF-8 string.
pub fn put_cstr(buf: &mut BytesMut, value: &str) {
	buf.put_slice(value.as_bytes());
	buf.put_u8(0);
}
