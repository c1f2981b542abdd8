use std::io::Cursor;

use bytes::{BufMut, Bytes, BytesMut};
use mp4::ReadBox;

use crate::atom::{self, Header};
use crate::{Error, FourCC, Result};

/// One media fragment: a `moof` atom, its `mdat`, and anything that travels with them (ex. `emsg`, `prft`).
#[derive(Clone, Debug)]
pub struct Fragment {
	raw: Bytes,

	// The offset of the moof atom within raw.
	moof: usize,

	// The base decode time of the first traf, in timescale units.
	decode_time: u64,

	// The sum of the sample durations, in timescale units.
	duration: u64,
}

impl Fragment {
	/// Parse the fragment timing from `raw`, which contains a moof at offset `moof`.
	///
	/// `default_duration` comes from the `trex` atom and is used when neither `tfhd` nor `trun` carry durations.
	pub fn parse(raw: Bytes, moof: usize, default_duration: u32) -> Result<Self> {
		let mut reader = Cursor::new(&raw[moof..]);
		let header = mp4::BoxHeader::read(&mut reader)?;
		let parsed = mp4::MoofBox::read_box(&mut reader, header.size)?;

		// Only the first traf is used for timing, CMAF has a single track per fragment anyway.
		let traf = parsed.trafs.first().ok_or(Error::MissingAtom(FourCC::TRAF))?;
		let decode_time = traf.tfdt.as_ref().ok_or(Error::MissingTfdt)?.base_media_decode_time;

		let duration = match &traf.trun {
			Some(trun) if !trun.sample_durations.is_empty() => trun.sample_durations.iter().map(|d| *d as u64).sum(),
			Some(trun) => {
				let default = traf.tfhd.default_sample_duration.unwrap_or(default_duration);
				trun.sample_count as u64 * default as u64
			}
			None => 0,
		};

		Ok(Self {
			raw,
			moof,
			decode_time,
			duration,
		})
	}

	/// The bytes to post for this fragment.
	pub fn bytes(&self) -> Bytes {
		self.raw.clone()
	}

	pub fn decode_time(&self) -> u64 {
		self.decode_time
	}

	pub fn duration(&self) -> u64 {
		self.duration
	}

	pub fn end_time(&self) -> u64 {
		self.decode_time + self.duration
	}

	/// Add `delta` to the decode time of every traf.
	///
	/// A version 0 tfdt that can no longer hold the new value is rewritten as version 1.
	/// That grows the moof by 4 bytes, so every trun data offset is moved along with the mdat.
	pub fn rebase(&mut self, delta: u64) -> Result<()> {
		let mut raw = BytesMut::from(&self.raw[..]);

		let targets = locate(&raw, self.moof)?
			.iter()
			.map(|slot| slot.value.checked_add(delta).ok_or(Error::TooLarge))
			.collect::<Result<Vec<u64>>>()?;

		let first = *targets.first().ok_or(Error::MissingTfdt)?;

		// Offsets shift after every upgrade, so locate again each time.
		loop {
			let slots = locate(&raw, self.moof)?;
			let upgrade = slots
				.iter()
				.zip(targets.iter())
				.find(|(slot, target)| slot.version == 0 && **target > u32::MAX as u64)
				.map(|(slot, _)| *slot);

			match upgrade {
				Some(slot) => raw = upgrade_tfdt(&raw, self.moof, &slot)?,
				None => break,
			}
		}

		for (slot, target) in locate(&raw, self.moof)?.iter().zip(targets.iter()) {
			let at = slot.tfdt + 12;
			match slot.version {
				0 => raw[at..at + 4].copy_from_slice(&(*target as u32).to_be_bytes()),
				_ => raw[at..at + 8].copy_from_slice(&target.to_be_bytes()),
			}
		}

		self.raw = raw.freeze();
		self.decode_time = first;

		Ok(())
	}
}

#[derive(Clone, Copy, Debug)]
struct Slot {
	// Absolute offsets of the traf and tfdt atoms.
	traf: usize,
	tfdt: usize,
	version: u8,
	value: u64,
}

// Find the tfdt of every traf in the moof at `moof`.
fn locate(raw: &[u8], moof: usize) -> Result<Vec<Slot>> {
	let header = Header::parse(&raw[moof..])?;
	if header.kind != FourCC::MOOF {
		return Err(Error::MissingAtom(FourCC::MOOF));
	}

	let mut slots = Vec::new();

	for child in atom::children(raw, moof, &header) {
		let (traf, traf_header) = child?;
		if traf_header.kind != FourCC::TRAF {
			continue;
		}

		for child in atom::children(raw, traf, &traf_header) {
			let (tfdt, tfdt_header) = child?;
			if tfdt_header.kind != FourCC::TFDT {
				continue;
			}

			let body = &raw[tfdt + tfdt_header.len..tfdt + tfdt_header.size];
			let version = *body.first().ok_or(Error::Truncated)?;
			let value = match version {
				0 if body.len() >= 8 => u32::from_be_bytes([body[4], body[5], body[6], body[7]]) as u64,
				1 if body.len() >= 12 => {
					let mut value = [0u8; 8];
					value.copy_from_slice(&body[4..12]);
					u64::from_be_bytes(value)
				}
				_ => return Err(Error::InvalidSize),
			};

			// The in-place rewrite assumes a compact header.
			if tfdt_header.len != 8 {
				return Err(Error::InvalidSize);
			}

			slots.push(Slot {
				traf,
				tfdt,
				version,
				value,
			});
		}
	}

	Ok(slots)
}

// Rewrite a version 0 tfdt as version 1, fixing up the sizes and data offsets that depend on it.
fn upgrade_tfdt(raw: &[u8], moof: usize, slot: &Slot) -> Result<BytesMut> {
	let tfdt = slot.tfdt;

	let mut out = BytesMut::with_capacity(raw.len() + 4);
	out.extend_from_slice(&raw[..tfdt]);
	out.put_u32(20);
	out.put_slice(FourCC::TFDT.as_bytes());
	out.put_u8(1);
	out.extend_from_slice(&raw[tfdt + 9..tfdt + 12]);
	out.put_u64(slot.value);
	out.extend_from_slice(&raw[tfdt + 16..]);

	grow(&mut out, moof)?;
	grow(&mut out, slot.traf)?;

	// The mdat moved 4 bytes further away from the start of the moof.
	for trun in truns(&out, moof)? {
		let at = trun + 16;
		let offset = i32::from_be_bytes([out[at], out[at + 1], out[at + 2], out[at + 3]]);
		let offset = offset.checked_add(4).ok_or(Error::InvalidSize)?;
		out[at..at + 4].copy_from_slice(&offset.to_be_bytes());
	}

	Ok(out)
}

// Add 4 bytes to the size of the atom at `at`.
fn grow(buf: &mut BytesMut, at: usize) -> Result<()> {
	let size = u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
	match size {
		0 => Ok(()),
		1 => {
			let mut large = [0u8; 8];
			large.copy_from_slice(&buf[at + 8..at + 16]);
			let large = u64::from_be_bytes(large) + 4;
			buf[at + 8..at + 16].copy_from_slice(&large.to_be_bytes());
			Ok(())
		}
		size => {
			let size = size.checked_add(4).ok_or(Error::InvalidSize)?;
			buf[at..at + 4].copy_from_slice(&size.to_be_bytes());
			Ok(())
		}
	}
}

// The absolute offsets of every trun with a data offset.
fn truns(raw: &[u8], moof: usize) -> Result<Vec<usize>> {
	let header = Header::parse(&raw[moof..])?;
	let mut found = Vec::new();

	for child in atom::children(raw, moof, &header) {
		let (traf, traf_header) = child?;
		if traf_header.kind != FourCC::TRAF {
			continue;
		}

		for child in atom::children(raw, traf, &traf_header) {
			let (trun, trun_header) = child?;
			if trun_header.kind != FourCC::TRUN || trun_header.size < 20 {
				continue;
			}

			let flags = u32::from_be_bytes([0, raw[trun + 9], raw[trun + 10], raw[trun + 11]]);
			if flags & TRUN_DATA_OFFSET != 0 {
				found.push(trun);
			}
		}
	}

	Ok(found)
}

const TRUN_DATA_OFFSET: u32 = 0x000001;
