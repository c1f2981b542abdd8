use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;

use bytes::{Bytes, BytesMut};
use mp4::ReadBox;

use crate::atom::{self, Header};
use crate::{Error, FourCC, Fragment, Result};

/// How far to move the timeline of an [IngestStream].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TimelinePatch {
	/// A delta in timescale units.
	Units(u64),

	/// A delta in seconds, converted using the track timescale.
	Seconds(f64),
}

/// One CMAF track file: the init segment followed by its media fragments.
///
/// Fragments are kept in file order, which is non-decreasing in decode time.
#[derive(Clone, Debug)]
pub struct IngestStream {
	init: Bytes,
	track_id: u32,
	timescale: u32,
	fragments: Vec<Fragment>,
}

impl IngestStream {
	pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
		let file = fs::File::open(path)?;
		let mut reader = io::BufReader::new(file);
		Self::load(&mut reader)
	}

	pub fn load<R: Read>(reader: &mut R) -> Result<Self> {
		let mut init = BytesMut::new();
		let mut track: Option<Track> = None;

		// Atoms seen after the moov that belong to the next fragment.
		let mut prefix = BytesMut::new();

		// The moof we're waiting to pair with a mdat.
		let mut pending: Option<(BytesMut, usize)> = None;

		let mut fragments = Vec::new();

		while let Some(raw) = atom::read_atom(reader)? {
			let header = Header::parse(&raw)?;

			match header.kind {
				FourCC::FTYP => init.extend_from_slice(&raw),
				FourCC::MOOV => {
					track = Some(Track::parse(&raw)?);
					init.extend_from_slice(&raw);
				}
				FourCC::MOOF => {
					if pending.is_some() {
						return Err(Error::Orphan(FourCC::MOOF));
					}

					let mut fragment = std::mem::take(&mut prefix);
					let moof = fragment.len();
					fragment.extend_from_slice(&raw);
					pending = Some((fragment, moof));
				}
				FourCC::MDAT => {
					let (mut fragment, moof) = pending.take().ok_or(Error::Orphan(FourCC::MDAT))?;
					let track = track.as_ref().ok_or(Error::MissingAtom(FourCC::MOOV))?;

					fragment.extend_from_slice(&raw);
					fragments.push(Fragment::parse(fragment.freeze(), moof, track.default_duration)?);
				}
				// Anything ahead of the first moof belongs to the init segment.
				FourCC::STYP | FourCC::FREE | FourCC::SIDX if fragments.is_empty() && pending.is_none() => {
					init.extend_from_slice(&raw)
				}
				FourCC::EMSG | FourCC::PRFT | FourCC::STYP if track.is_some() => match pending.as_mut() {
					Some((fragment, _)) => fragment.extend_from_slice(&raw),
					None => prefix.extend_from_slice(&raw),
				},
				kind => log::debug!("skipping atom: kind={} size={}", kind, header.size),
			}
		}

		if pending.is_some() {
			return Err(Error::Orphan(FourCC::MOOF));
		}

		let track = track.ok_or(Error::MissingAtom(FourCC::MOOV))?;
		if track.timescale == 0 {
			return Err(Error::Timescale(track.timescale));
		}

		if fragments.is_empty() {
			return Err(Error::Empty);
		}

		Ok(Self {
			init: init.freeze(),
			track_id: track.id,
			timescale: track.timescale,
			fragments,
		})
	}

	/// The ftyp and moov atoms, with any styp, free or sidx ahead of the first moof.
	pub fn init_segment(&self) -> Bytes {
		self.init.clone()
	}

	pub fn fragment(&self, index: usize) -> Option<&Fragment> {
		self.fragments.get(index)
	}

	pub fn fragments(&self) -> &[Fragment] {
		&self.fragments
	}

	pub fn len(&self) -> usize {
		self.fragments.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fragments.is_empty()
	}

	pub fn track_id(&self) -> u32 {
		self.track_id
	}

	pub fn timescale(&self) -> u32 {
		self.timescale
	}

	/// The decode time of the first fragment.
	pub fn start_time(&self) -> u64 {
		self.fragments.first().map(Fragment::decode_time).unwrap_or_default()
	}

	/// From the start of the first fragment to the end of the last, in timescale units.
	pub fn duration(&self) -> u64 {
		let end = self.fragments.last().map(Fragment::end_time).unwrap_or_default();
		end.saturating_sub(self.start_time())
	}

	pub fn duration_secs(&self) -> f64 {
		self.duration() as f64 / self.timescale as f64
	}

	/// Move every fragment forward on the timeline.
	pub fn patch(&mut self, patch: TimelinePatch) -> Result<()> {
		let delta = match patch {
			TimelinePatch::Units(delta) => delta,
			TimelinePatch::Seconds(secs) => (secs * self.timescale as f64).round() as u64,
		};

		if delta == 0 {
			return Ok(());
		}

		for fragment in self.fragments.iter_mut() {
			fragment.rebase(delta)?;
		}

		Ok(())
	}
}

struct Track {
	id: u32,
	timescale: u32,
	default_duration: u32,
}

impl Track {
	fn parse(raw: &[u8]) -> Result<Self> {
		// We have to read the moov box header to correctly advance the cursor for the mp4 crate.
		let mut reader = Cursor::new(raw);
		let header = mp4::BoxHeader::read(&mut reader)?;
		let moov = mp4::MoovBox::read_box(&mut reader, header.size)?;

		// A CMAF track file carries exactly one track.
		let trak = moov.traks.first().ok_or(Error::MissingAtom(FourCC::TRAK))?;

		let default_duration = moov
			.mvex
			.as_ref()
			.map(|mvex| mvex.trex.default_sample_duration)
			.unwrap_or_default();

		Ok(Self {
			id: trak.tkhd.track_id,
			timescale: trak.mdia.mdhd.timescale,
			default_duration,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sparse;

	// 5 fragments of 2 seconds each at a timescale of 1000.
	fn asset(start: u64) -> Vec<u8> {
		let mut file = sparse::sparse_init("urn:test", 1000, 1).to_vec();
		for i in 0..5u64 {
			let fragment = sparse::media_fragment(i as u32 + 1, 1, start + i * 2000, 2000, b"sample");
			file.extend_from_slice(&fragment);
		}
		file
	}

	#[test]
	fn load() {
		let file = asset(0);
		let stream = IngestStream::load(&mut file.as_slice()).unwrap();

		assert_eq!(stream.len(), 5);
		assert_eq!(stream.timescale(), 1000);
		assert_eq!(stream.track_id(), 1);
		assert_eq!(stream.start_time(), 0);
		assert_eq!(stream.duration(), 10_000);
		assert_eq!(stream.duration_secs(), 10.0);
		assert_eq!(stream.init_segment(), sparse::sparse_init("urn:test", 1000, 1));

		let decode: Vec<u64> = stream.fragments().iter().map(Fragment::decode_time).collect();
		assert_eq!(decode, vec![0, 2000, 4000, 6000, 8000]);
	}

	#[test]
	fn duration_ignores_start() {
		let file = asset(90_000);
		let stream = IngestStream::load(&mut file.as_slice()).unwrap();
		assert_eq!(stream.start_time(), 90_000);
		assert_eq!(stream.duration(), 10_000);
	}

	#[test]
	fn patch_loops_timeline() {
		let file = asset(0);
		let mut stream = IngestStream::load(&mut file.as_slice()).unwrap();

		stream.patch(TimelinePatch::Units(stream.duration())).unwrap();
		assert_eq!(stream.start_time(), 10_000);
		assert_eq!(stream.fragment(4).unwrap().decode_time(), 18_000);

		stream.patch(TimelinePatch::Seconds(2.5)).unwrap();
		assert_eq!(stream.start_time(), 12_500);
		assert_eq!(stream.duration(), 10_000);
	}

	#[test]
	fn keeps_event_messages() {
		let mut file = sparse::sparse_init("urn:test", 1000, 1).to_vec();
		file.extend_from_slice(b"\0\0\0\x0cemsgabcd");
		file.extend_from_slice(&sparse::media_fragment(1, 1, 0, 2000, b"x"));

		let stream = IngestStream::load(&mut file.as_slice()).unwrap();
		let raw = stream.fragment(0).unwrap().bytes();
		assert_eq!(&raw[4..8], b"emsg");
		assert_eq!(&raw[16..20], b"moof");
	}

	#[test]
	fn init_keeps_leading_atoms() {
		let styp = b"\0\0\0\x10stypcmfc\0\0\0\0";
		let free = b"\0\0\0\x0cfreeabcd";
		let init = sparse::sparse_init("urn:test", 1000, 1);

		let mut file = styp.to_vec();
		file.extend_from_slice(&init);
		file.extend_from_slice(free);
		file.extend_from_slice(&sparse::media_fragment(1, 1, 0, 2000, b"x"));

		// A free after the first fragment is dropped.
		file.extend_from_slice(free);
		file.extend_from_slice(&sparse::media_fragment(2, 1, 2000, 2000, b"y"));

		let stream = IngestStream::load(&mut file.as_slice()).unwrap();
		assert_eq!(stream.len(), 2);

		let expected = [&styp[..], &init[..], &free[..]].concat();
		assert_eq!(stream.init_segment(), expected);
		assert_eq!(&stream.fragment(1).unwrap().bytes()[4..8], b"moof");
	}

	#[test]
	fn rejects_bad_input() {
		let init = sparse::sparse_init("urn:test", 1000, 1);
		assert!(matches!(IngestStream::load(&mut &init[..]), Err(Error::Empty)));

		let fragment = sparse::media_fragment(1, 1, 0, 2000, b"x");
		assert!(matches!(
			IngestStream::load(&mut &fragment[..]),
			Err(Error::MissingAtom(FourCC::MOOV))
		));

		// Drop the trailing mdat.
		let mut file = init.to_vec();
		let moof = Header::parse(&fragment).unwrap();
		file.extend_from_slice(&fragment[..moof.size]);
		assert!(matches!(
			IngestStream::load(&mut file.as_slice()),
			Err(Error::Orphan(FourCC::MOOF))
		));
	}
}
