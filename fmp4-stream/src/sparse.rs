//! The sparse timed metadata track used to carry event messages.

use bytes::{BufMut, Bytes, BytesMut};

use crate::atom::{put_cstr, write_atom, write_full_atom};
use crate::FourCC;

/// Signals the end of the stream to the publishing point.
pub const EMPTY_MFRA: [u8; 8] = [0, 0, 0, 8, b'm', b'f', b'r', b'a'];

const UNITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

// tfhd
const DEFAULT_BASE_IS_MOOF: u32 = 0x020000;

// trun
const DATA_OFFSET: u32 = 0x000001;
const SAMPLE_DURATION: u32 = 0x000100;
const SAMPLE_SIZE: u32 = 0x000200;

/// An event message, always encoded as version 1 with an absolute presentation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emsg {
	pub timescale: u32,
	pub presentation_time: u64,
	pub event_duration: u32,
	pub id: u32,
	pub scheme_id_uri: String,
	pub value: String,
	pub message_data: Bytes,
}

impl Emsg {
	pub fn encode(&self, buf: &mut BytesMut) {
		write_full_atom(buf, FourCC::EMSG, 1, 0, |buf| {
			buf.put_u32(self.timescale);
			buf.put_u64(self.presentation_time);
			buf.put_u32(self.event_duration);
			buf.put_u32(self.id);
			put_cstr(buf, &self.scheme_id_uri);
			put_cstr(buf, &self.value);
			buf.put_slice(&self.message_data);
		})
	}
}

/// The init segment of a timed metadata track whose samples are event messages of `scheme`.
pub fn sparse_init(scheme: &str, timescale: u32, track_id: u32) -> Bytes {
	let mut buf = BytesMut::new();

	write_atom(&mut buf, FourCC::FTYP, |buf| {
		buf.put_slice(b"cmfm");
		buf.put_u32(0);
		for brand in [b"iso6", b"cmfc", b"cmfm"] {
			buf.put_slice(brand);
		}
	});

	write_atom(&mut buf, FourCC::MOOV, |buf| {
		write_full_atom(buf, FourCC::new(b"mvhd"), 0, 0, |buf| {
			buf.put_u32(0); // creation_time
			buf.put_u32(0); // modification_time
			buf.put_u32(timescale);
			buf.put_u32(0); // duration
			buf.put_u32(0x0001_0000); // rate
			buf.put_u16(0x0100); // volume
			buf.put_bytes(0, 10);
			UNITY_MATRIX.iter().for_each(|v| buf.put_u32(*v));
			buf.put_bytes(0, 24);
			buf.put_u32(track_id + 1); // next_track_id
		});

		write_atom(buf, FourCC::TRAK, |buf| {
			// enabled | in_movie
			write_full_atom(buf, FourCC::new(b"tkhd"), 0, 0x000003, |buf| {
				buf.put_u32(0);
				buf.put_u32(0);
				buf.put_u32(track_id);
				buf.put_u32(0);
				buf.put_u32(0); // duration
				buf.put_bytes(0, 8);
				buf.put_u16(0); // layer
				buf.put_u16(0); // alternate_group
				buf.put_u16(0); // volume
				buf.put_u16(0);
				UNITY_MATRIX.iter().for_each(|v| buf.put_u32(*v));
				buf.put_u32(0); // width
				buf.put_u32(0); // height
			});

			write_atom(buf, FourCC::new(b"mdia"), |buf| {
				write_full_atom(buf, FourCC::new(b"mdhd"), 0, 0, |buf| {
					buf.put_u32(0);
					buf.put_u32(0);
					buf.put_u32(timescale);
					buf.put_u32(0);
					buf.put_u16(0x55c4); // und
					buf.put_u16(0);
				});

				write_full_atom(buf, FourCC::new(b"hdlr"), 0, 0, |buf| {
					buf.put_u32(0);
					buf.put_slice(b"meta");
					buf.put_bytes(0, 12);
					put_cstr(buf, "EventMessage");
				});

				write_atom(buf, FourCC::new(b"minf"), |buf| {
					write_full_atom(buf, FourCC::new(b"nmhd"), 0, 0, |_| {});

					write_atom(buf, FourCC::new(b"dinf"), |buf| {
						write_full_atom(buf, FourCC::new(b"dref"), 0, 0, |buf| {
							buf.put_u32(1);
							// self contained
							write_full_atom(buf, FourCC::new(b"url "), 0, 1, |_| {});
						});
					});

					write_atom(buf, FourCC::new(b"stbl"), |buf| {
						write_full_atom(buf, FourCC::new(b"stsd"), 0, 0, |buf| {
							buf.put_u32(1);
							write_atom(buf, FourCC::new(b"urim"), |buf| {
								buf.put_bytes(0, 6);
								buf.put_u16(1); // data_reference_index
								write_full_atom(buf, FourCC::new(b"uri "), 0, 0, |buf| put_cstr(buf, scheme));
							});
						});

						write_full_atom(buf, FourCC::new(b"stts"), 0, 0, |buf| buf.put_u32(0));
						write_full_atom(buf, FourCC::new(b"stsc"), 0, 0, |buf| buf.put_u32(0));
						write_full_atom(buf, FourCC::new(b"stsz"), 0, 0, |buf| {
							buf.put_u32(0);
							buf.put_u32(0);
						});
						write_full_atom(buf, FourCC::new(b"stco"), 0, 0, |buf| buf.put_u32(0));
					});
				});
			});
		});

		write_atom(buf, FourCC::new(b"mvex"), |buf| {
			write_full_atom(buf, FourCC::new(b"trex"), 0, 0, |buf| {
				buf.put_u32(track_id);
				buf.put_u32(1); // default_sample_description_index
				buf.put_u32(0); // default_sample_duration
				buf.put_u32(0); // default_sample_size
				buf.put_u32(0); // default_sample_flags
			});
		});
	});

	buf.freeze()
}

/// A single sample fragment: moof followed by a mdat holding `sample`.
pub fn media_fragment(sequence: u32, track_id: u32, decode_time: u64, duration: u32, sample: &[u8]) -> Bytes {
	let mut buf = BytesMut::new();

	// Remember where the data offset goes; it depends on the size of the moof.
	let mut data_offset_at = 0;

	write_atom(&mut buf, FourCC::MOOF, |buf| {
		write_full_atom(buf, FourCC::new(b"mfhd"), 0, 0, |buf| buf.put_u32(sequence));
		write_atom(buf, FourCC::TRAF, |buf| {
			write_full_atom(buf, FourCC::new(b"tfhd"), 0, DEFAULT_BASE_IS_MOOF, |buf| buf.put_u32(track_id));
			write_full_atom(buf, FourCC::TFDT, 1, 0, |buf| buf.put_u64(decode_time));
			write_full_atom(buf, FourCC::TRUN, 0, DATA_OFFSET | SAMPLE_DURATION | SAMPLE_SIZE, |buf| {
				buf.put_u32(1); // sample_count
				data_offset_at = buf.len();
				buf.put_i32(0);
				buf.put_u32(duration);
				buf.put_u32(sample.len() as u32);
			});
		});
	});

	// The sample starts right after the mdat header.
	let data_offset = (buf.len() + 8) as i32;
	buf[data_offset_at..data_offset_at + 4].copy_from_slice(&data_offset.to_be_bytes());

	write_atom(&mut buf, FourCC::MDAT, |buf| buf.put_slice(sample));

	buf.freeze()
}

/// A sparse fragment carrying `event` as its only sample, starting at `decode_time` in the track timescale.
pub fn emsg_fragment(event: &Emsg, track_id: u32, timescale: u32, decode_time: u64) -> Bytes {
	let mut sample = BytesMut::new();
	event.encode(&mut sample);

	// The sample lasts as long as the event, converted to the track timescale.
	let duration = match event.timescale {
		0 => 0,
		ts => (event.event_duration as u64 * timescale as u64 / ts as u64) as u32,
	};

	media_fragment(event.id, track_id, decode_time, duration, &sample)
}
