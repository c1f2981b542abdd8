//! SCTE-35 splice information, just enough to signal an avail.

use bytes::{BufMut, Bytes, BytesMut};

const TABLE_ID: u8 = 0xfc;
const SPLICE_INSERT: u8 = 0x05;

// 33 bits of 90kHz ticks.
const MAX_DURATION: u64 = (1 << 33) - 1;

static CRC: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_MPEG_2);

/// Encode a `splice_info_section` containing a single `splice_insert` command.
///
/// The splice marks the start of an out-of-network break of `duration` 90kHz ticks with auto return.
/// The splice time is left unspecified; the carrying event message provides the presentation time.
pub fn splice_insert(event_id: u32, duration: u64) -> Bytes {
	let duration = duration.min(MAX_DURATION);

	let mut command = BytesMut::with_capacity(16);
	command.put_u32(event_id);
	command.put_u8(0x7f); // splice_event_cancel_indicator=0
	command.put_u8(0xef); // out_of_network=1 program_splice=1 duration=1 splice_immediate=0
	command.put_u8(0x7f); // splice_time: time_specified_flag=0
	command.put_u8(0xfe | (duration >> 32) as u8); // auto_return=1
	command.put_u32(duration as u32);
	command.put_u16(1); // unique_program_id
	command.put_u8(0); // avail_num
	command.put_u8(0); // avails_expected

	// Everything after the section_length field, including the CRC.
	let section_length = 1 + 5 + 1 + 3 + 1 + command.len() + 2 + 4;

	let mut section = BytesMut::with_capacity(3 + section_length);
	section.put_u8(TABLE_ID);
	section.put_u16(0x3000 | (section_length as u16 & 0x0fff)); // sap_type=3
	section.put_u8(0); // protocol_version
	section.put_u8(0); // encrypted_packet=0 encryption_algorithm=0 pts_adjustment=0
	section.put_u32(0);
	section.put_u8(0); // cw_index

	// tier=0xfff followed by the 12 bit command length.
	let tier = (0xfffu32 << 12) | (command.len() as u32 & 0x0fff);
	section.put_u8((tier >> 16) as u8);
	section.put_u16(tier as u16);

	section.put_u8(SPLICE_INSERT);
	section.extend_from_slice(&command);
	section.put_u16(0); // descriptor_loop_length

	let crc = CRC.checksum(&section);
	section.put_u32(crc);

	section.freeze()
}
