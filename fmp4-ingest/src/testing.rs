use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use fmp4_stream::{sparse, IngestStream};

use crate::cli::Config;
use crate::options::Options;
use crate::transport::{mock::MockTransport, Transport};

/// A track with `count` fragments of `duration` units each, at a timescale of 1000.
pub fn asset(start: u64, count: usize, duration: u32) -> IngestStream {
	let mut file = sparse::sparse_init("urn:test", 1000, 1).to_vec();
	for i in 0..count {
		let decode_time = start + i as u64 * duration as u64;
		let fragment = sparse::media_fragment(i as u32 + 1, 1, decode_time, duration, &[i as u8; 32]);
		file.extend_from_slice(&fragment);
	}

	IngestStream::load(&mut file.as_slice()).unwrap()
}

/// Parse options from command line flags, finalized with the given presentation duration.
pub fn options(flags: &[&str], presentation: f64) -> Arc<Options> {
	let args = ["fmp4-ingest"].iter().chain(flags).chain(["test.cmfv"].iter());
	let config = Config::parse_from(args);

	let mut options = Options::new(&config);
	options.presentation = presentation;
	Arc::new(options)
}

pub fn mock(transport: MockTransport) -> (Arc<MockTransport>, Arc<dyn Transport>) {
	let mock = Arc::new(transport);
	let transport: Arc<dyn Transport> = mock.clone();
	(mock, transport)
}

/// The decode time of a fragment produced by [asset] or sent by a pusher.
pub fn decode_time(fragment: &Bytes) -> u64 {
	let file = [sparse::sparse_init("urn:test", 1000, 1).to_vec(), fragment.to_vec()].concat();
	IngestStream::load(&mut file.as_slice()).unwrap().start_time()
}
