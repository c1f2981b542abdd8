use std::time::Duration;

use bytes::Bytes;
use fmp4_stream::{IngestStream, TimelinePatch};

use crate::options::Options;
use crate::pacing::Pacer;

/// The playback position of one track, shared by every kind of pusher.
pub struct Playout {
	stream: IngestStream,
	name: String,
	pacer: Pacer,

	// The loop period in seconds, or 0 to use the track's own duration.
	presentation: f64,
}

impl Playout {
	pub fn new(stream: IngestStream, name: &str, options: &Options) -> Self {
		Self {
			stream,
			name: name.to_string(),
			pacer: Pacer::new(options.realtime),
			presentation: options.presentation,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn len(&self) -> usize {
		self.stream.len()
	}

	pub fn init_segment(&self) -> Bytes {
		self.stream.init_segment()
	}

	pub fn fragment(&self, index: usize) -> Bytes {
		self.stream.fragments()[index].bytes()
	}

	fn secs(&self, units: u64) -> f64 {
		units as f64 / self.stream.timescale() as f64
	}

	/// Seconds from the start of this pass to the start of the fragment.
	pub fn media_time(&self, index: usize) -> f64 {
		let fragment = &self.stream.fragments()[index];
		self.secs(fragment.decode_time() - self.stream.start_time())
	}

	pub fn fragment_secs(&self, index: usize) -> f64 {
		self.secs(self.stream.fragments()[index].duration())
	}

	/// Seconds from the start of this pass to the end of the fragment.
	pub fn elapsed_media(&self, index: usize) -> f64 {
		let fragment = &self.stream.fragments()[index];
		self.secs(fragment.end_time() - self.stream.start_time())
	}

	/// How long to wait before sending the fragment at `index`.
	pub fn delay(&self, index: usize, adjust: f64, cap: Option<f64>) -> Duration {
		self.pacer.delay(self.media_time(index), adjust, cap)
	}

	pub fn reset_clock(&mut self) {
		self.pacer.reset();
	}

	/// Move the timeline forward by one loop period and start pacing again from the top.
	pub fn rewind(&mut self) -> fmp4_stream::Result<()> {
		let shift = (self.presentation * self.stream.timescale() as f64).round() as u64;
		let shift = match shift {
			0 => self.stream.duration(),
			shift => shift,
		};

		self.stream.patch(TimelinePatch::Units(shift))?;
		self.pacer.reset();

		log::debug!("looping track: name={} shift={}", self.name, shift);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing;

	#[test]
	fn media_times() {
		let options = testing::options(&[], 0.0);
		let playout = Playout::new(testing::asset(90_000, 5, 2000), "test.cmfv", &options);

		assert_eq!(playout.len(), 5);
		assert_eq!(playout.media_time(0), 0.0);
		assert_eq!(playout.media_time(3), 6.0);
		assert_eq!(playout.fragment_secs(3), 2.0);
		assert_eq!(playout.elapsed_media(3), 8.0);
	}

	#[test]
	fn rewind_by_presentation() {
		let options = testing::options(&[], 12.0);
		let mut playout = Playout::new(testing::asset(0, 5, 2000), "test.cmfv", &options);

		playout.rewind().unwrap();
		assert_eq!(testing::decode_time(&playout.fragment(0)), 12_000);

		// Media time restarts on every pass.
		assert_eq!(playout.media_time(1), 2.0);
	}

	#[test]
	fn rewind_by_own_duration() {
		let options = testing::options(&[], 0.0);
		let mut playout = Playout::new(testing::asset(0, 5, 2000), "test.cmfv", &options);

		playout.rewind().unwrap();
		playout.rewind().unwrap();
		assert_eq!(testing::decode_time(&playout.fragment(0)), 20_000);
	}
}
