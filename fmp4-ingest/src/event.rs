use std::sync::Arc;

use bytes::Bytes;
use fmp4_stream::{scte35, sparse, Emsg};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::PushError;
use crate::options::{Avail, Options, EVENT_LEAD, EVENT_TIMESCALE, EVENT_TRACK_ID, SCTE35_SCHEME, SPARSE_SCHEME};
use crate::pacing::{self, Pacer};
use crate::retry;
use crate::transport::Transport;

/// One generated event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tick {
	pub id: u32,

	/// Seconds since the start of the current loop.
	pub media_time: f64,

	/// Seconds of every loop before the current one.
	pub loop_offset: f64,
}

impl Tick {
	/// Seconds since the start of the first loop.
	pub fn presentation_time(&self) -> f64 {
		self.media_time + self.loop_offset
	}
}

/// Produces an event every interval, wrapping around with the presentation so the timeline keeps moving forward.
#[derive(Debug)]
pub struct Ticker {
	interval: u64,
	presentation: f64,
	tick: u64,
	id: u32,
	loop_offset: f64,
}

impl Ticker {
	pub fn new(interval: u64, presentation: f64) -> Self {
		Self {
			interval,
			presentation,
			tick: 1,
			id: 1,
			loop_offset: 0.0,
		}
	}

	fn media_time(&self) -> f64 {
		self.tick as f64 * self.interval as f64 / EVENT_TIMESCALE as f64
	}

	pub fn advance(&mut self) -> Tick {
		if self.presentation > 0.0 && self.media_time() > self.presentation {
			self.tick = 1;
			self.loop_offset += self.presentation;
		}

		let tick = Tick {
			id: self.id,
			media_time: self.media_time(),
			loop_offset: self.loop_offset,
		};

		self.tick += 1;
		self.id = self.id.wrapping_add(1);

		tick
	}
}

/// Signals a SCTE-35 avail on a sparse timed metadata track every interval, forever.
pub struct EventPusher {
	avail: Avail,
	ticker: Ticker,
	pacer: Pacer,
	transport: Arc<dyn Transport>,
	options: Arc<Options>,
}

impl EventPusher {
	pub fn new(avail: Avail, transport: Arc<dyn Transport>, options: Arc<Options>) -> Self {
		Self {
			avail,
			ticker: Ticker::new(avail.interval, options.presentation),
			pacer: Pacer::new(options.realtime),
			transport,
			options,
		}
	}

	pub async fn run(mut self, cancel: CancellationToken) -> Result<(), PushError> {
		let init = sparse::sparse_init(SPARSE_SCHEME, EVENT_TIMESCALE, EVENT_TRACK_ID);

		let mut dump = match &self.options.emsg_dump {
			Some(path) => Some(tokio::fs::File::create(path).await?),
			None => None,
		};

		if let Some(dump) = dump.as_mut() {
			dump.write_all(&init).await?;
			dump.flush().await?;
		}

		retry::probe(&*self.transport, init.clone()).await?;
		self.pacer.reset();

		while !cancel.is_cancelled() {
			let tick = self.ticker.advance();

			let lead = EVENT_LEAD + self.options.announce;
			let delay = self.pacer.delay(tick.presentation_time(), lead, None);
			if !pacing::sleep(delay, &cancel).await {
				break;
			}

			let fragment = self.fragment(&tick);

			match retry::deliver(&*self.transport, fragment.clone(), &init, &cancel).await {
				Ok(()) => log::info!(
					"posted avail: id={} presentation={:.3} duration={}",
					tick.id,
					tick.presentation_time(),
					self.avail.duration
				),
				Err(PushError::Cancelled) => break,
				Err(err) => return Err(err),
			}

			if let Some(dump) = dump.as_mut() {
				dump.write_all(&fragment).await?;
			}
		}

		if let Some(dump) = dump.as_mut() {
			dump.flush().await?;
		}

		Ok(())
	}

	fn fragment(&self, tick: &Tick) -> Bytes {
		let timescale = EVENT_TIMESCALE as f64;
		let presentation_time = ((tick.presentation_time() + self.options.wallclock_start) * timescale).round() as u64;

		// The splice duration is in 90kHz ticks.
		let splice_duration = self.avail.duration * 90_000 / EVENT_TIMESCALE as u64;

		let event = Emsg {
			timescale: EVENT_TIMESCALE,
			presentation_time,
			event_duration: u32::try_from(self.avail.duration).unwrap_or(u32::MAX),
			id: tick.id,
			scheme_id_uri: SCTE35_SCHEME.to_string(),
			value: String::new(),
			message_data: scte35::splice_insert(tick.id, splice_duration),
		};

		sparse::emsg_fragment(&event, EVENT_TRACK_ID, EVENT_TIMESCALE, presentation_time)
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use fmp4_stream::IngestStream;

	use crate::options::RETRY_LIMIT;

	use super::*;
	use crate::testing;
	use crate::transport::mock::MockTransport;

	#[test]
	fn ticks_wrap_with_presentation() {
		let mut ticker = Ticker::new(6000, 10.0);

		let ticks: Vec<Tick> = (0..3).map(|_| ticker.advance()).collect();
		assert_eq!(ticks.iter().map(|tick| tick.id).collect::<Vec<_>>(), vec![1, 2, 3]);
		assert_eq!(ticks[0].presentation_time(), 6.0);

		// 12s is past the end of the presentation, so the second tick wraps.
		assert_eq!(ticks[1].media_time, 6.0);
		assert_eq!(ticks[1].loop_offset, 10.0);
		assert_eq!(ticks[1].presentation_time(), 16.0);
		assert_eq!(ticks[2].presentation_time(), 26.0);
	}

	#[test]
	fn ticks_without_presentation() {
		let mut ticker = Ticker::new(2000, 0.0);
		let times: Vec<f64> = (0..4).map(|_| ticker.advance().presentation_time()).collect();
		assert_eq!(times, vec![2.0, 4.0, 6.0, 8.0]);
	}

	#[test]
	fn fragment_timing() {
		let (_, transport) = testing::mock(MockTransport::new());
		let mut options = (*testing::options(&["--avail", "6000", "2000"], 10.0)).clone();
		options.wallclock_start = 100.0;

		let avail = options.avail.unwrap();
		let pusher = EventPusher::new(avail, transport, Arc::new(options));

		let tick = Tick {
			id: 4,
			media_time: 6.0,
			loop_offset: 10.0,
		};
		let fragment = pusher.fragment(&tick);

		let init = sparse::sparse_init(SPARSE_SCHEME, EVENT_TIMESCALE, EVENT_TRACK_ID);
		let file = [init.to_vec(), fragment.to_vec()].concat();
		let stream = IngestStream::load(&mut file.as_slice()).unwrap();

		assert_eq!(stream.track_id(), EVENT_TRACK_ID);
		assert_eq!(stream.start_time(), 116_000);
		assert_eq!(stream.duration(), 2000);
	}

	#[tokio::test(start_paused = true)]
	async fn dumps_every_fragment() {
		let path = std::env::temp_dir().join(format!("fmp4-ingest-{}-emsg.dump", std::process::id()));
		let dump = path.to_str().unwrap();

		let (mock, transport) = testing::mock(MockTransport::new());
		let options = testing::options(&["--avail", "6000", "2000", "--emsg-dump", dump], 10.0);
		let avail = options.avail.unwrap();
		let cancel = CancellationToken::new();

		let task = tokio::spawn(EventPusher::new(avail, transport, options).run(cancel.clone()));

		// The probe and three events.
		while mock.posts().len() < 4 {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}

		cancel.cancel();
		task.await.unwrap().unwrap();

		let posts = mock.posts();
		assert_eq!(posts[0], sparse::sparse_init(SPARSE_SCHEME, EVENT_TIMESCALE, EVENT_TRACK_ID));

		// The dump holds exactly what was posted.
		let stream = IngestStream::open(&path).unwrap();
		assert_eq!(stream.len(), posts.len() - 1);

		let decode: Vec<u64> = stream.fragments().iter().take(3).map(|f| f.decode_time()).collect();
		assert_eq!(decode, vec![6000, 16_000, 26_000]);

		std::fs::remove_file(path).unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn gives_up_after_retries() {
		let path = std::env::temp_dir().join(format!("fmp4-ingest-{}-failed.dump", std::process::id()));
		let dump = path.to_str().unwrap();

		let init = sparse::sparse_init(SPARSE_SCHEME, EVENT_TIMESCALE, EVENT_TRACK_ID);
		let accepted = init.clone();

		// Accept the sparse init, reject every event.
		let (mock, transport) = testing::mock(MockTransport::failing(move |body| *body != accepted));
		let options = testing::options(&["--avail", "6000", "2000", "--emsg-dump", dump], 10.0);
		let avail = options.avail.unwrap();

		let res = EventPusher::new(avail, transport, options)
			.run(CancellationToken::new())
			.await;
		assert!(matches!(res, Err(PushError::RetriesExhausted(RETRY_LIMIT))));

		let posts = mock.posts();
		let (inits, events): (Vec<&Bytes>, Vec<&Bytes>) = posts.iter().partition(|body| **body == init);

		// The probe, then the sparse init before each of the 9 retries.
		assert_eq!(inits.len(), RETRY_LIMIT);
		assert_eq!(events.len(), RETRY_LIMIT);
		assert!(events.iter().all(|event| *event == events[0]));

		// Nothing was delivered, so only the init segment was dumped.
		assert_eq!(std::fs::read(&path).unwrap(), init.to_vec());
		std::fs::remove_file(path).unwrap();
	}
}
