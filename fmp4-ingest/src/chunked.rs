use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::PushError;
use crate::options::{Options, CHUNK_SIZE, RETRY_DELAY};
use crate::pacing;
use crate::playout::Playout;
use crate::retry;
use crate::transport::Transport;

/// The result of pulling from a [ChunkedBody].
#[derive(Debug, PartialEq)]
pub enum Pull {
	/// The next chunk of the body.
	Data(Bytes),

	/// Nothing to send until this much time has passed.
	Wait(Duration),

	/// The body is complete.
	Done,
}

#[derive(Debug, Default)]
struct Cursor {
	// The next fragment to send.
	index: usize,

	// The number of bytes already sent from the init segment or the current fragment.
	offset: usize,

	init_sent: bool,
	recovering: bool,
	done: bool,

	// Whether the current fragment has already waited for its media time.
	paced: bool,

	// A completed fragment the transport hasn't taken yet.
	inflight: Option<usize>,
}

/// The body of one long running chunked POST: the init segment followed by every fragment, forever.
///
/// Driven by [ChunkedBody::pull] so the transport decides when to ask for more.
/// Call [ChunkedBody::commit] once the transport has taken everything pulled so far,
/// so [ChunkedBody::recover] knows where to resume.
pub struct ChunkedBody {
	playout: Playout,
	init: Bytes,
	looping: bool,
	cursor: Cursor,
}

impl ChunkedBody {
	pub fn new(playout: Playout, looping: bool) -> Self {
		let init = playout.init_segment();
		Self {
			playout,
			init,
			looping,
			cursor: Cursor::default(),
		}
	}

	pub fn pull(&mut self, max: usize) -> Result<Pull, PushError> {
		let cursor = &mut self.cursor;
		if cursor.done {
			return Ok(Pull::Done);
		}

		// The init segment starts every request, including the ones after a failure.
		if !cursor.init_sent || cursor.recovering {
			let chunk = slice(&self.init, cursor.offset, max);
			cursor.offset += chunk.len();

			if cursor.offset >= self.init.len() {
				cursor.init_sent = true;
				cursor.recovering = false;
				cursor.offset = 0;
			}

			return Ok(Pull::Data(chunk));
		}

		if cursor.index >= self.playout.len() {
			if !self.looping {
				cursor.done = true;
				return Ok(Pull::Done);
			}

			self.playout.rewind()?;
			self.cursor.index = 0;
			self.cursor.paced = false;
		}

		let cursor = &mut self.cursor;
		let index = cursor.index;

		if !cursor.paced {
			cursor.paced = true;

			// Send each fragment one fragment duration ahead of its media time.
			let delay = self.playout.delay(index, self.playout.fragment_secs(index), None);
			if !delay.is_zero() {
				return Ok(Pull::Wait(delay));
			}
		}

		let fragment = self.playout.fragment(index);
		let chunk = slice(&fragment, cursor.offset, max);
		cursor.offset += chunk.len();

		if cursor.offset >= fragment.len() {
			log::info!(
				"sent fragment: index={} name={} duration={:.3} elapsed={:.3}",
				index,
				self.playout.name(),
				self.playout.fragment_secs(index),
				self.playout.elapsed_media(index)
			);

			cursor.inflight = Some(index);
			cursor.index += 1;
			cursor.offset = 0;
			cursor.paced = false;
		}

		Ok(Pull::Data(chunk))
	}

	/// Everything pulled so far was taken by the transport.
	pub fn commit(&mut self) {
		self.cursor.inflight = None;
	}

	/// Start a new request: resend the init segment, then restart from the oldest fragment not yet taken.
	pub fn recover(&mut self) {
		if let Some(index) = self.cursor.inflight.take() {
			self.cursor.index = index;
			self.cursor.done = false;
		}

		self.cursor.recovering = true;
		self.cursor.offset = 0;
		self.cursor.paced = false;
	}

	pub fn is_done(&self) -> bool {
		self.cursor.done
	}

	/// The duration of the current fragment, used to back off after a failure.
	pub fn backoff(&self) -> Duration {
		let index = self.cursor.index.min(self.playout.len().saturating_sub(1));
		Duration::try_from_secs_f64(self.playout.fragment_secs(index)).unwrap_or(RETRY_DELAY)
	}

	pub fn playout_mut(&mut self) -> &mut Playout {
		&mut self.playout
	}
}

fn slice(buf: &Bytes, offset: usize, max: usize) -> Bytes {
	let end = buf.len().min(offset.saturating_add(max));
	buf.slice(offset.min(end)..end)
}

/// Posts a track as one long running chunked request, starting a new one whenever it fails.
pub struct ChunkedPusher {
	body: ChunkedBody,
	transport: Arc<dyn Transport>,
	options: Arc<Options>,
}

impl ChunkedPusher {
	pub fn new(playout: Playout, transport: Arc<dyn Transport>, options: Arc<Options>) -> Self {
		Self {
			body: ChunkedBody::new(playout, options.looping),
			transport,
			options,
		}
	}

	pub async fn run(mut self, cancel: CancellationToken) -> Result<(), PushError> {
		retry::probe(&*self.transport, self.body.init.clone()).await?;
		self.body.playout_mut().reset_clock();

		while !cancel.is_cancelled() && !self.body.is_done() {
			// A single slot, so a free slot means the transport took the previous chunk.
			let (tx, rx) = mpsc::channel(1);
			let (posted, fed) = tokio::join!(self.transport.post_stream(rx), feed(&mut self.body, tx, &cancel));
			fed?;

			match posted {
				Ok(()) if self.body.is_done() => break,
				Ok(()) if cancel.is_cancelled() => break,
				Ok(()) => log::warn!("chunked post ended early: url={}", self.transport.url()),
				Err(err) => log::warn!("chunked post failed: url={} err={}", self.transport.url(), err),
			}

			self.body.recover();

			if !pacing::sleep(self.body.backoff(), &cancel).await {
				break;
			}

			log::info!("restarting chunked post: url={}", self.transport.url());
		}

		retry::close(&*self.transport, self.options.close_pp).await;
		Ok(())
	}
}

// Pull from the body into the request until it's done, cancelled or the request goes away.
async fn feed(body: &mut ChunkedBody, tx: mpsc::Sender<Bytes>, cancel: &CancellationToken) -> Result<(), PushError> {
	loop {
		let permit = tokio::select! {
			res = tx.reserve() => match res {
				Ok(permit) => permit,
				Err(_) => return Ok(()),
			},
			_ = cancel.cancelled() => return Ok(()),
		};

		body.commit();

		if cancel.is_cancelled() {
			return Ok(());
		}

		match body.pull(CHUNK_SIZE)? {
			Pull::Data(chunk) => permit.send(chunk),
			Pull::Wait(delay) => {
				drop(permit);

				tokio::select! {
					_ = tokio::time::sleep(delay) => {},
					_ = cancel.cancelled() => return Ok(()),
					_ = tx.closed() => return Ok(()),
				}
			}
			Pull::Done => return Ok(()),
		}
	}
}
