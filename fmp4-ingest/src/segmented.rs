use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::PushError;
use crate::options::Options;
use crate::pacing;
use crate::playout::Playout;
use crate::retry;
use crate::transport::Transport;

/// When to send each fragment in realtime mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Schedule {
	/// At its media time, sleeping at most one fragment duration at a time.
	Capped,

	/// This many seconds ahead of its media time.
	Lead(f64),
}

/// Posts every fragment of a track as its own request.
pub struct SegmentedPusher {
	playout: Playout,
	transport: Arc<dyn Transport>,
	options: Arc<Options>,
	schedule: Schedule,
}

impl SegmentedPusher {
	pub fn new(playout: Playout, transport: Arc<dyn Transport>, options: Arc<Options>, schedule: Schedule) -> Self {
		Self {
			playout,
			transport,
			options,
			schedule,
		}
	}

	pub async fn run(mut self, cancel: CancellationToken) -> Result<(), PushError> {
		let init = self.playout.init_segment();
		retry::probe(&*self.transport, init.clone()).await?;

		self.push(&init, &cancel).await?;

		retry::close(&*self.transport, self.options.close_pp).await;
		Ok(())
	}

	async fn push(&mut self, init: &Bytes, cancel: &CancellationToken) -> Result<(), PushError> {
		self.playout.reset_clock();

		'outer: loop {
			for index in 0..self.playout.len() {
				let delay = match self.schedule {
					Schedule::Capped => self.playout.delay(index, 0.0, Some(self.playout.fragment_secs(index))),
					Schedule::Lead(lead) => self.playout.delay(index, lead, None),
				};

				if !pacing::sleep(delay, cancel).await {
					break 'outer;
				}

				let fragment = self.playout.fragment(index);
				match retry::deliver(&*self.transport, fragment, init, cancel).await {
					Ok(()) => log::info!(
						"posted fragment: index={} name={} duration={:.3} elapsed={:.3}",
						index,
						self.playout.name(),
						self.playout.fragment_secs(index),
						self.playout.elapsed_media(index)
					),
					Err(PushError::Cancelled) => break 'outer,
					Err(err) => return Err(err),
				}

				if cancel.is_cancelled() {
					break 'outer;
				}
			}

			if !self.options.looping {
				break;
			}

			self.playout.rewind()?;
		}

		Ok(())
	}
}
