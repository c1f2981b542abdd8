use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::PushError;
use crate::options::Options;
use crate::playout::Playout;
use crate::segmented::{Schedule, SegmentedPusher};
use crate::transport::Transport;

/// Posts a timed metadata track, announcing every fragment ahead of the media it describes.
pub struct MetadataPusher {
	inner: SegmentedPusher,
}

impl MetadataPusher {
	pub fn new(playout: Playout, transport: Arc<dyn Transport>, options: Arc<Options>) -> Self {
		let schedule = Schedule::Lead(options.announce);
		Self {
			inner: SegmentedPusher::new(playout, transport, options, schedule),
		}
	}

	pub async fn run(self, cancel: CancellationToken) -> Result<(), PushError> {
		self.inner.run(cancel).await
	}
}
