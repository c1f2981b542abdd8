use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::options::NON_REALTIME_DELAY;

/// Seconds to wait before sending media at `target`, given the `elapsed` wall clock and a lead of `adjust`.
pub fn wait(target: f64, elapsed: f64, adjust: f64) -> f64 {
	(target - elapsed - adjust).max(0.0)
}

/// Paces a pusher against the wall clock, measured from its last reset.
#[derive(Debug)]
pub struct Pacer {
	start: Instant,
	realtime: bool,
}

impl Pacer {
	pub fn new(realtime: bool) -> Self {
		Self {
			start: Instant::now(),
			realtime,
		}
	}

	pub fn reset(&mut self) {
		self.start = Instant::now();
	}

	pub fn elapsed(&self) -> f64 {
		self.start.elapsed().as_secs_f64()
	}

	/// How long to sleep before sending media at `target` seconds, optionally capped at `cap` seconds.
	///
	/// Outside of realtime mode this is always [NON_REALTIME_DELAY].
	pub fn delay(&self, target: f64, adjust: f64, cap: Option<f64>) -> Duration {
		if !self.realtime {
			return NON_REALTIME_DELAY;
		}

		let mut secs = wait(target, self.elapsed(), adjust);
		if let Some(cap) = cap {
			secs = secs.min(cap.max(0.0));
		}

		Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
	}
}

/// Sleep unless cancelled first, returning false if cancelled.
pub async fn sleep(delay: Duration, cancel: &CancellationToken) -> bool {
	if delay.is_zero() {
		return !cancel.is_cancelled();
	}

	tokio::select! {
		_ = tokio::time::sleep(delay) => true,
		_ = cancel.cancelled() => false,
	}
}
