use bytes::Bytes;
use fmp4_stream::sparse::EMPTY_MFRA;
use tokio_util::sync::CancellationToken;

use crate::error::PushError;
use crate::options::{RETRY_DELAY, RETRY_LIMIT};
use crate::pacing;
use crate::transport::Transport;

/// POST the init segment once, making sure the publishing point accepts the stream before pacing starts.
pub async fn probe(transport: &dyn Transport, init: Bytes) -> Result<(), PushError> {
	if let Err(err) = transport.post(init).await {
		log::error!("failed to post init segment: url={} err={}", transport.url(), err);
		return Err(err.into());
	}

	log::info!("posted init segment: url={}", transport.url());
	Ok(())
}

/// POST `payload` until it's accepted, resending `init` before every retry.
///
/// Gives up after [RETRY_LIMIT] failed attempts.
pub async fn deliver(
	transport: &dyn Transport,
	payload: Bytes,
	init: &Bytes,
	cancel: &CancellationToken,
) -> Result<(), PushError> {
	let mut failures = 0;

	loop {
		let err = match transport.post(payload.clone()).await {
			Ok(()) => return Ok(()),
			Err(err) => err,
		};

		failures += 1;
		log::warn!(
			"failed to post fragment: url={} attempt={} err={}",
			transport.url(),
			failures,
			err
		);

		if failures >= RETRY_LIMIT {
			log::error!("giving up on stream: url={} attempts={}", transport.url(), failures);
			return Err(PushError::RetriesExhausted(failures));
		}

		// The publishing point may have dropped the stream, so announce it again.
		if let Err(err) = transport.post(init.clone()).await {
			log::warn!("failed to resend init segment: url={} err={}", transport.url(), err);
		}

		if !pacing::sleep(RETRY_DELAY, cancel).await {
			return Err(PushError::Cancelled);
		}
	}
}

/// Tell the publishing point the stream has ended, if requested.
pub async fn close(transport: &dyn Transport, close_pp: bool) {
	if !close_pp {
		return;
	}

	match transport.post(Bytes::from_static(&EMPTY_MFRA)).await {
		Ok(()) => log::info!("closed stream: url={}", transport.url()),
		Err(err) => log::warn!("failed to close stream: url={} err={}", transport.url(), err),
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;
	use std::time::Duration;

	use tokio::time::Instant;

	use super::*;
	use crate::testing;
	use crate::transport::mock::MockTransport;

	const INIT: Bytes = Bytes::from_static(b"init");
	const FRAGMENT: Bytes = Bytes::from_static(b"fragment");

	#[tokio::test(start_paused = true)]
	async fn gives_up_after_limit() {
		let (mock, transport) = testing::mock(MockTransport::failing(|body| body == &FRAGMENT));
		let cancel = CancellationToken::new();

		let res = deliver(&*transport, FRAGMENT, &INIT, &cancel).await;
		assert!(matches!(res, Err(PushError::RetriesExhausted(10))));

		let posts = mock.posts();
		assert_eq!(posts.iter().filter(|body| *body == &FRAGMENT).count(), 10);
		assert_eq!(posts.iter().filter(|body| *body == &INIT).count(), 9);
		assert_eq!(posts.last(), Some(&FRAGMENT));
	}

	#[tokio::test(start_paused = true)]
	async fn resends_init_then_fragment() {
		let remaining = Arc::new(AtomicUsize::new(3));
		let failures = remaining.clone();
		let (mock, transport) = testing::mock(MockTransport::failing(move |body| {
			body == &FRAGMENT
				&& failures
					.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
					.is_ok()
		}));

		let cancel = CancellationToken::new();
		let start = Instant::now();

		deliver(&*transport, FRAGMENT, &INIT, &cancel).await.unwrap();

		let expected = vec![FRAGMENT, INIT, FRAGMENT, INIT, FRAGMENT, INIT, FRAGMENT];
		assert_eq!(mock.posts(), expected);
		assert_eq!(remaining.load(Ordering::SeqCst), 0);

		// One retry delay after each of the three failures.
		assert!(start.elapsed() >= RETRY_DELAY * 3);
		assert!(start.elapsed() < RETRY_DELAY * 3 + Duration::from_millis(100));
	}

	#[tokio::test(start_paused = true)]
	async fn cancelled_during_retry() {
		let (mock, transport) = testing::mock(MockTransport::failing(|_| true));
		let cancel = CancellationToken::new();
		cancel.cancel();

		let res = deliver(&*transport, FRAGMENT, &INIT, &cancel).await;
		assert!(matches!(res, Err(PushError::Cancelled)));
		assert_eq!(mock.posts(), vec![FRAGMENT, INIT]);
	}

	#[tokio::test]
	async fn close_posts_mfra() {
		let (mock, transport) = testing::mock(MockTransport::new());

		close(&*transport, false).await;
		assert!(mock.posts().is_empty());

		close(&*transport, true).await;
		assert_eq!(mock.posts(), vec![Bytes::from_static(&EMPTY_MFRA)]);
	}

	#[tokio::test]
	async fn probe_fails() {
		let (_, transport) = testing::mock(MockTransport::failing(|_| true));
		assert!(matches!(probe(&*transport, INIT).await, Err(PushError::Transport(_))));
	}
}
