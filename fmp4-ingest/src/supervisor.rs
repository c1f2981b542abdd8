use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use fmp4_stream::{IngestStream, TimelinePatch};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::chunked::ChunkedPusher;
use crate::error::PushError;
use crate::event::EventPusher;
use crate::metadata::MetadataPusher;
use crate::options::{Options, EVENT_STREAM};
use crate::playout::Playout;
use crate::segmented::{Schedule, SegmentedPusher};
use crate::transport::Transport;

/// How a track is pushed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
	Chunked,
	Segmented,
	Metadata,
}

impl Kind {
	pub fn detect(path: &Path, chunked: bool) -> Self {
		match path.extension().and_then(|ext| ext.to_str()) {
			Some(ext) if ext.eq_ignore_ascii_case("cmfm") => Self::Metadata,
			_ if chunked => Self::Chunked,
			_ => Self::Segmented,
		}
	}
}

pub struct Asset {
	pub name: String,
	pub stream: IngestStream,
	pub kind: Kind,
}

impl Asset {
	pub fn load(path: &Path, chunked: bool) -> anyhow::Result<Self> {
		let name = path
			.file_name()
			.and_then(|name| name.to_str())
			.context("invalid file name")?
			.to_string();

		let stream = IngestStream::open(path).with_context(|| format!("failed to load {}", path.display()))?;

		log::info!(
			"loaded track: name={} fragments={} timescale={} duration={:.3}",
			name,
			stream.len(),
			stream.timescale(),
			stream.duration_secs()
		);

		Ok(Self {
			name,
			stream,
			kind: Kind::detect(path, chunked),
		})
	}
}

pub fn load(inputs: &[PathBuf], chunked: bool) -> anyhow::Result<Vec<Asset>> {
	inputs.iter().map(|path| Asset::load(path, chunked)).collect()
}

/// The longest track, which every pusher uses as its loop period.
pub fn presentation(assets: &[Asset]) -> f64 {
	assets
		.iter()
		.map(|asset| asset.stream.duration_secs())
		.fold(0.0, f64::max)
}

/// Move every timeline forward by `offset` seconds.
pub fn sync(assets: &mut [Asset], offset: f64) -> anyhow::Result<()> {
	for asset in assets {
		asset
			.stream
			.patch(TimelinePatch::Seconds(offset))
			.with_context(|| format!("failed to move timeline: name={}", asset.name))?;
	}

	Ok(())
}

type Outcome = (String, Result<(), PushError>);

/// Runs one pusher per track, plus the event pusher, until they finish or are told to stop.
pub struct Supervisor {
	tasks: JoinSet<Outcome>,
	cancel: CancellationToken,
}

impl Supervisor {
	pub fn start<F>(assets: Vec<Asset>, options: Arc<Options>, connect: F) -> Result<Self, PushError>
	where
		F: Fn(&Url) -> Arc<dyn Transport>,
	{
		let cancel = CancellationToken::new();
		let mut tasks = JoinSet::new();

		for Asset { name, stream, kind } in assets {
			let url = options.stream_url(&name)?;
			log::info!("starting pusher: name={} kind={:?} url={}", name, kind, url);

			let transport = connect(&url);
			let playout = Playout::new(stream, &name, &options);
			let options = options.clone();
			let cancel = cancel.clone();

			match kind {
				Kind::Chunked => {
					let pusher = ChunkedPusher::new(playout, transport, options);
					tasks.spawn(async move { (name, pusher.run(cancel).await) });
				}
				Kind::Segmented => {
					let pusher = SegmentedPusher::new(playout, transport, options, Schedule::Capped);
					tasks.spawn(async move { (name, pusher.run(cancel).await) });
				}
				Kind::Metadata => {
					let pusher = MetadataPusher::new(playout, transport, options);
					tasks.spawn(async move { (name, pusher.run(cancel).await) });
				}
			}
		}

		if let Some(avail) = options.avail {
			let url = options.stream_url(EVENT_STREAM)?;
			log::info!(
				"starting event pusher: interval={} duration={} url={}",
				avail.interval,
				avail.duration,
				url
			);

			let pusher = EventPusher::new(avail, connect(&url), options.clone());
			let cancel = cancel.clone();
			tasks.spawn(async move { (EVENT_STREAM.to_string(), pusher.run(cancel).await) });
		}

		Ok(Self { tasks, cancel })
	}

	/// Wait until every pusher is done, or until `stop` resolves and then for every pusher to exit.
	pub async fn run<S: Future<Output = ()>>(mut self, stop: S) -> anyhow::Result<()> {
		tokio::pin!(stop);

		loop {
			tokio::select! {
				_ = &mut stop => break,
				res = self.tasks.join_next() => match res {
					Some(res) => Self::report(res),
					None => {
						log::info!("every pusher is done");
						return Ok(());
					}
				},
			}
		}

		log::info!("stopping pushers: remaining={}", self.tasks.len());
		self.cancel.cancel();

		while let Some(res) = self.tasks.join_next().await {
			Self::report(res);
		}

		Ok(())
	}

	fn report(res: Result<Outcome, JoinError>) {
		match res {
			Ok((name, Ok(()))) => log::info!("pusher done: name={}", name),
			Ok((name, Err(err))) => log::error!("pusher failed: name={} err={}", name, err),
			Err(err) => log::error!("pusher failed: {}", PushError::from(err)),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;
	use std::time::Duration;

	use super::*;
	use crate::testing;
	use crate::transport::mock::MockTransport;

	type Connected = Arc<Mutex<Vec<(Url, Arc<MockTransport>)>>>;

	fn connector(connected: Connected) -> impl Fn(&Url) -> Arc<dyn Transport> {
		move |url: &Url| -> Arc<dyn Transport> {
			let mock = Arc::new(MockTransport::new());
			connected.lock().unwrap().push((url.clone(), mock.clone()));
			mock
		}
	}

	fn asset(name: &str, count: usize, kind: Kind) -> Asset {
		Asset {
			name: name.to_string(),
			stream: testing::asset(0, count, 2000),
			kind,
		}
	}

	#[test]
	fn detect_kind() {
		assert_eq!(Kind::detect(Path::new("a/video.cmfv"), false), Kind::Segmented);
		assert_eq!(Kind::detect(Path::new("a/video.cmfv"), true), Kind::Chunked);
		assert_eq!(Kind::detect(Path::new("meta.cmfm"), true), Kind::Metadata);
		assert_eq!(Kind::detect(Path::new("META.CMFM"), false), Kind::Metadata);
		assert_eq!(Kind::detect(Path::new("noext"), false), Kind::Segmented);
	}

	#[test]
	fn presentation_is_longest() {
		let assets = vec![asset("a.cmfv", 5, Kind::Segmented), asset("b.cmfa", 3, Kind::Segmented)];
		assert_eq!(presentation(&assets), 10.0);
		assert_eq!(presentation(&[]), 0.0);
	}

	#[test]
	fn sync_moves_timelines() {
		let mut assets = vec![asset("a.cmfv", 5, Kind::Segmented), asset("b.cmfa", 3, Kind::Segmented)];
		sync(&mut assets, 1_700_000_000.0).unwrap();

		for asset in &assets {
			assert_eq!(asset.stream.start_time(), 1_700_000_000_000);
		}
		assert_eq!(assets[1].stream.duration(), 6000);
	}

	#[test]
	fn load_fails_on_missing_file() {
		let res = load(&[PathBuf::from("/nonexistent/video.cmfv")], false);
		assert!(res.is_err());
	}

	#[tokio::test(start_paused = true)]
	async fn stops_every_pusher() {
		let connected = Connected::default();
		let options = testing::options(&["--avail", "2000", "1000"], 10.0);
		let assets = vec![
			asset("video.cmfv", 5, Kind::Chunked),
			asset("audio.cmfa", 5, Kind::Segmented),
			asset("meta.cmfm", 5, Kind::Metadata),
		];

		let supervisor = Supervisor::start(assets, options, connector(connected.clone())).unwrap();
		supervisor
			.run(tokio::time::sleep(Duration::from_millis(1250)))
			.await
			.unwrap();

		let connected = connected.lock().unwrap();
		let paths: Vec<&str> = connected.iter().map(|(url, _)| url.path()).collect();
		assert_eq!(
			paths,
			vec![
				"/live/video.isml/video.ism/Streams(video.cmfv)",
				"/live/video.isml/video.ism/Streams(audio.cmfa)",
				"/live/video.isml/video.ism/Streams(meta.cmfm)",
				"/live/video.isml/video.ism/Streams(emsg.cmfm)",
			]
		);

		// The chunked pusher streams, everything else posts: the probe and two fragments or events each.
		assert_eq!(connected[0].1.streams().len(), 1);
		for (_, mock) in &connected[1..] {
			assert_eq!(mock.posts().len(), 3);
		}
	}

	#[tokio::test(start_paused = true)]
	async fn finishes_without_stop() {
		let connected = Connected::default();
		let options = testing::options(&["--loop", "false"], 4.0);
		let assets = vec![asset("a.cmfv", 2, Kind::Segmented), asset("b.cmfv", 2, Kind::Chunked)];

		let supervisor = Supervisor::start(assets, options, connector(connected.clone())).unwrap();
		supervisor.run(std::future::pending()).await.unwrap();

		let connected = connected.lock().unwrap();
		assert_eq!(connected[0].1.posts().len(), 3);
		assert_eq!(connected[1].1.streams()[0].len(), 3);
	}
}
