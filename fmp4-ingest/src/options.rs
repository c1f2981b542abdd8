use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::cli::Config;

/// Sleep between fragments when not pacing against the wall clock.
pub const NON_REALTIME_DELAY: Duration = Duration::from_millis(500);

/// Sleep between attempts to deliver a fragment.
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Give up on a fragment after this many failed attempts.
pub const RETRY_LIMIT: usize = 10;

/// Events are sent this many seconds earlier, on top of the announce time.
pub const EVENT_LEAD: f64 = 5.0;

pub const EVENT_TRACK_ID: u32 = 99;
pub const EVENT_TIMESCALE: u32 = 1000;
pub const EVENT_STREAM: &str = "emsg.cmfm";

pub const SCTE35_SCHEME: &str = "urn:scte:scte35:2013:bin";
pub const SPARSE_SCHEME: &str = "urn:mpeg:dash:event:2012";

/// The maximum size of each chunk in a chunked POST.
pub const CHUNK_SIZE: usize = 16 * 1024;

/// A SCTE-35 avail, in units of [EVENT_TIMESCALE].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Avail {
	pub interval: u64,
	pub duration: u64,
}

/// Everything a pusher needs to know, frozen before the first pusher starts.
#[derive(Clone, Debug)]
pub struct Options {
	pub url: Url,
	pub realtime: bool,
	pub looping: bool,
	pub close_pp: bool,
	pub announce: f64,
	pub avail: Option<Avail>,
	pub emsg_dump: Option<PathBuf>,

	/// The longest track duration in seconds, used as the loop period by every pusher.
	pub presentation: f64,

	/// Seconds added to the timeline to line it up with the wall clock.
	pub wallclock_start: f64,
}

impl Options {
	pub fn new(config: &Config) -> Self {
		let avail = config.avail.as_deref().and_then(|avail| match avail {
			[interval, duration] if *interval > 0 => Some(Avail {
				interval: *interval,
				duration: *duration,
			}),
			_ => None,
		});

		Self {
			url: config.url.clone(),
			realtime: config.realtime,
			looping: config.looping,
			close_pp: config.close_pp,
			announce: config.announce,
			avail,
			emsg_dump: config.emsg_dump.clone(),
			presentation: 0.0,
			wallclock_start: 0.0,
		}
	}

	/// The URL a track is posted to, named after its file.
	pub fn stream_url(&self, name: &str) -> Result<Url, url::ParseError> {
		let base = self.url.as_str().trim_end_matches('/');
		Url::parse(&format!("{}/Streams({})", base, name))
	}
}
