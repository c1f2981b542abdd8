use clap::Parser;
use std::path;
use url::Url;

/// Push stored CMAF tracks to a live publishing point, as if a live encoder were producing them.
#[derive(Parser, Clone, Debug)]
#[command(name = "fmp4-ingest", version)]
pub struct Config {
	/// The publishing point; every track is posted to `<url>/Streams(<file name>)`.
	#[arg(short, long, default_value = "http://localhost/live/video.isml/video.ism")]
	pub url: Url,

	/// Pace fragments against the wall clock instead of sending as fast as possible.
	#[arg(short, long)]
	pub realtime: bool,

	/// Loop the tracks forever, rewriting the timeline on every pass.
	#[arg(long = "loop", default_value_t = true, action = clap::ArgAction::Set)]
	pub looping: bool,

	/// Don't read commands from stdin; stop on Ctrl-C only.
	#[arg(long)]
	pub daemon: bool,

	/// Move the timeline forward to the current wall clock time, fetched from `wc_uri`.
	#[arg(long)]
	pub wc_offset: bool,

	/// Fetch the wall clock from this URI, which returns decimal epoch seconds.
	#[arg(long, default_value = "http://time.akamai.com")]
	pub wc_uri: Url,

	/// Move the timeline forward by a fixed number of seconds, instead of fetching the wall clock.
	#[arg(long, value_name = "SECS")]
	pub ism_offset: Option<u64>,

	/// Post an empty `mfra` box when a track stops, closing the publishing point.
	#[arg(long)]
	pub close_pp: bool,

	/// Use one long running chunked POST per track instead of a POST per fragment.
	#[arg(long)]
	pub chunked: bool,

	/// Insert a SCTE-35 avail every INTERVAL milliseconds, lasting DURATION milliseconds.
	#[arg(long, num_args = 2, value_names = ["INTERVAL", "DURATION"])]
	pub avail: Option<Vec<u64>>,

	/// Send timed metadata this many seconds ahead of the media it describes.
	#[arg(long, default_value_t = 60.0, value_name = "SECS")]
	pub announce: f64,

	/// The basic authentication user name.
	#[arg(long, requires = "auth")]
	pub aname: Option<String>,

	/// The basic authentication password.
	#[arg(long, requires = "aname")]
	pub auth: Option<String>,

	/// The TLS configuration.
	#[command(flatten)]
	pub tls: TlsArgs,

	/// Also write the sparse init segment and every emsg fragment to this file.
	#[arg(long, value_name = "PATH")]
	pub emsg_dump: Option<path::PathBuf>,

	/// The log configuration.
	#[command(flatten)]
	pub log: LogArgs,

	/// The CMAF track files to push (.cmfv, .cmfa, .cmft or .cmfm).
	#[arg(required = true, num_args = 1..)]
	pub inputs: Vec<path::PathBuf>,
}

#[derive(Parser, Clone, Debug, Default)]
#[group(id = "tls")]
pub struct TlsArgs {
	/// Authenticate with the client certificate at this path, encoded as PEM.
	#[arg(long = "tls-cert", requires = "key")]
	pub cert: Option<path::PathBuf>,

	/// The private key for the client certificate, encoded as PEM.
	#[arg(long = "tls-key", requires = "cert")]
	pub key: Option<path::PathBuf>,

	/// Decrypt an encrypted PKCS#8 private key with this passphrase.
	#[arg(long = "tls-key-pass", requires = "key")]
	pub key_pass: Option<String>,

	/// Use the TLS root at this path, encoded as PEM.
	///
	/// This value can be provided multiple times for multiple roots.
	/// If this is empty, system roots will be used instead
	#[arg(long = "tls-root")]
	pub root: Vec<path::PathBuf>,

	/// Danger: Disable TLS certificate verification.
	///
	/// Useful for test endpoints with self-signed certificates, never in production.
	#[arg(long = "tls-disable-verify")]
	pub disable_verify: bool,
}

#[derive(Parser, Clone, Debug, Default)]
pub struct LogArgs {
	#[arg(long, short, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[arg(long, short, action = clap::ArgAction::Count, conflicts_with = "verbose")]
	pub quiet: u8,
}
