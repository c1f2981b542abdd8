use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
	#[error("http error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("unexpected status: {0}")]
	Status(StatusCode),

	#[error("body closed")]
	Closed,
}

/// Why a pusher stopped early.
#[derive(Error, Debug)]
pub enum PushError {
	#[error("transport error: {0}")]
	Transport(#[from] TransportError),

	#[error("giving up after {0} failed attempts")]
	RetriesExhausted(usize),

	#[error("stream error: {0}")]
	Stream(#[from] fmp4_stream::Error),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	#[error("invalid url: {0}")]
	Url(#[from] url::ParseError),

	#[error("task failed: {0}")]
	Join(#[from] tokio::task::JoinError),

	#[error("cancelled")]
	Cancelled,
}
