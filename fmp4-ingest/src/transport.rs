use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use url::Url;

use crate::cli::Config;
use crate::error::TransportError;

/// Delivers bytes to a single stream on the publishing point.
#[async_trait]
pub trait Transport: Send + Sync {
	fn url(&self) -> &Url;

	/// POST a complete body.
	async fn post(&self, body: Bytes) -> Result<(), TransportError>;

	/// POST a chunked body, sending each chunk as it's received until the channel is closed.
	async fn post_stream(&self, body: mpsc::Receiver<Bytes>) -> Result<(), TransportError>;
}

#[derive(Clone, Debug)]
pub struct BasicAuth {
	pub user: String,
	pub password: String,
}

impl BasicAuth {
	pub fn from_config(config: &Config) -> Option<Self> {
		match (&config.aname, &config.auth) {
			(Some(user), Some(password)) => Some(Self {
				user: user.clone(),
				password: password.clone(),
			}),
			_ => None,
		}
	}
}

/// Build the HTTP/1.1 client shared by every stream.
pub fn client(tls: rustls::ClientConfig) -> Result<reqwest::Client, TransportError> {
	let client = reqwest::Client::builder()
		.use_preconfigured_tls(tls)
		.http1_only()
		.user_agent(concat!("fmp4-ingest/", env!("CARGO_PKG_VERSION")))
		.build()?;

	Ok(client)
}

pub struct HttpTransport {
	client: reqwest::Client,
	url: Url,
	auth: Option<BasicAuth>,
}

impl HttpTransport {
	pub fn new(client: reqwest::Client, url: Url, auth: Option<BasicAuth>) -> Self {
		Self { client, url, auth }
	}

	fn request(&self) -> reqwest::RequestBuilder {
		let request = self.client.post(self.url.clone());
		match &self.auth {
			Some(auth) => request.basic_auth(&auth.user, Some(&auth.password)),
			None => request,
		}
	}

	fn check(resp: reqwest::Response) -> Result<(), TransportError> {
		let status = resp.status();
		if !status.is_success() {
			return Err(TransportError::Status(status));
		}

		Ok(())
	}
}

#[async_trait]
impl Transport for HttpTransport {
	fn url(&self) -> &Url {
		&self.url
	}

	async fn post(&self, body: Bytes) -> Result<(), TransportError> {
		let resp = self.request().body(body).send().await?;
		Self::check(resp)
	}

	async fn post_stream(&self, body: mpsc::Receiver<Bytes>) -> Result<(), TransportError> {
		let stream = ReceiverStream::new(body).map(Ok::<Bytes, std::io::Error>);
		let resp = self.request().body(reqwest::Body::wrap_stream(stream)).send().await?;
		Self::check(resp)
	}
}
