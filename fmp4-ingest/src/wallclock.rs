use anyhow::Context;
use url::Url;

use crate::cli::Config;

/// Fetch the current epoch seconds from a time server, or 0 if it can't be reached.
pub async fn fetch(client: &reqwest::Client, uri: &Url) -> u64 {
	match try_fetch(client, uri).await {
		Ok(epoch) => epoch,
		Err(err) => {
			log::warn!("failed to fetch wall clock, using 0: uri={} err={:#}", uri, err);
			0
		}
	}
}

async fn try_fetch(client: &reqwest::Client, uri: &Url) -> anyhow::Result<u64> {
	let resp = client.get(uri.clone()).send().await?.error_for_status()?;
	let body = resp.text().await?;
	parse_epoch(&body)
}

pub fn parse_epoch(body: &str) -> anyhow::Result<u64> {
	body.trim()
		.parse::<u64>()
		.with_context(|| format!("invalid epoch seconds: {:?}", body))
}

/// The number of seconds to move every timeline forward, if offset mode is enabled.
///
/// A fixed `--ism-offset` takes precedence over the fetched wall clock.
pub async fn offset(config: &Config, client: &reqwest::Client) -> Option<f64> {
	match config.ism_offset {
		Some(secs) if secs > 0 => Some(secs as f64),
		_ if config.wc_offset => Some(fetch(client, &config.wc_uri).await as f64),
		_ => None,
	}
}
