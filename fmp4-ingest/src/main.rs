use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tokio::sync::oneshot;
use url::Url;

mod chunked;
mod cli;
mod error;
mod event;
mod log;
mod metadata;
mod options;
mod pacing;
mod playout;
mod retry;
mod segmented;
mod supervisor;
mod tls;
mod transport;
mod wallclock;

#[cfg(test)]
mod testing;

use cli::Config;
use options::Options;
use supervisor::Supervisor;
use transport::{BasicAuth, HttpTransport, Transport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let config = Config::parse();
	config.log.init();

	// Every track must load before anything is pushed.
	let mut assets = match supervisor::load(&config.inputs, config.chunked) {
		Ok(assets) => assets,
		Err(err) => {
			::log::error!("{:#}", err);
			Config::command().print_help()?;
			std::process::exit(1);
		}
	};

	let tls = config.tls.load().context("failed to load TLS config")?;
	let client = transport::client(tls).context("failed to create HTTP client")?;

	let mut options = Options::new(&config);

	if let Some(offset) = wallclock::offset(&config, &client).await {
		::log::info!("moving timelines to the wall clock: offset={}", offset);
		supervisor::sync(&mut assets, offset)?;
		options.wallclock_start = offset;
	}

	options.presentation = supervisor::presentation(&assets);
	::log::info!("presentation duration: {:.3}s", options.presentation);

	let options = Arc::new(options);
	let auth = BasicAuth::from_config(&config);

	let connect = move |url: &Url| -> Arc<dyn Transport> {
		Arc::new(HttpTransport::new(client.clone(), url.clone(), auth.clone()))
	};

	let supervisor = Supervisor::start(assets, options, connect).context("failed to start pushers")?;
	supervisor.run(stop(config.daemon)).await
}

// Resolves on Ctrl-C, or when `q` is entered on stdin unless running as a daemon.
async fn stop(daemon: bool) {
	if daemon {
		return ctrl_c().await;
	}

	::log::info!("enter q to stop");

	tokio::select! {
		_ = ctrl_c() => {},
		_ = quit() => {},
	}
}

async fn ctrl_c() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		::log::warn!("failed to listen for ctrl-c: {}", err);
		std::future::pending::<()>().await;
	}
}

async fn quit() {
	let (tx, rx) = oneshot::channel();

	// A plain thread, so a pending read doesn't hold up shutdown.
	std::thread::spawn(move || {
		for line in std::io::stdin().lines() {
			match line {
				Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
					let _ = tx.send(());
					return;
				}
				Ok(_) => continue,
				Err(_) => return,
			}
		}
	});

	// Without stdin, only Ctrl-C can stop us.
	if rx.await.is_err() {
		std::future::pending::<()>().await;
	}
}
