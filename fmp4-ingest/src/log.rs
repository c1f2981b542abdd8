use log::LevelFilter;

use crate::cli::LogArgs;

impl LogArgs {
	pub fn level(&self) -> LevelFilter {
		// Default to INFO, go up or down based on -q or -v counts
		match self.verbose {
			0 => match self.quiet {
				0 => LevelFilter::Info,
				1 => LevelFilter::Error,
				_ => LevelFilter::Off,
			},
			1 => LevelFilter::Debug,
			_ => LevelFilter::Trace,
		}
	}

	pub fn init(&self) {
		env_logger::Builder::new()
			.filter_level(self.level()) // Default to our -q/-v args
			.filter_module("h2", LevelFilter::Warn)
			.filter_module("hyper", LevelFilter::Warn)
			.filter_module("rustls", LevelFilter::Warn)
			.filter_module("reqwest", LevelFilter::Warn)
			.parse_default_env() // Allow overriding with RUST_LOG
			.init();

		// Some dependencies emit tracing events instead; only surface the warnings.
		let tracer = tracing_subscriber::FmtSubscriber::builder()
			.with_writer(std::io::stderr)
			.with_max_level(tracing::Level::WARN)
			.finish();

		if let Err(err) = tracing::subscriber::set_global_default(tracer) {
			log::warn!("failed to install tracing subscriber: {}", err);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn verbosity() {
		let level = |verbose, quiet| LogArgs { verbose, quiet }.level();

		assert_eq!(level(0, 0), LevelFilter::Info);
		assert_eq!(level(1, 0), LevelFilter::Debug);
		assert_eq!(level(3, 0), LevelFilter::Trace);
		assert_eq!(level(0, 1), LevelFilter::Error);
		assert_eq!(level(0, 2), LevelFilter::Off);
	}
}
