use color_eyre::{eyre::WrapErr, Result};
use futures::Future;
use tokio::task::JoinHandle;
use tracing::{Instrument, Level, Subscriber};
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt::format, layer::SubscriberExt, EnvFilter, FmtSubscriber};

use crate::config::SyncConfig;

pub fn spawn_in_span<F>(future: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tokio::spawn(future.in_current_span())
}

fn env_filter(log_level: Level) -> EnvFilter {
	EnvFilter::new(format!("block_sync_core={log_level},warn"))
}

pub fn json_subscriber(log_level: Level) -> impl Subscriber + Send + Sync {
	FmtSubscriber::builder()
		.json()
		.with_env_filter(env_filter(log_level))
		.with_span_events(format::FmtSpan::CLOSE)
		.finish()
		.with(ErrorLayer::default())
}

pub fn default_subscriber(log_level: Level) -> impl Subscriber + Send + Sync {
	FmtSubscriber::builder()
		.with_env_filter(env_filter(log_level))
		.with_span_events(format::FmtSpan::CLOSE)
		.finish()
		.with(ErrorLayer::default())
}

/// Installs the global subscriber selected by `log_level` and `log_format_json`.
pub fn init_tracing(config: &SyncConfig) -> Result<()> {
	if config.log_format_json {
		tracing::subscriber::set_global_default(json_subscriber(config.log_level))
			.wrap_err("Unable to set global json subscriber")
	} else {
		tracing::subscriber::set_global_default(default_subscriber(config.log_level))
			.wrap_err("Unable to set global default subscriber")
	}
}

pub fn blake2_256(data: &[u8]) -> [u8; 32] {
	sp_core::blake2_256(data)
}
