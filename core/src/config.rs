use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use serde::{Deserialize, Serialize};
use sp_core::H256;
use std::{collections::HashSet, fs, path::Path, time::Duration};
use tracing::Level;

use crate::{
	messages::MAX_BLOCKS_IN_RESPONSE,
	types::{duration_millis_format, duration_seconds_format, tracing_level_format, HexHash},
};

/// Representation of the block sync configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
	/// Number of requests issued per tick (default: 3).
	pub num_of_tasks: usize,
	/// Maximum number of blocks requested in one ascending request (default: 128).
	pub request_page_size: u32,
	/// Number of blocks requested when searching for the ancestor of a disjoint fragment (default: 128).
	pub ancestor_search_page: u32,
	/// Number of peers required before the first sync tick (default: 1).
	pub min_peers: usize,
	/// Interval in seconds between block announce handshakes while waiting for peers (default: 2).
	#[serde(with = "duration_seconds_format")]
	pub wait_peers_duration: Duration,
	/// Interval in milliseconds between sync ticks (default: 1000).
	#[serde(with = "duration_millis_format")]
	pub tick_interval: Duration,
	/// Timeout in seconds of a single peer request (default: 20).
	#[serde(with = "duration_seconds_format")]
	pub request_timeout: Duration,
	/// Number of seconds a misbehaving peer is excluded from work (default: 120).
	#[serde(with = "duration_seconds_format")]
	pub punishment_duration: Duration,
	/// Number of tasks queued on a single peer worker (default: 8).
	pub worker_queue_capacity: usize,
	/// Maximum number of disjoint fragments kept in memory (default: 1024).
	pub max_disjoint_fragments: usize,
	/// Hex encoded hashes of blocks known to be bad.
	pub bad_blocks: Vec<HexHash>,
	/// Bootstrap with warp sync before switching to full sync (default: false).
	pub warp_sync_enable: bool,
	/// Log level (default: `INFO`).
	#[serde(with = "tracing_level_format")]
	pub log_level: Level,
	/// If set to true, logs are displayed in JSON format (default: false).
	pub log_format_json: bool,
}

impl Default for SyncConfig {
	fn default() -> Self {
		SyncConfig {
			num_of_tasks: 3,
			request_page_size: MAX_BLOCKS_IN_RESPONSE,
			ancestor_search_page: MAX_BLOCKS_IN_RESPONSE,
			min_peers: 1,
			wait_peers_duration: Duration::from_secs(2),
			tick_interval: Duration::from_millis(1000),
			request_timeout: Duration::from_secs(20),
			punishment_duration: Duration::from_secs(120),
			worker_queue_capacity: 8,
			max_disjoint_fragments: 1024,
			bad_blocks: vec![],
			warp_sync_enable: false,
			log_level: Level::INFO,
			log_format_json: false,
		}
	}
}

impl SyncConfig {
	pub fn bad_blocks(&self) -> HashSet<H256> {
		self.bad_blocks.iter().map(|hash| hash.0).collect()
	}

	/// Rejects values that would stall the engine or exceed protocol limits.
	pub fn validate(&self) -> Result<()> {
		if self.num_of_tasks == 0 {
			return Err(eyre!("num_of_tasks must be greater than zero"));
		}
		if self.request_page_size == 0 || self.request_page_size > MAX_BLOCKS_IN_RESPONSE {
			return Err(eyre!(
				"request_page_size must be between 1 and {MAX_BLOCKS_IN_RESPONSE}"
			));
		}
		if self.ancestor_search_page == 0 || self.ancestor_search_page > MAX_BLOCKS_IN_RESPONSE {
			return Err(eyre!(
				"ancestor_search_page must be between 1 and {MAX_BLOCKS_IN_RESPONSE}"
			));
		}
		if self.worker_queue_capacity == 0 {
			return Err(eyre!("worker_queue_capacity must be greater than zero"));
		}
		Ok(())
	}
}

/// Loads configuration from the given file, falling back to defaults when no path is given.
pub fn load(path: Option<&Path>) -> Result<SyncConfig> {
	let config: SyncConfig = match path {
		Some(path) => {
			fs::metadata(path).map_err(|_| eyre!("Provided config file doesn't exist."))?;
			confy::load_path(path).wrap_err(format!(
				"Failed to load configuration from {}",
				path.display()
			))?
		},
		None => SyncConfig::default(),
	};

	config.validate()?;
	Ok(config)
}
