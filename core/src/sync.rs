//! Sync strategies and the service driving them.
//!
//! A [`Strategy`] plans requests in [`Strategy::next_actions`] and consumes their results in
//! [`Strategy::process`]. The [`service::SyncService`] runs them on the [`worker_pool::WorkerPool`]
//! one tick at a time.
use color_eyre::Result;
use libp2p::PeerId;

use crate::{
	messages::{BlockAnnounce, BlockAnnounceHandshake, Request, Response},
	network::RequestError,
	reputation::Change,
	telemetry::{StrategyKind, SyncMetrics},
};

pub mod fragments;
pub mod full_sync;
pub mod service;
pub mod warp_sync;
mod worker;
pub mod worker_pool;

/// Request to run on the given peer, or on any available peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncTask {
	pub who: Option<PeerId>,
	pub request: Request,
}

impl SyncTask {
	pub fn new(request: impl Into<Request>) -> Self {
		SyncTask {
			who: None,
			request: request.into(),
		}
	}

	pub fn for_peer(who: PeerId, request: impl Into<Request>) -> Self {
		SyncTask {
			who: Some(who),
			request: request.into(),
		}
	}
}

/// Request paired with the peer it ran on and its outcome.
#[derive(Clone, Debug)]
pub struct SyncTaskResult {
	pub who: Option<PeerId>,
	pub request: Request,
	pub response: Result<Response, RequestError>,
}

impl SyncTaskResult {
	pub fn failed(task: SyncTask, error: RequestError) -> Self {
		SyncTaskResult {
			who: task.who,
			request: task.request,
			response: Err(error),
		}
	}

	pub fn is_completed(&self) -> bool {
		self.response.is_ok()
	}
}

/// Feedback of a processed batch of results.
#[derive(Debug, Default, PartialEq)]
pub struct StrategyOutcome {
	/// Strategy has nothing left to do.
	pub done: bool,
	pub reputation_changes: Vec<Change>,
	/// Peers to punish.
	pub bans: Vec<PeerId>,
}

/// Reaction to a block announce.
#[derive(Debug, Default, PartialEq)]
pub struct AnnounceOutcome {
	/// Announce is worth propagating.
	pub gossip: bool,
	pub rep_change: Option<Change>,
}

pub trait Strategy: Send {
	fn kind(&self) -> StrategyKind;

	fn next_actions(&mut self) -> Result<Vec<SyncTask>>;

	fn process(&mut self, results: Vec<SyncTaskResult>) -> Result<StrategyOutcome>;

	/// Logs progress of the last tick and returns it.
	fn show_metrics(&self) -> SyncMetrics;

	fn on_block_announce_handshake(
		&mut self,
		who: PeerId,
		handshake: &BlockAnnounceHandshake,
	) -> Result<()>;

	fn on_block_announce(&mut self, who: PeerId, announce: &BlockAnnounce)
		-> Result<AnnounceOutcome>;

	fn on_connection_closed(&mut self, who: &PeerId);

	fn is_synced(&self) -> bool;
}
