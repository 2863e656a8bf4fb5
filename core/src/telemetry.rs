use libp2p::PeerId;
use std::time::Duration;
use strum::Display;

use crate::{
	reputation::ReputationChange,
	types::{BlockData, BlockNumber},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum StrategyKind {
	#[strum(serialize = "full")]
	Full,
	#[strum(serialize = "warp")]
	Warp,
}

/// Snapshot of sync progress after a tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncMetrics {
	pub synced_blocks: usize,
	pub elapsed: Duration,
	pub queued_requests: usize,
	pub disjoint_fragments: usize,
	pub incomplete_blocks: usize,
	/// Verified warp proof fragments.
	pub warp_fragments: usize,
	pub target: BlockNumber,
}

impl SyncMetrics {
	/// Imported blocks per second.
	pub fn bps(&self) -> f64 {
		let seconds = self.elapsed.as_secs_f64();
		if seconds == 0.0 {
			return 0.0;
		}
		self.synced_blocks as f64 / seconds
	}
}

#[derive(Debug)]
pub enum OutputEvent {
	Metrics(SyncMetrics),
	ReputationReported {
		who: PeerId,
		change: ReputationChange,
	},
	PeerPunished(PeerId),
	StrategySwitched {
		from: StrategyKind,
		to: StrategyKind,
	},
	WarpSyncCompleted(Box<BlockData>),
}
