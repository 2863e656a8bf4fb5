//! Warp sync: follows GRANDPA authority set changes up to the latest finalized block, then
//! fetches that block.
use color_eyre::Result;
use libp2p::PeerId;
use sp_core::H256;
use std::{collections::HashSet, sync::Arc, time::Instant};
use strum::Display;
use tracing::{debug, info, warn};

use super::{
	fragments::validate_results, AnnounceOutcome, Strategy, StrategyOutcome, SyncTask,
	SyncTaskResult,
};
use crate::{
	finality::{WarpProofVerifier, WarpVerificationResult},
	messages::{
		BlockAnnounce, BlockAnnounceHandshake, BlockRequest, Direction, Request, RequestedData,
		Response, WarpProofRequest, WarpProofResponse,
	},
	peer_view::PeerViewSet,
	reputation::{rep, Change},
	telemetry::{StrategyKind, SyncMetrics},
	types::{AuthorityList, BlockData, Header, SetId, ShortHash},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum WarpSyncPhase {
	WarpProof,
	TargetBlock,
	Completed,
}

pub struct WarpSyncStrategy {
	verifier: Arc<dyn WarpProofVerifier>,
	peers: Arc<PeerViewSet>,
	bad_blocks: HashSet<H256>,
	phase: WarpSyncPhase,
	set_id: SetId,
	authorities: AuthorityList,
	last_block: Header,
	result: Option<BlockData>,
	started_at: Instant,
	synced_fragments: usize,
}

struct BestProof {
	response: WarpProofResponse,
	verified: WarpVerificationResult,
}

impl BestProof {
	fn is_beaten_by(&self, response: &WarpProofResponse) -> bool {
		!self.response.is_finished
			&& (response.is_finished || response.fragments > self.response.fragments)
	}
}

impl WarpSyncStrategy {
	/// Starts from a trusted checkpoint, usually genesis, with its authority set.
	pub fn new(
		checkpoint: Header,
		set_id: SetId,
		authorities: AuthorityList,
		verifier: Arc<dyn WarpProofVerifier>,
		peers: Arc<PeerViewSet>,
		bad_blocks: HashSet<H256>,
	) -> Self {
		WarpSyncStrategy {
			verifier,
			peers,
			bad_blocks,
			phase: WarpSyncPhase::WarpProof,
			set_id,
			authorities,
			last_block: checkpoint,
			result: None,
			started_at: Instant::now(),
			synced_fragments: 0,
		}
	}

	pub fn phase(&self) -> WarpSyncPhase {
		self.phase
	}

	/// Finalized target block, available once warp sync completed.
	pub fn result(&self) -> Option<&BlockData> {
		self.result.as_ref()
	}

	fn process_warp_proofs(&mut self, results: Vec<SyncTaskResult>) -> StrategyOutcome {
		let mut outcome = StrategyOutcome::default();
		let mut best: Option<BestProof> = None;

		for result in results {
			let SyncTaskResult { who, response, .. } = result;
			let Ok(response) = response else {
				continue;
			};

			let response = match response {
				Response::WarpProof(response) => response,
				Response::Block(_) => {
					warn!(peer = ?who, "Unexpected response to warp proof request");
					if let Some(who) = who {
						outcome
							.reputation_changes
							.push(Change::new(who, rep::UNEXPECTED_RESPONSE));
						outcome.bans.push(who);
					}
					continue;
				},
			};

			let verified = match self.verifier.verify(
				&response.encoded_proof,
				self.set_id,
				&self.authorities,
			) {
				Ok(verified) => verified,
				Err(error) => {
					warn!(peer = ?who, %error, "Invalid warp proof");
					if let Some(who) = who {
						outcome
							.reputation_changes
							.push(Change::new(who, rep::BAD_WARP_PROOF));
						outcome.bans.push(who);
					}
					continue;
				},
			};

			if best
				.as_ref()
				.map_or(true, |best| best.is_beaten_by(&response))
			{
				best = Some(BestProof { response, verified });
			}
		}

		let Some(BestProof { response, verified }) = best else {
			debug!("No valid warp proof received");
			return outcome;
		};

		self.synced_fragments += response.fragments;
		info!(
			block_number = verified.header.number,
			set_id = verified.set_id,
			fragments = response.fragments,
			completed = verified.completed,
			"Verified warp proof"
		);

		self.last_block = verified.header;
		if verified.completed {
			self.phase = WarpSyncPhase::TargetBlock;
		} else {
			self.set_id = verified.set_id;
			self.authorities = verified.authorities;
		}
		outcome
	}

	fn process_target_block(&mut self, results: Vec<SyncTaskResult>) -> StrategyOutcome {
		let validated = validate_results(results, &self.bad_blocks);
		let target_hash = self.last_block.hash();

		let target = validated
			.responses
			.into_iter()
			.flat_map(|response| response.blocks)
			.find(|block| block.hash == target_hash && block.header.is_some());

		match target {
			Some(block) => {
				info!(
					block_number = self.last_block.number,
					hash = %ShortHash(&target_hash),
					"Warp sync target block received"
				);
				self.result = Some(block);
				self.phase = WarpSyncPhase::Completed;
			},
			None => debug!(hash = %ShortHash(&target_hash), "Target block not received yet"),
		}

		StrategyOutcome {
			done: false,
			reputation_changes: validated.reputation_changes,
			bans: validated.bans,
		}
	}
}

impl Strategy for WarpSyncStrategy {
	fn kind(&self) -> StrategyKind {
		StrategyKind::Warp
	}

	fn next_actions(&mut self) -> Result<Vec<SyncTask>> {
		self.started_at = Instant::now();

		let request: Request = match self.phase {
			WarpSyncPhase::WarpProof => WarpProofRequest {
				begin: self.last_block.hash(),
			}
			.into(),
			WarpSyncPhase::TargetBlock => BlockRequest::new(
				self.last_block.hash(),
				1,
				RequestedData::HEADER | RequestedData::BODY | RequestedData::JUSTIFICATION,
				Direction::Ascending,
			)
			.into(),
			WarpSyncPhase::Completed => return Ok(vec![]),
		};

		Ok(vec![SyncTask::new(request)])
	}

	fn process(&mut self, results: Vec<SyncTaskResult>) -> Result<StrategyOutcome> {
		let mut outcome = match self.phase {
			WarpSyncPhase::WarpProof => self.process_warp_proofs(results),
			WarpSyncPhase::TargetBlock => self.process_target_block(results),
			WarpSyncPhase::Completed => StrategyOutcome::default(),
		};
		outcome.done = self.is_synced();
		Ok(outcome)
	}

	fn show_metrics(&self) -> SyncMetrics {
		let metrics = SyncMetrics {
			elapsed: self.started_at.elapsed(),
			warp_fragments: self.synced_fragments,
			target: self.last_block.number,
			..Default::default()
		};

		info!(
			phase = %self.phase,
			warp_fragments = metrics.warp_fragments,
			elapsed = ?metrics.elapsed,
			target = metrics.target,
			"Warp sync progress"
		);
		metrics
	}

	fn on_block_announce_handshake(
		&mut self,
		who: PeerId,
		handshake: &BlockAnnounceHandshake,
	) -> Result<()> {
		self.peers
			.update(who, handshake.best_block_hash, handshake.best_block_number);
		Ok(())
	}

	fn on_block_announce(
		&mut self,
		who: PeerId,
		announce: &BlockAnnounce,
	) -> Result<AnnounceOutcome> {
		let hash = announce.header().hash();
		debug!(peer = %who, block_number = announce.number, hash = %ShortHash(&hash), "Received block announce");

		if self.bad_blocks.contains(&hash) {
			info!(peer = %who, block_number = announce.number, hash = %ShortHash(&hash), "Bad block announced");
			return Ok(AnnounceOutcome {
				gossip: false,
				rep_change: Some(Change::new(who, rep::BAD_BLOCK_ANNOUNCEMENT)),
			});
		}

		if announce.best_block {
			self.peers.update(who, hash, announce.number);
		}

		Ok(AnnounceOutcome {
			gossip: true,
			rep_change: Some(Change::new(who, rep::GOSSIP_SUCCESS)),
		})
	}

	fn on_connection_closed(&mut self, who: &PeerId) {
		self.peers.remove(who);
	}

	fn is_synced(&self) -> bool {
		self.phase == WarpSyncPhase::Completed
	}
}
