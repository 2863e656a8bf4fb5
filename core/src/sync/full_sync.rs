//! Steady state sync: chases the best block advertised by peers and reacts to announces.
use color_eyre::{eyre::eyre, Result};
use libp2p::PeerId;
use sp_core::H256;
use std::{
	collections::{HashSet, VecDeque},
	sync::Arc,
	time::Instant,
};
use tracing::{debug, error, info};

use super::{
	fragments::{
		merge_fragments, sort_fragments, valid_blocks_under, validate_results, Validated,
	},
	AnnounceOutcome, Strategy, StrategyOutcome, SyncTask, SyncTaskResult,
};
use crate::{
	config::SyncConfig,
	import::BlockImporter,
	messages::{
		ascending_block_requests, BlockAnnounce, BlockAnnounceHandshake, BlockRequest, Direction,
		RequestedData,
	},
	peer_view::PeerViewSet,
	reputation::{rep, Change},
	state::BlockState,
	telemetry::{StrategyKind, SyncMetrics},
	types::{BlockNumber, BlockOrigin, ShortHash},
	unready_blocks::{Fragment, UnreadyBlocks},
};

pub struct FullSyncStrategy {
	state: Arc<dyn BlockState>,
	importer: Arc<dyn BlockImporter>,
	peers: Arc<PeerViewSet>,
	unready_blocks: UnreadyBlocks,
	request_queue: VecDeque<BlockRequest>,
	bad_blocks: HashSet<H256>,
	num_of_tasks: usize,
	request_page_size: u32,
	ancestor_search_page: u32,
	started_at: Instant,
	synced_blocks: usize,
}

impl FullSyncStrategy {
	pub fn new(
		config: &SyncConfig,
		state: Arc<dyn BlockState>,
		importer: Arc<dyn BlockImporter>,
		peers: Arc<PeerViewSet>,
	) -> Self {
		FullSyncStrategy {
			state,
			importer,
			peers,
			unready_blocks: UnreadyBlocks::new(config.max_disjoint_fragments),
			request_queue: VecDeque::new(),
			bad_blocks: config.bad_blocks(),
			num_of_tasks: config.num_of_tasks.max(1),
			request_page_size: config.request_page_size,
			ancestor_search_page: config.ancestor_search_page,
			started_at: Instant::now(),
			synced_blocks: 0,
		}
	}

	pub fn queued_requests(&self) -> usize {
		self.request_queue.len()
	}

	fn finalized_number(&self) -> Result<BlockNumber> {
		Ok(self.state.highest_finalized_header()?.number)
	}

	fn parent_is_known(&self, fragment: &Fragment) -> Result<bool> {
		match fragment.first().and_then(|block| block.parent_hash()) {
			Some(parent_hash) => self.state.has_header(&parent_hash),
			None => Ok(false),
		}
	}

	fn block_already_tracked(&self, hash: &H256, number: BlockNumber) -> bool {
		self.unready_blocks.is_incomplete(hash)
			|| self.unready_blocks.in_disjoint_fragment(hash, number)
	}

	/// Turns validated responses into candidate chains.
	///
	/// Header-bearing chains extend a stored fragment when they are its ancestry, header-less
	/// responses complete announced blocks.
	fn candidates(&self, validated: Validated, finalized: BlockNumber) -> Vec<Fragment> {
		let mut candidates = Vec::with_capacity(validated.responses.len());

		for response in validated.responses {
			if !response.request.requests(RequestedData::HEADER) {
				let completed = self.unready_blocks.update_incomplete_blocks(response.blocks);
				candidates.extend(completed.into_iter().map(|block| vec![block]));
				continue;
			}

			if response.blocks.is_empty() {
				continue;
			}

			match self.unready_blocks.update_disjoint_fragments(&response.blocks) {
				Some(merged) => {
					let merged = valid_blocks_under(finalized, merged);
					if !merged.is_empty() {
						candidates.push(merged);
					}
				},
				None => candidates.push(response.blocks),
			}
		}

		candidates
	}

	fn import_fragment(&mut self, fragment: Fragment) -> Result<()> {
		for block in fragment {
			if self
				.importer
				.import_block(&block, BlockOrigin::NetworkInitialSync)?
			{
				self.synced_blocks += 1;
			}
		}
		Ok(())
	}

	/// Stores a fragment with unknown parent and asks peers for its ancestry.
	fn start_ancestor_search(&mut self, fragment: Fragment) {
		let Some(first) = fragment.first() else {
			return;
		};
		let (Some(number), Some(parent_hash)) = (first.number(), first.parent_hash()) else {
			return;
		};
		let hash = first.hash;

		if !self.unready_blocks.new_disjoint_fragment(fragment) {
			return;
		}

		// Also queued when the fragment was already stored.
		let request = BlockRequest::new(
			parent_hash,
			self.ancestor_search_page,
			RequestedData::BOOTSTRAP,
			Direction::Descending,
		);
		if self.request_queue.contains(&request) {
			return;
		}

		info!(
			block_number = number,
			hash = %ShortHash(&hash),
			parent = %ShortHash(&parent_hash),
			"Starting ancestor search"
		);
		self.request_queue.push_back(request);
	}
}

impl Strategy for FullSyncStrategy {
	fn kind(&self) -> StrategyKind {
		StrategyKind::Full
	}

	fn next_actions(&mut self) -> Result<Vec<SyncTask>> {
		self.started_at = Instant::now();
		self.synced_blocks = 0;

		let queued = self.request_queue.len().min(self.num_of_tasks);
		let mut requests: Vec<BlockRequest> = self.request_queue.drain(..queued).collect();
		if requests.len() >= self.num_of_tasks {
			return Ok(requests.into_iter().map(SyncTask::new).collect());
		}

		let target = self.peers.target();
		let best = self.state.best_block_number()?;
		if best >= target {
			return Ok(requests.into_iter().map(SyncTask::new).collect());
		}

		let start = best + 1;
		let span = (self.num_of_tasks as u32).saturating_mul(self.request_page_size.saturating_sub(1).max(1));
		let end = target.min(start.saturating_add(span).saturating_sub(1));
		requests.extend(ascending_block_requests(
			start,
			end,
			self.request_page_size,
			RequestedData::BOOTSTRAP,
		));

		debug!(start, end, target, requests = requests.len(), "Requesting blocks");
		Ok(requests.into_iter().map(SyncTask::new).collect())
	}

	fn process(&mut self, results: Vec<SyncTaskResult>) -> Result<StrategyOutcome> {
		let validated = validate_results(results, &self.bad_blocks);
		let reputation_changes = validated.reputation_changes.clone();
		let bans = validated.bans.clone();
		debug!(valid_responses = validated.responses.len(), "Evaluating task results");

		let mut finalized = self.finalized_number()?;
		let mut candidates = self.candidates(validated, finalized);
		sort_fragments(&mut candidates);

		let mut importable = vec![];
		let mut disjoint = vec![];
		for fragment in merge_fragments(candidates) {
			let fragment = valid_blocks_under(finalized, fragment);
			if fragment.is_empty() {
				continue;
			}
			if self.parent_is_known(&fragment)? {
				importable.push(fragment);
			} else {
				disjoint.push(fragment);
			}
		}

		debug!(
			importable = importable.len(),
			disjoint = disjoint.len(),
			"Classified fragments"
		);

		while !importable.is_empty() || !disjoint.is_empty() {
			for fragment in std::mem::take(&mut importable) {
				self.import_fragment(fragment)?;
			}

			finalized = self.finalized_number()?;

			for fragment in std::mem::take(&mut disjoint) {
				let fragment = valid_blocks_under(finalized, fragment);
				let Some(first_number) = fragment.first().and_then(|block| block.number()) else {
					continue;
				};

				if self.parent_is_known(&fragment)? {
					importable.push(fragment);
				} else if first_number.saturating_sub(1) <= finalized {
					debug!(block_number = first_number, "Discarding fragment of a stale fork");
				} else {
					self.start_ancestor_search(fragment);
				}
			}
		}

		self.unready_blocks.remove_irrelevant_fragments(finalized);

		Ok(StrategyOutcome {
			done: false,
			reputation_changes,
			bans,
		})
	}

	fn show_metrics(&self) -> SyncMetrics {
		let metrics = SyncMetrics {
			synced_blocks: self.synced_blocks,
			elapsed: self.started_at.elapsed(),
			queued_requests: self.request_queue.len(),
			disjoint_fragments: self.unready_blocks.disjoint_fragments_len(),
			incomplete_blocks: self.unready_blocks.incomplete_blocks_len(),
			warp_fragments: 0,
			target: self.peers.target(),
		};

		info!(
			synced_blocks = metrics.synced_blocks,
			bps = metrics.bps(),
			elapsed = ?metrics.elapsed,
			queued_requests = metrics.queued_requests,
			disjoint_fragments = metrics.disjoint_fragments,
			incomplete_blocks = metrics.incomplete_blocks,
			target = metrics.target,
			"Full sync progress"
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
		if self.state.is_paused() {
			return Err(eyre!("Block state is paused"));
		}

		let header = announce.header();
		let hash = header.hash();
		let number = header.number;
		debug!(peer = %who, block_number = number, hash = %ShortHash(&hash), best_block = announce.best_block, "Received block announce");

		if self.bad_blocks.contains(&hash) {
			info!(peer = %who, block_number = number, hash = %ShortHash(&hash), "Bad block announced");
			return Ok(AnnounceOutcome {
				gossip: false,
				rep_change: Some(Change::new(who, rep::BAD_BLOCK_ANNOUNCEMENT)),
			});
		}

		if announce.best_block {
			self.peers.update(who, hash, number);
		}

		if number <= self.finalized_number()? || self.block_already_tracked(&hash, number) {
			debug!(block_number = number, hash = %ShortHash(&hash), "Announced block is not relevant");
			return Ok(AnnounceOutcome {
				gossip: false,
				rep_change: Some(Change::new(who, rep::NOT_RELEVANT_BLOCK_ANNOUNCE)),
			});
		}

		let best = self.state.best_block_number()?;
		if number > best.saturating_add(self.request_page_size) {
			return Ok(AnnounceOutcome {
				gossip: true,
				rep_change: None,
			});
		}

		if self.state.has_header(&hash)? {
			return Ok(AnnounceOutcome {
				gossip: true,
				rep_change: Some(Change::new(who, rep::NOT_RELEVANT_BLOCK_ANNOUNCE)),
			});
		}

		info!(block_number = number, hash = %ShortHash(&hash), "Requesting announced block body");
		self.unready_blocks.new_incomplete_block(header);
		self.request_queue.push_back(BlockRequest::new(
			hash,
			1,
			RequestedData::BODY | RequestedData::JUSTIFICATION,
			Direction::Ascending,
		));

		Ok(AnnounceOutcome {
			gossip: true,
			rep_change: Some(Change::new(who, rep::GOSSIP_SUCCESS)),
		})
	}

	fn on_connection_closed(&mut self, who: &PeerId) {
		self.peers.remove(who);
	}

	fn is_synced(&self) -> bool {
		match self.state.best_block_number() {
			Ok(best) => best.saturating_add(self.request_page_size) >= self.peers.target(),
			Err(error) => {
				error!(%error, "Cannot get best block number");
				false
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		messages::{BlockResponse, FromBlock, Request},
		sync::Strategy,
		state::MockBlockState,
		test_utils::{chain, fork_of, genesis, numbers, InMemoryChain, TestNetwork},
		types::BlockData,
	};
	use proptest::prelude::*;

	fn strategy(chain: &Arc<InMemoryChain>, config: &SyncConfig) -> FullSyncStrategy {
		FullSyncStrategy::new(
			config,
			chain.clone(),
			chain.clone(),
			Arc::new(PeerViewSet::default()),
		)
	}

	fn block_requests(tasks: &[SyncTask]) -> Vec<BlockRequest> {
		tasks
			.iter()
			.filter_map(|task| match &task.request {
				Request::Block(request) => Some(request.clone()),
				_ => None,
			})
			.collect()
	}

	fn response(who: PeerId, request: BlockRequest, blocks: Vec<BlockData>) -> SyncTaskResult {
		SyncTaskResult {
			who: Some(who),
			request: request.into(),
			response: Ok(BlockResponse { blocks }.into()),
		}
	}

	fn ascending(blocks: &[BlockData]) -> SyncTaskResult {
		let from = blocks[0].number().unwrap();
		let request = BlockRequest::new(
			from,
			blocks.len() as u32,
			RequestedData::BOOTSTRAP,
			Direction::Ascending,
		);
		response(PeerId::random(), request, blocks.to_vec())
	}

	fn announce(block: &BlockData, best_block: bool) -> BlockAnnounce {
		BlockAnnounce::from((block.header.as_ref().unwrap(), best_block))
	}

	#[test]
	fn no_requests_when_target_reached() {
		let chain = Arc::new(InMemoryChain::default());
		let mut strategy = strategy(&chain, &SyncConfig::default());
		assert!(strategy.next_actions().unwrap().is_empty());
		assert!(strategy.is_synced());
	}

	#[test]
	fn requests_cover_budget_towards_target() {
		let chain = Arc::new(InMemoryChain::new());
		let mut strategy = strategy(&chain, &SyncConfig::default());
		strategy
			.peers
			.update(PeerId::random(), H256::repeat_byte(1), 1_000);

		let requests = block_requests(&strategy.next_actions().unwrap());
		let ranges: Vec<_> = requests
			.iter()
			.map(|request| (request.from, request.max))
			.collect();
		assert_eq!(
			ranges,
			vec![
				(FromBlock::Number(1), Some(128)),
				(FromBlock::Number(129), Some(128)),
				(FromBlock::Number(257), Some(125)),
			]
		);
		assert!(!strategy.is_synced());
	}

	#[test]
	fn queued_requests_come_first_and_respect_budget() {
		let blocks = chain(2);
		let chain = Arc::new(InMemoryChain::new());
		let config = SyncConfig {
			num_of_tasks: 2,
			..Default::default()
		};
		let mut strategy = strategy(&chain, &config);
		strategy.peers.update(PeerId::random(), H256::repeat_byte(1), 500);
		for block in &blocks {
			strategy.request_queue.push_back(BlockRequest::new(
				block.hash,
				1,
				RequestedData::BODY,
				Direction::Ascending,
			));
		}
		strategy
			.request_queue
			.push_back(BlockRequest::new(1u32, 1, RequestedData::BODY, Direction::Ascending));

		let requests = block_requests(&strategy.next_actions().unwrap());
		assert_eq!(requests.len(), 2);
		assert_eq!(requests[0].from, FromBlock::Hash(blocks[0].hash));
		assert_eq!(strategy.queued_requests(), 1);

		let requests = block_requests(&strategy.next_actions().unwrap());
		assert_eq!(requests[0].from, FromBlock::Number(1));
		assert_eq!(requests[1].from, FromBlock::Number(1));
		assert_eq!(requests[1].max, Some(128));
	}

	#[test]
	fn gap_is_filled_by_ancestor_search() {
		let blocks = chain(256);
		let chain = Arc::new(InMemoryChain::new());
		let mut strategy = strategy(&chain, &SyncConfig::default());

		let outcome = strategy
			.process(vec![ascending(&blocks[128..256]), ascending(&blocks[..10])])
			.unwrap();
		assert!(outcome.reputation_changes.is_empty());
		assert_eq!(chain.imported(), (1..=10).collect::<Vec<_>>());
		assert_eq!(strategy.unready_blocks.fragment_ranges(), vec![(129, 256)]);

		let ancestor_request = strategy.request_queue.pop_front().unwrap();
		assert!(strategy.request_queue.is_empty());
		assert_eq!(ancestor_request.from, FromBlock::Hash(blocks[127].hash));
		assert_eq!(ancestor_request.direction, Direction::Descending);
		assert_eq!(ancestor_request.max, Some(128));

		let network = TestNetwork::new(blocks.clone(), vec![]);
		let served = network.serve(&ancestor_request);
		assert_eq!(numbers(&served.blocks)[0], 128);

		strategy
			.process(vec![response(PeerId::random(), ancestor_request, served.blocks)])
			.unwrap();
		assert_eq!(chain.imported(), (1..=256).collect::<Vec<_>>());
		assert_eq!(strategy.unready_blocks.disjoint_fragments_len(), 0);
		assert_eq!(chain.best_block_number().unwrap(), 256);
	}

	#[test]
	fn interleaved_ancestor_responses_keep_every_fragment() {
		let blocks = chain(300);
		let chain = Arc::new(InMemoryChain::new());
		let mut strategy = strategy(&chain, &SyncConfig::default());
		let network = TestNetwork::new(blocks.clone(), vec![]);

		strategy.process(vec![ascending(&blocks[128..256])]).unwrap();
		let lower_request = strategy.request_queue.pop_front().unwrap();
		assert_eq!(lower_request.from, FromBlock::Hash(blocks[127].hash));

		strategy.process(vec![ascending(&blocks[256..])]).unwrap();
		let upper_request = strategy.request_queue.pop_front().unwrap();
		assert_eq!(upper_request.from, FromBlock::Hash(blocks[255].hash));
		assert_eq!(
			strategy.unready_blocks.fragment_ranges(),
			vec![(129, 256), (257, 300)]
		);

		let served = network.serve(&upper_request);
		strategy
			.process(vec![response(PeerId::random(), upper_request, served.blocks)])
			.unwrap();
		assert!(chain.imported().is_empty());
		assert_eq!(strategy.unready_blocks.fragment_ranges(), vec![(129, 300)]);

		let served = network.serve(&lower_request);
		strategy
			.process(vec![response(PeerId::random(), lower_request, served.blocks)])
			.unwrap();
		assert_eq!(chain.imported(), (1..=300).collect::<Vec<_>>());
		assert_eq!(strategy.unready_blocks.disjoint_fragments_len(), 0);
	}

	#[test]
	fn redelivered_fragment_requests_ancestry_again() {
		let blocks = chain(256);
		let chain = Arc::new(InMemoryChain::new());
		let mut strategy = strategy(&chain, &SyncConfig::default());

		strategy.process(vec![ascending(&blocks[128..])]).unwrap();
		let lost_request = strategy.request_queue.pop_front().unwrap();
		assert_eq!(strategy.queued_requests(), 0);

		strategy.process(vec![ascending(&blocks[128..])]).unwrap();
		assert_eq!(strategy.queued_requests(), 1);
		assert_eq!(strategy.request_queue[0], lost_request);
		assert_eq!(strategy.unready_blocks.fragment_ranges(), vec![(129, 256)]);

		strategy.process(vec![ascending(&blocks[128..])]).unwrap();
		assert_eq!(strategy.queued_requests(), 1);
	}

	#[test]
	fn orphan_next_to_finalized_is_discarded() {
		let blocks = chain(6);
		let chain = Arc::new(InMemoryChain::with_blocks(&blocks));
		chain.finalize(blocks[5].hash);
		let mut strategy = strategy(&chain, &SyncConfig::default());

		let mut orphan = fork_of(&blocks[5], 1, 0x11);
		let header = orphan[0].header.as_mut().unwrap();
		header.parent_hash = H256::repeat_byte(0xee);
		let hash = header.hash();
		orphan[0].hash = hash;

		strategy.process(vec![ascending(&orphan)]).unwrap();
		assert!(chain.imported().is_empty());
		assert_eq!(strategy.unready_blocks.disjoint_fragments_len(), 0);
		assert!(strategy.request_queue.is_empty());
	}

	#[test]
	fn blocks_under_finalized_are_skipped() {
		let blocks = chain(8);
		let chain = Arc::new(InMemoryChain::with_blocks(&blocks[..4]));
		chain.finalize(blocks[3].hash);
		let mut strategy = strategy(&chain, &SyncConfig::default());

		strategy.process(vec![ascending(&blocks[2..])]).unwrap();
		assert_eq!(chain.imported(), vec![5, 6, 7, 8]);
	}

	#[test]
	fn fork_on_known_block_is_imported_after_main_chain() {
		let blocks = chain(8);
		let fork = fork_of(&blocks[3], 2, 0x22);
		let chain = Arc::new(InMemoryChain::new());
		let mut strategy = strategy(&chain, &SyncConfig::default());

		strategy
			.process(vec![ascending(&fork), ascending(&blocks)])
			.unwrap();
		assert_eq!(chain.imported(), vec![1, 2, 3, 4, 5, 6, 7, 8, 5, 6]);
		assert!(chain.has_header(&fork[1].hash).unwrap());
	}

	#[test]
	fn bad_block_response_bans_peer() {
		let blocks = chain(5);
		let chain = Arc::new(InMemoryChain::new());
		let config = SyncConfig {
			bad_blocks: vec![crate::types::HexHash(blocks[2].hash)],
			..Default::default()
		};
		let mut strategy = strategy(&chain, &config);
		let result = ascending(&blocks);
		let who = result.who.unwrap();

		let outcome = strategy.process(vec![result]).unwrap();
		assert_eq!(outcome.bans, vec![who]);
		assert_eq!(
			outcome.reputation_changes,
			vec![Change::new(who, rep::BAD_BLOCK_ANNOUNCEMENT)]
		);
		assert!(chain.imported().is_empty());
	}

	#[test]
	fn announced_block_is_fetched_and_imported() {
		let blocks = chain(3);
		let chain = Arc::new(InMemoryChain::with_blocks(&blocks[..2]));
		let mut strategy = strategy(&chain, &SyncConfig::default());
		let peer = PeerId::random();

		let outcome = strategy.on_block_announce(peer, &announce(&blocks[2], true)).unwrap();
		assert_eq!(
			outcome,
			AnnounceOutcome {
				gossip: true,
				rep_change: Some(Change::new(peer, rep::GOSSIP_SUCCESS)),
			}
		);
		assert_eq!(strategy.peers.target(), 3);
		assert!(strategy.unready_blocks.is_incomplete(&blocks[2].hash));

		let requests = block_requests(&strategy.next_actions().unwrap());
		assert_eq!(requests.len(), 2);
		let body_request = requests[0].clone();
		assert_eq!(body_request.from, FromBlock::Hash(blocks[2].hash));
		assert!(!body_request.requests(RequestedData::HEADER));

		let served = TestNetwork::new(blocks.clone(), vec![]).serve(&body_request);
		assert!(served.blocks[0].header.is_none());
		strategy
			.process(vec![response(peer, body_request, served.blocks)])
			.unwrap();

		assert_eq!(chain.imported(), vec![3]);
		assert_eq!(strategy.unready_blocks.incomplete_blocks_len(), 0);
	}

	#[test]
	fn already_tracked_announce_is_not_relevant() {
		let blocks = chain(3);
		let chain = Arc::new(InMemoryChain::with_blocks(&blocks[..2]));
		let mut strategy = strategy(&chain, &SyncConfig::default());
		let peer = PeerId::random();

		strategy.on_block_announce(peer, &announce(&blocks[2], false)).unwrap();
		let queued = strategy.queued_requests();

		let outcome = strategy.on_block_announce(peer, &announce(&blocks[2], false)).unwrap();
		assert_eq!(
			outcome,
			AnnounceOutcome {
				gossip: false,
				rep_change: Some(Change::new(peer, rep::NOT_RELEVANT_BLOCK_ANNOUNCE)),
			}
		);
		assert_eq!(strategy.queued_requests(), queued);
	}

	#[test]
	fn announce_inside_stored_fragment_is_not_relevant() {
		let blocks = chain(30);
		let chain = Arc::new(InMemoryChain::with_blocks(&blocks[..10]));
		let mut strategy = strategy(&chain, &SyncConfig::default());
		let peer = PeerId::random();

		strategy.process(vec![ascending(&blocks[19..])]).unwrap();
		assert_eq!(strategy.unready_blocks.fragment_ranges(), vec![(20, 30)]);
		let queued = strategy.queued_requests();

		let outcome = strategy.on_block_announce(peer, &announce(&blocks[24], false)).unwrap();
		assert_eq!(
			outcome,
			AnnounceOutcome {
				gossip: false,
				rep_change: Some(Change::new(peer, rep::NOT_RELEVANT_BLOCK_ANNOUNCE)),
			}
		);
		assert_eq!(strategy.queued_requests(), queued);
		assert!(!strategy.unready_blocks.is_incomplete(&blocks[24].hash));
	}

	#[test]
	fn finalized_announce_is_not_relevant() {
		let blocks = chain(3);
		let chain = Arc::new(InMemoryChain::with_blocks(&blocks));
		chain.finalize(blocks[2].hash);
		let mut strategy = strategy(&chain, &SyncConfig::default());
		let peer = PeerId::random();

		let outcome = strategy.on_block_announce(peer, &announce(&blocks[1], false)).unwrap();
		assert_eq!(
			outcome.rep_change,
			Some(Change::new(peer, rep::NOT_RELEVANT_BLOCK_ANNOUNCE))
		);
		assert_eq!(strategy.queued_requests(), 0);
	}

	#[test]
	fn distant_announce_is_ignored_silently() {
		let blocks = chain(200);
		let chain = Arc::new(InMemoryChain::new());
		let mut strategy = strategy(&chain, &SyncConfig::default());
		let peer = PeerId::random();

		let outcome = strategy.on_block_announce(peer, &announce(&blocks[199], true)).unwrap();
		assert_eq!(outcome.rep_change, None);
		assert_eq!(strategy.queued_requests(), 0);
		assert_eq!(strategy.peers.target(), 200);
	}

	#[test]
	fn bad_block_announce_is_penalized() {
		let blocks = chain(1);
		let chain = Arc::new(InMemoryChain::new());
		let config = SyncConfig {
			bad_blocks: vec![crate::types::HexHash(blocks[0].hash)],
			..Default::default()
		};
		let mut strategy = strategy(&chain, &config);
		let peer = PeerId::random();

		let outcome = strategy.on_block_announce(peer, &announce(&blocks[0], true)).unwrap();
		assert_eq!(
			outcome.rep_change,
			Some(Change::new(peer, rep::BAD_BLOCK_ANNOUNCEMENT))
		);
		assert_eq!(strategy.peers.target(), 0);
	}

	#[test]
	fn announce_refused_while_paused() {
		let blocks = chain(1);
		let chain = Arc::new(InMemoryChain::new());
		chain.pause();
		let mut strategy = strategy(&chain, &SyncConfig::default());

		assert!(strategy
			.on_block_announce(PeerId::random(), &announce(&blocks[0], true))
			.is_err());
		assert_eq!(strategy.queued_requests(), 0);
	}

	#[test]
	fn import_failure_is_reported() {
		let mut state = MockBlockState::new();
		state
			.expect_highest_finalized_header()
			.returning(|| Ok(genesis()));
		state.expect_has_header().returning(|_| Ok(true));
		let mut importer = crate::import::MockBlockImporter::new();
		importer
			.expect_import_block()
			.returning(|_, _| Err(eyre!("Storage failure")));
		let mut strategy = FullSyncStrategy::new(
			&SyncConfig::default(),
			Arc::new(state),
			Arc::new(importer),
			Arc::new(PeerViewSet::default()),
		);

		assert!(strategy.process(vec![ascending(&chain(2))]).is_err());
	}

	proptest! {
		#![proptest_config(ProptestConfig::with_cases(32))]
		#[test]
		fn arbitrary_response_order_imports_each_block_once(
			sizes in proptest::collection::vec(1usize..20, 1..8),
			order in any::<proptest::sample::Index>(),
			seed in any::<u64>(),
		) {
			let total: usize = sizes.iter().sum();
			let blocks = chain(total);
			let mut pieces = vec![];
			let mut start = 0;
			for size in sizes {
				pieces.push(blocks[start..start + size].to_vec());
				start += size;
			}

			// deterministic shuffle driven by the generated values
			let mut state = seed | 1;
			let rotation = order.index(pieces.len());
			pieces.rotate_left(rotation);
			for index in (1..pieces.len()).rev() {
				state ^= state << 13;
				state ^= state >> 7;
				state ^= state << 17;
				pieces.swap(index, (state % (index as u64 + 1)) as usize);
			}

			let chain = Arc::new(InMemoryChain::new());
			let mut strategy = strategy(&chain, &SyncConfig::default());

			let mut rounds = 0;
			let mut pending: Vec<_> = pieces.into_iter().map(|piece| vec![ascending(&piece)]).collect();
			// responses arrive one tick at a time, in shuffled order
			while let Some(results) = pending.pop() {
				strategy.process(results).unwrap();
				while let Some(ancestor) = strategy.request_queue.pop_front() {
					let served = TestNetwork::new(blocks.clone(), vec![]).serve(&ancestor);
					pending.insert(0, vec![response(PeerId::random(), ancestor, served.blocks)]);
				}
				rounds += 1;
				prop_assert!(rounds < 100);
			}

			prop_assert_eq!(chain.imported(), (1..=total as BlockNumber).collect::<Vec<_>>());
			prop_assert_eq!(strategy.unready_blocks.disjoint_fragments_len(), 0);
			prop_assert_eq!(strategy.unready_blocks.incomplete_blocks_len(), 0);
		}
	}
}
