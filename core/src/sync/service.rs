use color_eyre::{eyre::WrapErr, Result};
use libp2p::PeerId;
use std::sync::Arc;
use tokio::{
	sync::{mpsc::UnboundedSender, Mutex},
	task::JoinHandle,
	time::{interval, sleep, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use super::{
	full_sync::FullSyncStrategy, warp_sync::WarpSyncStrategy, worker_pool::WorkerPool, Strategy,
	StrategyOutcome,
};
use crate::{
	config::SyncConfig,
	finality::WarpProofVerifier,
	import::BlockImporter,
	messages::{BlockAnnounce, BlockAnnounceHandshake},
	network::Network,
	peer_view::PeerViewSet,
	shutdown::Controller,
	state::BlockState,
	telemetry::{OutputEvent, StrategyKind},
	types::{AuthorityList, BlockNumber, Header, SetId, ShortHash},
	utils::spawn_in_span,
};

/// Trusted starting point of warp sync.
pub struct WarpSyncParams {
	pub checkpoint: Header,
	pub set_id: SetId,
	pub authorities: AuthorityList,
	pub verifier: Arc<dyn WarpProofVerifier>,
}

struct Strategies {
	full: FullSyncStrategy,
	warp: Option<WarpSyncStrategy>,
}

impl Strategies {
	fn active(&mut self) -> &mut dyn Strategy {
		match self.warp.as_mut() {
			Some(warp) => warp,
			None => &mut self.full,
		}
	}
}

/// Drives the active strategy one tick at a time on the worker pool.
#[derive(Clone)]
pub struct SyncService {
	strategies: Arc<Mutex<Strategies>>,
	pool: WorkerPool,
	network: Arc<dyn Network>,
	state: Arc<dyn BlockState>,
	peers: Arc<PeerViewSet>,
	config: SyncConfig,
	shutdown: Controller<String>,
	event_sender: Option<UnboundedSender<OutputEvent>>,
}

impl SyncService {
	/// Creates the service with full sync, starting with warp sync if enabled and parameters are given.
	pub fn new(
		config: SyncConfig,
		network: Arc<dyn Network>,
		state: Arc<dyn BlockState>,
		importer: Arc<dyn BlockImporter>,
		warp_sync: Option<WarpSyncParams>,
		shutdown: Controller<String>,
	) -> Self {
		let peers = Arc::new(PeerViewSet::default());
		let full = FullSyncStrategy::new(&config, state.clone(), importer, peers.clone());

		let warp = match warp_sync {
			Some(params) if config.warp_sync_enable => {
				info!(
					block_number = params.checkpoint.number,
					set_id = params.set_id,
					"Starting with warp sync"
				);
				Some(WarpSyncStrategy::new(
					params.checkpoint,
					params.set_id,
					params.authorities,
					params.verifier,
					peers.clone(),
					config.bad_blocks(),
				))
			},
			Some(_) => {
				debug!("Warp sync is disabled, starting with full sync");
				None
			},
			None => None,
		};

		SyncService {
			strategies: Arc::new(Mutex::new(Strategies { full, warp })),
			pool: WorkerPool::new(network.clone(), &config, shutdown.clone()),
			network,
			state,
			peers,
			config,
			shutdown,
			event_sender: None,
		}
	}

	pub fn with_event_sender(mut self, event_sender: UnboundedSender<OutputEvent>) -> Self {
		self.event_sender = Some(event_sender);
		self
	}

	/// Spawns the sync loop. It waits for enough peers and then ticks until shutdown.
	pub fn start(&self) -> JoinHandle<()> {
		let service = self.clone();
		spawn_in_span(async move { service.run().await })
	}

	/// Triggers the shutdown and waits until the loop and every peer worker stopped.
	pub async fn stop(&self) {
		if let Err(error) = self.shutdown.trigger_shutdown("Sync service stopped".to_string()) {
			debug!(%error, "Shutdown already triggered");
		}
		let reason = self.shutdown.completed_shutdown().await;
		info!(%reason, "Sync service stopped");
	}

	async fn run(self) {
		let Ok(_delay_token) = self.shutdown.delay_token() else {
			return;
		};

		match self.shutdown.with_cancel(self.wait_workers()).await {
			Ok(Ok(())) => {},
			Ok(Err(error)) => {
				error!("Waiting for peers failed: {error:#}");
				return;
			},
			Err(reason) => {
				info!(%reason, "Stopped while waiting for peers");
				return;
			},
		}

		let mut ticker = interval(self.config.tick_interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		while self.shutdown.with_cancel(ticker.tick()).await.is_ok() {
			self.run_strategy().await;
		}
		debug!("Sync loop stopped");
	}

	/// Waits until `min_peers` workers exist, handshaking with the network meanwhile.
	async fn wait_workers(&self) -> Result<()> {
		loop {
			if let Err(error) = self.pool.use_connected_peers().await {
				warn!("{error:#}");
			}

			let total = self.pool.total_workers();
			if total >= self.config.min_peers {
				info!(workers = total, "Enough peers to start syncing");
				return Ok(());
			}

			let best_header = self.state.best_block_header()?;
			self.network
				.block_announce_handshake(best_header)
				.await
				.wrap_err("Block announce handshake failed")?;

			info!(
				workers = total,
				min_peers = self.config.min_peers,
				"Waiting for peers"
			);
			sleep(self.config.wait_peers_duration).await;
		}
	}

	/// Runs a single tick of the active strategy. Failures are logged, the next tick starts over.
	pub async fn run_strategy(&self) {
		if let Err(error) = self.tick().await {
			error!("Sync tick failed: {error:#}");
		}
	}

	async fn tick(&self) -> Result<()> {
		let tasks = self.strategies.lock().await.active().next_actions()?;
		debug!(tasks = tasks.len(), "Submitting sync tasks");
		let results = self.pool.submit_requests(tasks).await;

		let mut strategies = self.strategies.lock().await;
		let active = strategies.active();
		let kind = active.kind();
		let outcome = active.process(results)?;
		let metrics = active.show_metrics();

		let completed_warp = match (kind, outcome.done) {
			(StrategyKind::Warp, true) => strategies.warp.take(),
			_ => None,
		};
		drop(strategies);

		self.apply_outcome(outcome).await;
		self.send_event(OutputEvent::Metrics(metrics));

		if let Some(warp) = completed_warp {
			if let Some(block) = warp.result() {
				info!(
					block_number = ?block.number(),
					hash = %ShortHash(&block.hash),
					"Warp sync completed"
				);
				self.send_event(OutputEvent::WarpSyncCompleted(Box::new(block.clone())));
			}
			info!(from = %StrategyKind::Warp, to = %StrategyKind::Full, "Switching sync strategy");
			self.send_event(OutputEvent::StrategySwitched {
				from: StrategyKind::Warp,
				to: StrategyKind::Full,
			});
		}

		Ok(())
	}

	async fn apply_outcome(&self, outcome: StrategyOutcome) {
		for change in outcome.reputation_changes {
			debug!(peer = %change.who, rep = %change.rep, "Reporting peer");
			self.network.report_peer(change.rep, change.who).await;
			self.send_event(OutputEvent::ReputationReported {
				who: change.who,
				change: change.rep,
			});
		}

		for who in outcome.bans {
			self.pool.punish_peer(&who);
			self.send_event(OutputEvent::PeerPunished(who));
		}
	}

	fn send_event(&self, event: OutputEvent) {
		let Some(event_sender) = &self.event_sender else {
			return;
		};
		if let Err(error) = event_sender.send(event) {
			error!(%error, event_type = "OUTPUT_EVENT_SEND", "Cannot send output event");
		}
	}

	/// Registers the peer and its best block.
	pub async fn handle_block_announce_handshake(
		&self,
		who: PeerId,
		handshake: &BlockAnnounceHandshake,
	) -> Result<()> {
		self.pool.new_peer(who);
		self.strategies
			.lock()
			.await
			.active()
			.on_block_announce_handshake(who, handshake)
	}

	/// Handles an announce, returning whether it should be propagated further.
	pub async fn handle_block_announce(&self, who: PeerId, announce: &BlockAnnounce) -> Result<bool> {
		self.pool.new_peer(who);
		let outcome = self
			.strategies
			.lock()
			.await
			.active()
			.on_block_announce(who, announce)?;

		if let Some(change) = outcome.rep_change {
			self.network.report_peer(change.rep, change.who).await;
			self.send_event(OutputEvent::ReputationReported {
				who: change.who,
				change: change.rep,
			});
		}
		Ok(outcome.gossip)
	}

	pub async fn on_connection_closed(&self, who: PeerId) {
		self.pool.remove_worker(&who);
		self.strategies.lock().await.active().on_connection_closed(&who);
	}

	pub async fn is_synced(&self) -> bool {
		self.strategies.lock().await.active().is_synced()
	}

	/// Highest block advertised by peers.
	pub fn highest_block(&self) -> BlockNumber {
		self.peers.target()
	}
}
