//! One worker per peer, executing sync requests concurrently.
use color_eyre::{eyre::WrapErr, Result};
use libp2p::PeerId;
use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
	time::Duration,
};
use tokio::{
	sync::{mpsc, Notify},
	time::{sleep, Instant},
};
use tracing::{debug, info, warn};

use super::{
	worker::{PeerWorker, WorkerTask},
	SyncTask, SyncTaskResult,
};
use crate::{
	config::SyncConfig,
	network::{Network, RequestError},
	shutdown::Controller,
	utils::spawn_in_span,
};

/// Interval for re-checking workers while waiting for one to become available.
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerStatus {
	Available,
	Busy,
	Punished { until: Instant },
}

impl WorkerStatus {
	/// Status as of `now`, with an expired punishment read as available.
	fn at(self, now: Instant) -> WorkerStatus {
		match self {
			WorkerStatus::Punished { until } if until <= now => WorkerStatus::Available,
			status => status,
		}
	}
}

pub(crate) struct WorkerEntry {
	status: WorkerStatus,
	queue: mpsc::Sender<WorkerTask>,
}

pub(crate) struct SharedWorkers {
	entries: Mutex<HashMap<PeerId, WorkerEntry>>,
	available: Notify,
}

pub(crate) type Workers = Arc<SharedWorkers>;

/// Marks a busy worker as available again and wakes up a waiting dispatcher.
pub(crate) fn release_worker(workers: &Workers, who: &PeerId) {
	if let Some(entry) = workers.entries.lock().unwrap().get_mut(who) {
		if entry.status == WorkerStatus::Busy {
			entry.status = WorkerStatus::Available;
		}
	}
	workers.available.notify_one();
}

#[derive(Clone)]
pub struct WorkerPool {
	network: Arc<dyn Network>,
	workers: Workers,
	request_timeout: Duration,
	punishment_duration: Duration,
	queue_capacity: usize,
	shutdown: Controller<String>,
}

impl WorkerPool {
	pub fn new(network: Arc<dyn Network>, config: &SyncConfig, shutdown: Controller<String>) -> Self {
		WorkerPool {
			network,
			workers: Arc::new(SharedWorkers {
				entries: Mutex::new(HashMap::new()),
				available: Notify::new(),
			}),
			request_timeout: config.request_timeout,
			punishment_duration: config.punishment_duration,
			queue_capacity: config.worker_queue_capacity.max(1),
			shutdown,
		}
	}

	/// Starts a worker for the peer, unless it already has one or the shutdown has completed.
	pub fn new_peer(&self, who: PeerId) -> bool {
		let mut entries = self.workers.entries.lock().unwrap();
		if entries.contains_key(&who) {
			return false;
		}

		let Ok(delay_token) = self.shutdown.delay_token() else {
			return false;
		};

		let (queue, tasks) = mpsc::channel(self.queue_capacity);
		entries.insert(
			who,
			WorkerEntry {
				status: WorkerStatus::Available,
				queue,
			},
		);
		drop(entries);

		let worker = PeerWorker {
			who,
			network: self.network.clone(),
			workers: self.workers.clone(),
			request_timeout: self.request_timeout,
			shutdown: self.shutdown.clone(),
		};
		spawn_in_span(worker.run(tasks, delay_token));
		self.workers.available.notify_one();

		debug!(peer = %who, "Added peer worker");
		true
	}

	/// Starts workers for every peer currently connected, returning the number of new ones.
	pub async fn use_connected_peers(&self) -> Result<usize> {
		let peers = self
			.network
			.connected_peers()
			.await
			.wrap_err("Failed to get connected peers")?;

		let added = peers.into_iter().filter(|who| self.new_peer(*who)).count();
		if added > 0 {
			info!(added, total = self.total_workers(), "Using connected peers");
		}
		Ok(added)
	}

	/// Stops the peer worker once its queued tasks are done.
	pub fn remove_worker(&self, who: &PeerId) {
		if self.workers.entries.lock().unwrap().remove(who).is_some() {
			debug!(peer = %who, "Removed peer worker");
		}
	}

	/// Excludes the peer from unbound tasks for the punishment duration.
	pub fn punish_peer(&self, who: &PeerId) {
		let until = Instant::now() + self.punishment_duration;
		if let Some(entry) = self.workers.entries.lock().unwrap().get_mut(who) {
			entry.status = WorkerStatus::Punished { until };
			warn!(peer = %who, duration = ?self.punishment_duration, "Peer punished");
		}
	}

	pub fn status(&self, who: &PeerId) -> Option<WorkerStatus> {
		let now = Instant::now();
		self.workers
			.entries
			.lock()
			.unwrap()
			.get(who)
			.map(|entry| entry.status.at(now))
	}

	pub fn total_workers(&self) -> usize {
		self.workers.entries.lock().unwrap().len()
	}

	/// Runs every task and waits for all of their results.
	///
	/// Results come back in completion order. Tasks that cannot run yield a failed result.
	pub async fn submit_requests(&self, tasks: Vec<SyncTask>) -> Vec<SyncTaskResult> {
		let total = tasks.len();
		if total == 0 {
			return vec![];
		}

		let (results_sender, mut results_receiver) = mpsc::channel(total);
		for task in tasks {
			self.dispatch(task, results_sender.clone()).await;
		}
		drop(results_sender);

		let mut results = Vec::with_capacity(total);
		while let Some(result) = results_receiver.recv().await {
			results.push(result);
		}
		results
	}

	async fn dispatch(&self, task: SyncTask, results: mpsc::Sender<SyncTaskResult>) {
		let queue = match task.who {
			Some(who) => self.peer_queue(&who),
			None => self.acquire_worker().await,
		};

		let (who, queue) = match queue {
			Ok(queue) => queue,
			Err(error) => {
				let _ = results.send(SyncTaskResult::failed(task, error)).await;
				return;
			},
		};

		if let Err(mpsc::error::SendError(worker_task)) =
			queue.send(WorkerTask { task, results }).await
		{
			let _ = worker_task
				.results
				.send(SyncTaskResult::failed(
					worker_task.task,
					RequestError::NotConnected(who),
				))
				.await;
		}
	}

	fn peer_queue(&self, who: &PeerId) -> Result<(PeerId, mpsc::Sender<WorkerTask>), RequestError> {
		let now = Instant::now();
		let mut entries = self.workers.entries.lock().unwrap();
		let entry = entries
			.get_mut(who)
			.ok_or(RequestError::NotConnected(*who))?;

		match entry.status.at(now) {
			WorkerStatus::Punished { .. } => Err(RequestError::Punished(*who)),
			_ => {
				entry.status = WorkerStatus::Busy;
				Ok((*who, entry.queue.clone()))
			},
		}
	}

	/// Picks the first available worker, marking it busy.
	///
	/// Fails right away when there are no workers or all of them are punished.
	async fn acquire_worker(&self) -> Result<(PeerId, mpsc::Sender<WorkerTask>), RequestError> {
		loop {
			let released = self.workers.available.notified();

			{
				let now = Instant::now();
				let mut entries = self.workers.entries.lock().unwrap();
				let mut all_punished = true;

				for (who, entry) in entries.iter_mut() {
					match entry.status.at(now) {
						WorkerStatus::Available => {
							entry.status = WorkerStatus::Busy;
							return Ok((*who, entry.queue.clone()));
						},
						WorkerStatus::Busy => all_punished = false,
						WorkerStatus::Punished { .. } => {},
					}
				}

				if all_punished {
					return Err(RequestError::NoWorkers);
				}
			}

			tokio::select! {
				_ = self.shutdown.triggered_shutdown() => return Err(RequestError::Shutdown),
				_ = released => {},
				_ = sleep(WORKER_POLL_INTERVAL) => {},
			}
		}
	}
}
