use libp2p::PeerId;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, time::timeout};
use tracing::{debug, trace};

use super::{
	worker_pool::{release_worker, Workers},
	SyncTask, SyncTaskResult,
};
use crate::{
	network::{Network, RequestError},
	shutdown::{Controller, DelayToken},
};

/// Task queued on a peer worker, with the channel its result goes to.
pub(crate) struct WorkerTask {
	pub task: SyncTask,
	pub results: mpsc::Sender<SyncTaskResult>,
}

impl WorkerTask {
	async fn fail(self, error: RequestError) {
		let _ = self
			.results
			.send(SyncTaskResult::failed(self.task, error))
			.await;
	}
}

pub(crate) struct PeerWorker {
	pub who: PeerId,
	pub network: Arc<dyn Network>,
	pub workers: Workers,
	pub request_timeout: Duration,
	pub shutdown: Controller<String>,
}

impl PeerWorker {
	/// Executes queued tasks one by one until the queue is closed or the shutdown is triggered.
	///
	/// Tasks still queued on shutdown complete with a failed result.
	pub async fn run(self, mut tasks: mpsc::Receiver<WorkerTask>, delay_token: DelayToken<String>) {
		debug!(peer = %self.who, "Peer worker started");

		loop {
			let next = self.shutdown.with_cancel(tasks.recv()).await;
			let Ok(Some(worker_task)) = next else {
				break;
			};

			let request = worker_task.task.request.clone();
			let response = match timeout(
				self.request_timeout,
				self.network.do_request(self.who, request.clone()),
			)
			.await
			{
				Ok(response) => response,
				Err(_) => Err(RequestError::Timeout(self.request_timeout)),
			};

			if let Err(error) = &response {
				trace!(peer = %self.who, %error, "Request failed");
			}

			let _ = worker_task
				.results
				.send(SyncTaskResult {
					who: Some(self.who),
					request,
					response,
				})
				.await;

			release_worker(&self.workers, &self.who);
		}

		tasks.close();
		while let Ok(worker_task) = tasks.try_recv() {
			worker_task.fail(RequestError::Shutdown).await;
		}

		debug!(peer = %self.who, "Peer worker stopped");
		drop(delay_token);
	}
}
