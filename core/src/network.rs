use async_trait::async_trait;
use color_eyre::Result;
use libp2p::PeerId;
use mockall::automock;
use std::time::Duration;
use thiserror::Error;

use crate::{
	messages::{Request, Response},
	reputation::ReputationChange,
	types::Header,
};

/// Reasons a request did not complete. None of them is attributed to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
	#[error("Request timed out after {0:?}")]
	Timeout(Duration),
	#[error("Peer {0} is not connected")]
	NotConnected(PeerId),
	#[error("No peer worker available")]
	NoWorkers,
	#[error("Peer {0} is punished")]
	Punished(PeerId),
	#[error("Sync is shutting down")]
	Shutdown,
	#[error("Request failed: {0}")]
	Failed(String),
}

/// Request/response and peer management access to the peer-to-peer layer.
#[automock]
#[async_trait]
pub trait Network: Send + Sync {
	async fn connected_peers(&self) -> Result<Vec<PeerId>>;
	async fn report_peer(&self, change: ReputationChange, who: PeerId);
	async fn do_request(&self, who: PeerId, request: Request) -> Result<Response, RequestError>;
	/// Sends our best block to connected peers, asking for theirs in return.
	async fn block_announce_handshake(&self, best_header: Header) -> Result<()>;
}
