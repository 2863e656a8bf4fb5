use libp2p::PeerId;
use std::fmt::{self, Display, Formatter};

/// Reputation adjustment reported to the network layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReputationChange {
	pub value: i32,
	pub reason: &'static str,
}

impl ReputationChange {
	pub const fn new(value: i32, reason: &'static str) -> Self {
		ReputationChange { value, reason }
	}

	pub fn is_penalty(&self) -> bool {
		self.value < 0
	}
}

impl Display for ReputationChange {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.reason, self.value)
	}
}

pub mod rep {
	use super::ReputationChange as Rep;

	/// Peer announced or served a block known to be bad.
	pub const BAD_BLOCK_ANNOUNCEMENT: Rep = Rep::new(-(1 << 12), "Bad block announcement");
	/// Response is missing requested parts or does not form a chain.
	pub const INCOMPLETE_HEADER: Rep = Rep::new(-(1 << 20), "Incomplete header");
	/// Announced block is already known or finalized.
	pub const NOT_RELEVANT_BLOCK_ANNOUNCE: Rep = Rep::new(-(1 << 3), "Not relevant block announce");
	/// Announced block was unknown and worth fetching.
	pub const GOSSIP_SUCCESS: Rep = Rep::new(1 << 4, "Successful gossip");
	pub const BAD_WARP_PROOF: Rep = Rep::new(-(1 << 29), "Bad warp proof");
	pub const UNEXPECTED_RESPONSE: Rep = Rep::new(-(1 << 29), "Unexpected response");
}

/// Reputation change addressed to a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Change {
	pub who: PeerId,
	pub rep: ReputationChange,
}

impl Change {
	pub fn new(who: PeerId, rep: ReputationChange) -> Self {
		Change { who, rep }
	}
}
