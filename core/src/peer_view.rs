use libp2p::PeerId;
use sp_core::H256;
use std::{collections::HashMap, sync::RwLock};

use crate::types::BlockNumber;

/// Last best block a peer told us about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerView {
	pub who: PeerId,
	pub hash: H256,
	pub number: BlockNumber,
}

#[derive(Default)]
struct Inner {
	views: HashMap<PeerId, PeerView>,
	target: BlockNumber,
}

/// Per-peer best blocks, used to pick the sync target.
///
/// Target never decreases, even when the peer that advertised it disconnects.
#[derive(Default)]
pub struct PeerViewSet {
	inner: RwLock<Inner>,
}

impl PeerViewSet {
	/// Stores the view if it is the first one of the peer or strictly ahead of the current one.
	pub fn update(&self, who: PeerId, hash: H256, number: BlockNumber) -> bool {
		let mut inner = self.inner.write().expect("Lock acquired");
		if let Some(view) = inner.views.get(&who) {
			if view.number >= number {
				return false;
			}
		}
		inner.views.insert(who, PeerView { who, hash, number });
		inner.target = inner.target.max(number);
		true
	}

	pub fn get(&self, who: &PeerId) -> Option<PeerView> {
		self.inner.read().expect("Lock acquired").views.get(who).copied()
	}

	pub fn remove(&self, who: &PeerId) {
		self.inner.write().expect("Lock acquired").views.remove(who);
	}

	/// Highest block number advertised so far.
	pub fn target(&self) -> BlockNumber {
		self.inner.read().expect("Lock acquired").target
	}

	pub fn len(&self) -> usize {
		self.inner.read().expect("Lock acquired").views.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
