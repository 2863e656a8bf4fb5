//! Blocks that cannot be imported yet.
//!
//! Two stores are kept: incomplete blocks, known by an announced header and waiting for their
//! body, and disjoint fragments, chains whose parent is not known locally yet.
use sp_core::H256;
use std::{collections::HashMap, sync::RwLock};
use tracing::{debug, warn};

use crate::types::{BlockData, BlockNumber, Header, ShortHash};

/// Ordered chain of blocks, each one the parent of the next.
pub type Fragment = Vec<BlockData>;

pub struct UnreadyBlocks {
	incomplete_blocks: RwLock<HashMap<H256, BlockData>>,
	disjoint_fragments: RwLock<Vec<Fragment>>,
	max_disjoint_fragments: usize,
}

fn fragment_number(fragment: &Fragment, index: usize) -> BlockNumber {
	fragment[index].number().unwrap_or_default()
}

impl UnreadyBlocks {
	pub fn new(max_disjoint_fragments: usize) -> Self {
		UnreadyBlocks {
			incomplete_blocks: RwLock::new(HashMap::new()),
			disjoint_fragments: RwLock::new(vec![]),
			max_disjoint_fragments,
		}
	}

	pub fn new_incomplete_block(&self, header: Header) {
		let block = BlockData::new(header, None, None);
		self.incomplete_blocks
			.write()
			.expect("Lock acquired")
			.insert(block.hash, block);
	}

	/// Stores a fragment whose parent is not known yet.
	///
	/// A stored fragment starting with the same block is replaced when the new one is longer.
	/// Returns `false` when the fragment is not tracked, because it is empty or the store is full.
	pub fn new_disjoint_fragment(&self, fragment: Fragment) -> bool {
		let Some(first) = fragment.first() else {
			return false;
		};
		let hash = first.hash;

		let mut fragments = self.disjoint_fragments.write().expect("Lock acquired");
		if let Some(stored) = fragments
			.iter_mut()
			.find(|stored| stored.first().map(|block| block.hash) == Some(hash))
		{
			if fragment.len() > stored.len() {
				debug!(hash = %ShortHash(&hash), blocks = fragment.len(), "Extending stored fragment");
				*stored = fragment;
			}
			return true;
		}

		if fragments.len() >= self.max_disjoint_fragments {
			warn!(
				max = self.max_disjoint_fragments,
				"Disjoint fragments store is full, dropping fragment"
			);
			return false;
		}

		fragments.push(fragment);
		true
	}

	/// Fills incomplete blocks with the parts carried by `chain`.
	///
	/// Blocks that became complete are moved out of the store and returned.
	pub fn update_incomplete_blocks(&self, chain: Vec<BlockData>) -> Vec<BlockData> {
		let mut incomplete = self.incomplete_blocks.write().expect("Lock acquired");
		let mut completed = vec![];

		for data in chain {
			let Some(block) = incomplete.get_mut(&data.hash) else {
				continue;
			};

			if data.body.is_some() {
				block.body = data.body;
			}
			if data.justification.is_some() {
				block.justification = data.justification;
			}

			if block.is_complete() {
				if let Some(block) = incomplete.remove(&data.hash) {
					completed.push(block);
				}
			}
		}

		completed
	}

	/// Prepends `chain` to the stored fragment it is the ancestry of.
	///
	/// The matched fragment leaves the store, caller owns the merged chain.
	pub fn update_disjoint_fragments(&self, chain: &[BlockData]) -> Option<Fragment> {
		let last = chain.last()?;
		let mut fragments = self.disjoint_fragments.write().expect("Lock acquired");

		let position = fragments.iter().position(|fragment| {
			fragment.first().and_then(BlockData::parent_hash) == Some(last.hash)
		})?;

		let fragment = fragments.swap_remove(position);
		let mut merged = Vec::with_capacity(chain.len() + fragment.len());
		merged.extend_from_slice(chain);
		merged.extend(fragment);
		Some(merged)
	}

	pub fn is_incomplete(&self, hash: &H256) -> bool {
		self.incomplete_blocks
			.read()
			.expect("Lock acquired")
			.contains_key(hash)
	}

	/// Checks whether the block is part of some stored fragment.
	pub fn in_disjoint_fragment(&self, hash: &H256, number: BlockNumber) -> bool {
		let fragments = self.disjoint_fragments.read().expect("Lock acquired");
		fragments.iter().any(|fragment| {
			fragment
				.binary_search_by_key(&number, |block| block.number().unwrap_or_default())
				.map(|index| fragment[index].hash == *hash)
				.unwrap_or(false)
		})
	}

	/// Drops every block at or below the finalized number.
	///
	/// Fragments lose their finalized prefix and are deleted once empty.
	pub fn remove_irrelevant_fragments(&self, finalized: BlockNumber) {
		self.incomplete_blocks
			.write()
			.expect("Lock acquired")
			.retain(|_, block| block.number().unwrap_or_default() > finalized);

		let mut fragments = self.disjoint_fragments.write().expect("Lock acquired");
		for fragment in fragments.iter_mut() {
			let keep_from = fragment.partition_point(|block| block.number().unwrap_or_default() <= finalized);
			fragment.drain(..keep_from);
		}
		fragments.retain(|fragment| !fragment.is_empty());
	}

	pub fn incomplete_blocks_len(&self) -> usize {
		self.incomplete_blocks.read().expect("Lock acquired").len()
	}

	pub fn disjoint_fragments_len(&self) -> usize {
		self.disjoint_fragments.read().expect("Lock acquired").len()
	}

	/// First and last block numbers of every stored fragment.
	pub fn fragment_ranges(&self) -> Vec<(BlockNumber, BlockNumber)> {
		self.disjoint_fragments
			.read()
			.expect("Lock acquired")
			.iter()
			.map(|fragment| (fragment_number(fragment, 0), fragment_number(fragment, fragment.len() - 1)))
			.collect()
	}
}
