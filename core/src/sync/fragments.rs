//! Validation and reassembly of block responses into chains.
use libp2p::PeerId;
use sp_core::H256;
use std::collections::HashSet;
use tracing::warn;

use crate::{
	messages::{BlockRequest, Direction, Request, RequestedData, Response},
	reputation::{rep, Change, ReputationChange},
	sync::SyncTaskResult,
	types::{BlockData, BlockNumber, ShortHash},
	unready_blocks::Fragment,
};

/// Block response that passed validation, in ascending order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidResponse {
	pub request: BlockRequest,
	pub blocks: Vec<BlockData>,
}

#[derive(Debug, Default)]
pub struct Validated {
	pub reputation_changes: Vec<Change>,
	pub bans: Vec<PeerId>,
	pub responses: Vec<ValidResponse>,
}

impl Validated {
	fn penalize(&mut self, who: Option<PeerId>, change: ReputationChange) {
		if let Some(who) = who {
			self.reputation_changes.push(Change::new(who, change));
		}
	}

	fn ban(&mut self, who: Option<PeerId>) {
		if let Some(who) = who {
			self.bans.push(who);
		}
	}
}

/// Checks that every requested part is present and that the announced hash matches the header.
fn has_requested_fields(request: &BlockRequest, blocks: &[BlockData]) -> bool {
	blocks.iter().all(|block| {
		let header_ok = match &block.header {
			Some(header) => header.hash() == block.hash,
			None => !request.requests(RequestedData::HEADER),
		};
		let body_ok = block.body.is_some() || !request.requests(RequestedData::BODY);
		header_ok && body_ok
	})
}

/// Each block is the parent of the next one.
pub fn is_chain(blocks: &[BlockData]) -> bool {
	blocks.windows(2).all(|pair| match (&pair[0].header, &pair[1].header) {
		(Some(parent), Some(child)) => parent.hash() == child.parent_hash,
		_ => false,
	})
}

/// Filters completed block responses, collecting penalties and bans along the way.
///
/// Failed requests are skipped without penalty.
pub fn validate_results(results: Vec<SyncTaskResult>, bad_blocks: &HashSet<H256>) -> Validated {
	let mut validated = Validated::default();

	for result in results {
		let SyncTaskResult {
			who,
			request,
			response,
		} = result;

		let Ok(response) = response else {
			continue;
		};

		let (request, mut blocks) = match (request, response) {
			(Request::Block(request), Response::Block(response)) => (request, response.blocks),
			_ => {
				warn!(peer = ?who, "Unexpected response to block request");
				validated.penalize(who, rep::UNEXPECTED_RESPONSE);
				validated.ban(who);
				continue;
			},
		};

		if request.direction == Direction::Descending {
			blocks.reverse();
		}

		if !has_requested_fields(&request, &blocks) {
			warn!(peer = ?who, "Response is missing requested block fields");
			validated.penalize(who, rep::INCOMPLETE_HEADER);
			continue;
		}

		if request.requests(RequestedData::HEADER) && !is_chain(&blocks) {
			warn!(peer = ?who, "Response is not a chain");
			validated.penalize(who, rep::INCOMPLETE_HEADER);
			continue;
		}

		if let Some(bad) = blocks.iter().find(|block| bad_blocks.contains(&block.hash)) {
			warn!(peer = ?who, block_number = ?bad.number(), hash = %ShortHash(&bad.hash), "Peer sent a known bad block");
			validated.penalize(who, rep::BAD_BLOCK_ANNOUNCEMENT);
			validated.ban(who);
			continue;
		}

		validated.responses.push(ValidResponse { request, blocks });
	}

	validated
}

fn first_number(fragment: &Fragment) -> BlockNumber {
	fragment
		.first()
		.and_then(BlockData::number)
		.unwrap_or_default()
}

/// Orders fragments by their first block number, keeping forks after the main chain.
pub fn sort_fragments(fragments: &mut [Fragment]) {
	fragments.sort_by_key(first_number);
}

/// Prev block is the direct parent of next block.
pub fn forms_sequence(prev: &BlockData, next: &BlockData) -> bool {
	match (prev.number(), next.header.as_ref()) {
		(Some(number), Some(header)) => {
			number + 1 == header.number && prev.hash == header.parent_hash
		},
		_ => false,
	}
}

/// Concatenates sorted fragments that continue each other, forks stay separate.
///
/// `[{1..5} {6..10} {8} {11..16} {17}]` becomes `[{1..17} {8}]`.
pub fn merge_fragments(fragments: Vec<Fragment>) -> Vec<Fragment> {
	let mut merged: Vec<Fragment> = Vec::with_capacity(fragments.len());

	for fragment in fragments.into_iter().filter(|fragment| !fragment.is_empty()) {
		let continued = merged.iter_mut().rev().find(|run| {
			run.last()
				.zip(fragment.first())
				.is_some_and(|(prev, next)| forms_sequence(prev, next))
		});

		match continued {
			Some(run) => run.extend(fragment),
			None => merged.push(fragment),
		}
	}

	merged
}

/// Drops the part of the fragment at or below the finalized number.
pub fn valid_blocks_under(finalized: BlockNumber, mut fragment: Fragment) -> Fragment {
	let first_valid = fragment
		.iter()
		.position(|block| block.number().is_some_and(|number| number > finalized))
		.unwrap_or(fragment.len());
	fragment.drain(..first_valid);
	fragment
}
