//! Request and response messages exchanged with peers.
//!
//! Only the fields the sync engine inspects are modelled here, byte encoding
//! is left to the network implementation.
use derive_more::From;
use sp_core::H256;
use std::ops::BitOr;
use strum::Display;

use crate::types::{BlockData, BlockNumber, Digest, Header};

/// Maximum number of blocks a single block response may contain.
pub const MAX_BLOCKS_IN_RESPONSE: u32 = 128;

/// Bitmask of block parts requested from a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestedData(u8);

impl RequestedData {
	pub const HEADER: RequestedData = RequestedData(1);
	pub const BODY: RequestedData = RequestedData(2);
	pub const RECEIPT: RequestedData = RequestedData(4);
	pub const MESSAGE_QUEUE: RequestedData = RequestedData(8);
	pub const JUSTIFICATION: RequestedData = RequestedData(16);

	/// Everything needed to import blocks while catching up.
	pub const BOOTSTRAP: RequestedData = RequestedData(1 | 2 | 4 | 8 | 16);

	pub fn bits(&self) -> u8 {
		self.0
	}

	pub fn contains(&self, other: RequestedData) -> bool {
		self.0 & other.0 == other.0
	}
}

impl BitOr for RequestedData {
	type Output = RequestedData;

	fn bitor(self, rhs: Self) -> Self::Output {
		RequestedData(self.0 | rhs.0)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum Direction {
	#[strum(serialize = "ascending")]
	Ascending,
	#[strum(serialize = "descending")]
	Descending,
}

/// Starting point of a block request, either a number or a hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, From)]
pub enum FromBlock {
	Number(BlockNumber),
	Hash(H256),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockRequest {
	pub requested_data: RequestedData,
	pub from: FromBlock,
	pub end_hash: Option<H256>,
	pub direction: Direction,
	pub max: Option<u32>,
}

impl BlockRequest {
	pub fn new(
		from: impl Into<FromBlock>,
		amount: u32,
		requested_data: RequestedData,
		direction: Direction,
	) -> Self {
		BlockRequest {
			requested_data,
			from: from.into(),
			end_hash: None,
			direction,
			max: Some(amount),
		}
	}

	pub fn requests(&self, field: RequestedData) -> bool {
		self.requested_data.contains(field)
	}
}

/// Builds ascending requests tiling `[start, target]` with pages of at most `page_size` blocks.
///
/// Page size is capped to [`MAX_BLOCKS_IN_RESPONSE`], an empty range yields no requests.
pub fn ascending_block_requests(
	start: BlockNumber,
	target: BlockNumber,
	page_size: u32,
	requested_data: RequestedData,
) -> Vec<BlockRequest> {
	if start > target {
		return vec![];
	}

	let page_size = page_size.clamp(1, MAX_BLOCKS_IN_RESPONSE) as u64;
	let mut next = start as u64;
	let end = target as u64;
	let mut requests = Vec::with_capacity(((end - next) / page_size + 1) as usize);

	while next <= end {
		let amount = page_size.min(end - next + 1);
		requests.push(BlockRequest::new(
			next as BlockNumber,
			amount as u32,
			requested_data,
			Direction::Ascending,
		));
		next += amount;
	}

	requests
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockResponse {
	pub blocks: Vec<BlockData>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WarpProofRequest {
	pub begin: H256,
}

/// Warp proof as received from a peer, decoded only as far as the metadata goes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WarpProofResponse {
	pub encoded_proof: Vec<u8>,
	pub is_finished: bool,
	pub fragments: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, From)]
pub enum Request {
	Block(BlockRequest),
	WarpProof(WarpProofRequest),
}

#[derive(Clone, Debug, PartialEq, Eq, From)]
pub enum Response {
	Block(BlockResponse),
	WarpProof(WarpProofResponse),
}

/// Header announced by a peer through the block announces protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockAnnounce {
	pub parent_hash: H256,
	pub number: BlockNumber,
	pub state_root: H256,
	pub extrinsics_root: H256,
	pub digest: Digest,
	pub best_block: bool,
}

impl BlockAnnounce {
	pub fn header(&self) -> Header {
		Header::new(
			self.parent_hash,
			self.state_root,
			self.extrinsics_root,
			self.number,
			self.digest.clone(),
		)
	}
}

impl From<(&Header, bool)> for BlockAnnounce {
	fn from((header, best_block): (&Header, bool)) -> Self {
		BlockAnnounce {
			parent_hash: header.parent_hash,
			number: header.number,
			state_root: header.state_root,
			extrinsics_root: header.extrinsics_root,
			digest: header.digest.clone(),
			best_block,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockAnnounceHandshake {
	pub roles: u8,
	pub best_block_number: BlockNumber,
	pub best_block_hash: H256,
	pub genesis_hash: H256,
}
