//! In-memory chain, block state and network used by unit tests.
use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use libp2p::PeerId;
use sp_core::H256;
use std::{
	collections::{HashMap, HashSet},
	sync::{
		atomic::{AtomicUsize, Ordering},
		Mutex,
	},
	time::Duration,
};

use crate::{
	import::BlockImporter,
	messages::{
		BlockRequest, BlockResponse, Direction, FromBlock, Request, RequestedData, Response,
		WarpProofResponse,
	},
	network::{Network, RequestError},
	reputation::ReputationChange,
	state::BlockState,
	types::{BlockData, BlockNumber, BlockOrigin, Body, Digest, Header, Justification, SetId},
};

pub fn genesis() -> Header {
	Header::new(
		H256::zero(),
		H256::zero(),
		H256::zero(),
		0,
		Digest::default(),
	)
}

fn chain_from(parent: &Header, len: usize, salt: u8) -> Vec<BlockData> {
	let mut parent_hash = parent.hash();
	(1..=len as BlockNumber)
		.map(|offset| {
			let number = parent.number + offset;
			let header = Header::new(
				parent_hash,
				H256::repeat_byte(salt),
				H256::from_low_u64_be(number as u64),
				number,
				Digest::default(),
			);
			parent_hash = header.hash();
			BlockData::new(header, Some(Body(vec![number.to_le_bytes().to_vec()])), None)
		})
		.collect()
}

/// Complete blocks `1..=len` on top of [`genesis`].
pub fn chain(len: usize) -> Vec<BlockData> {
	chain_from(&genesis(), len, 0)
}

/// Complete blocks branching off `parent`, distinct from the main chain for non-zero salt.
pub fn fork_of(parent: &BlockData, len: usize, salt: u8) -> Vec<BlockData> {
	let parent = parent.header.as_ref().expect("Parent has header");
	chain_from(parent, len, salt)
}

pub fn numbers(blocks: &[BlockData]) -> Vec<BlockNumber> {
	blocks.iter().filter_map(BlockData::number).collect()
}

#[derive(Default)]
struct ChainInner {
	headers: HashMap<H256, Header>,
	bodies: HashSet<H256>,
	by_number: HashMap<BlockNumber, H256>,
	best: H256,
	finalized: H256,
	justifications: HashMap<H256, Justification>,
	imported: Vec<BlockNumber>,
	paused: bool,
}

/// Block state that is also its own importer.
pub struct InMemoryChain {
	inner: Mutex<ChainInner>,
}

impl Default for InMemoryChain {
	fn default() -> Self {
		Self::new()
	}
}

impl InMemoryChain {
	pub fn new() -> Self {
		let genesis = genesis();
		let hash = genesis.hash();
		let mut inner = ChainInner {
			best: hash,
			finalized: hash,
			..Default::default()
		};
		inner.bodies.insert(hash);
		inner.by_number.insert(0, hash);
		inner.headers.insert(hash, genesis);
		InMemoryChain {
			inner: Mutex::new(inner),
		}
	}

	/// Chain with the given blocks already imported.
	pub fn with_blocks(blocks: &[BlockData]) -> Self {
		let chain = Self::new();
		for block in blocks {
			chain
				.import_block(block, BlockOrigin::NetworkInitialSync)
				.expect("Block imports");
		}
		chain.inner.lock().unwrap().imported.clear();
		chain
	}

	pub fn imported(&self) -> Vec<BlockNumber> {
		self.inner.lock().unwrap().imported.clone()
	}

	pub fn finalize(&self, hash: H256) {
		self.inner.lock().unwrap().finalized = hash;
	}

	pub fn pause(&self) {
		self.inner.lock().unwrap().paused = true;
	}
}

impl BlockState for InMemoryChain {
	fn best_block_header(&self) -> Result<Header> {
		let inner = self.inner.lock().unwrap();
		Ok(inner.headers[&inner.best].clone())
	}

	fn best_block_number(&self) -> Result<BlockNumber> {
		Ok(self.best_block_header()?.number)
	}

	fn has_header(&self, hash: &H256) -> Result<bool> {
		Ok(self.inner.lock().unwrap().headers.contains_key(hash))
	}

	fn has_block_body(&self, hash: &H256) -> Result<bool> {
		Ok(self.inner.lock().unwrap().bodies.contains(hash))
	}

	fn highest_finalized_header(&self) -> Result<Header> {
		let inner = self.inner.lock().unwrap();
		Ok(inner.headers[&inner.finalized].clone())
	}

	fn get_header(&self, hash: &H256) -> Result<Option<Header>> {
		Ok(self.inner.lock().unwrap().headers.get(hash).cloned())
	}

	fn get_hash_by_number(&self, number: BlockNumber) -> Result<Option<H256>> {
		Ok(self.inner.lock().unwrap().by_number.get(&number).copied())
	}

	fn set_justification(&self, hash: &H256, justification: &Justification) -> Result<()> {
		self.inner
			.lock()
			.unwrap()
			.justifications
			.insert(*hash, justification.clone());
		Ok(())
	}

	fn set_finalized_hash(&self, hash: &H256, _round: u64, _set_id: SetId) -> Result<()> {
		self.finalize(*hash);
		Ok(())
	}

	fn is_paused(&self) -> bool {
		self.inner.lock().unwrap().paused
	}
}

impl BlockImporter for InMemoryChain {
	fn import_block(&self, block: &BlockData, _origin: BlockOrigin) -> Result<bool> {
		let mut inner = self.inner.lock().unwrap();
		if inner.headers.contains_key(&block.hash) && inner.bodies.contains(&block.hash) {
			return Ok(false);
		}

		let (Some(header), Some(_)) = (&block.header, &block.body) else {
			return Err(eyre!("Incomplete block {}", block.hash));
		};
		if !inner.headers.contains_key(&header.parent_hash) {
			return Err(eyre!("Unknown parent of block #{}", header.number));
		}

		if header.number > inner.headers[&inner.best].number {
			inner.best = block.hash;
		}
		inner.by_number.insert(header.number, block.hash);
		inner.headers.insert(block.hash, header.clone());
		inner.bodies.insert(block.hash);
		inner.imported.push(header.number);
		Ok(true)
	}
}

/// Network serving a single canonical chain from every connected peer.
pub struct TestNetwork {
	blocks: Vec<BlockData>,
	peers: Vec<PeerId>,
	delay: Duration,
	failing_peers: HashSet<PeerId>,
	warp_proof: Option<WarpProofResponse>,
	requests: AtomicUsize,
	handshakes: AtomicUsize,
	reports: Mutex<Vec<(PeerId, ReputationChange)>>,
}

impl TestNetwork {
	pub fn new(blocks: Vec<BlockData>, peers: Vec<PeerId>) -> Self {
		TestNetwork {
			blocks,
			peers,
			delay: Duration::ZERO,
			failing_peers: HashSet::new(),
			warp_proof: None,
			requests: AtomicUsize::new(0),
			handshakes: AtomicUsize::new(0),
			reports: Mutex::new(vec![]),
		}
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = delay;
		self
	}

	pub fn with_failing_peer(mut self, peer: PeerId) -> Self {
		self.failing_peers.insert(peer);
		self
	}

	pub fn with_warp_proof(mut self, proof: WarpProofResponse) -> Self {
		self.warp_proof = Some(proof);
		self
	}

	pub fn requests(&self) -> usize {
		self.requests.load(Ordering::SeqCst)
	}

	pub fn handshakes(&self) -> usize {
		self.handshakes.load(Ordering::SeqCst)
	}

	pub fn reports(&self) -> Vec<(PeerId, ReputationChange)> {
		self.reports.lock().unwrap().clone()
	}

	fn position(&self, from: &FromBlock) -> Option<usize> {
		match from {
			FromBlock::Number(number) => {
				let index = (*number as usize).checked_sub(1)?;
				(index < self.blocks.len()).then_some(index)
			},
			FromBlock::Hash(hash) => self.blocks.iter().position(|block| block.hash == *hash),
		}
	}

	pub fn serve(&self, request: &BlockRequest) -> BlockResponse {
		let Some(start) = self.position(&request.from) else {
			return BlockResponse::default();
		};
		let max = request.max.unwrap_or(1) as usize;
		let selected: Vec<&BlockData> = match request.direction {
			Direction::Ascending => self.blocks[start..].iter().take(max).collect(),
			Direction::Descending => self.blocks[..=start].iter().rev().take(max).collect(),
		};

		let blocks = selected
			.into_iter()
			.map(|block| BlockData {
				hash: block.hash,
				header: block
					.header
					.clone()
					.filter(|_| request.requests(RequestedData::HEADER)),
				body: block
					.body
					.clone()
					.filter(|_| request.requests(RequestedData::BODY)),
				justification: block
					.justification
					.clone()
					.filter(|_| request.requests(RequestedData::JUSTIFICATION)),
			})
			.collect();
		BlockResponse { blocks }
	}
}

#[async_trait]
impl Network for TestNetwork {
	async fn connected_peers(&self) -> Result<Vec<PeerId>> {
		Ok(self.peers.clone())
	}

	async fn report_peer(&self, change: ReputationChange, who: PeerId) {
		self.reports.lock().unwrap().push((who, change));
	}

	async fn do_request(&self, who: PeerId, request: Request) -> Result<Response, RequestError> {
		self.requests.fetch_add(1, Ordering::SeqCst);
		if !self.delay.is_zero() {
			tokio::time::sleep(self.delay).await;
		}
		if self.failing_peers.contains(&who) {
			return Err(RequestError::Failed("Connection reset".to_string()));
		}

		match request {
			Request::Block(request) => Ok(self.serve(&request).into()),
			Request::WarpProof(_) => self
				.warp_proof
				.clone()
				.map(Response::from)
				.ok_or_else(|| RequestError::Failed("Warp sync not supported".to_string())),
		}
	}

	async fn block_announce_handshake(&self, _best_header: Header) -> Result<()> {
		self.handshakes.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}
