use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use mockall::automock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
	finality::FinalityVerifier,
	state::BlockState,
	types::{BlockData, BlockOrigin, Body, Header, ShortHash},
};

/// Hands ready blocks to the chain.
#[automock]
pub trait BlockImporter: Send + Sync {
	/// Returns `true` when the block was newly imported.
	fn import_block(&self, block: &BlockData, origin: BlockOrigin) -> Result<bool>;
}

/// Executes a block on top of its parent state and persists it.
#[automock]
pub trait BlockExecutor: Send + Sync {
	fn execute_and_import(&self, header: &Header, body: &Body, origin: BlockOrigin) -> Result<()>;
}

/// Importer backed by the local block state, an executor and the finality verifier.
pub struct ChainImporter {
	state: Arc<dyn BlockState>,
	executor: Arc<dyn BlockExecutor>,
	finality: Arc<dyn FinalityVerifier>,
}

impl ChainImporter {
	pub fn new(
		state: Arc<dyn BlockState>,
		executor: Arc<dyn BlockExecutor>,
		finality: Arc<dyn FinalityVerifier>,
	) -> Self {
		ChainImporter {
			state,
			executor,
			finality,
		}
	}

	/// Verifies and stores a justification, marking the block as finalized.
	///
	/// Invalid justifications are logged and ignored.
	fn apply_justification(&self, header: &Header, justification: &[u8]) -> Result<()> {
		if justification.is_empty() {
			return Ok(());
		}

		let hash = header.hash();
		let (round, set_id) = match self
			.finality
			.verify_block_justification(hash, header.number, justification)
		{
			Ok(verified) => verified,
			Err(error) => {
				warn!(block_number = header.number, hash = %ShortHash(&hash), %error, "Failed to verify block justification");
				return Ok(());
			},
		};

		self.state
			.set_justification(&hash, &justification.to_vec())
			.wrap_err("Failed to store justification")?;
		self.state
			.set_finalized_hash(&hash, round, set_id)
			.wrap_err("Failed to set finalized hash")?;

		info!(block_number = header.number, hash = %ShortHash(&hash), "Finalized block");
		Ok(())
	}
}

impl BlockImporter for ChainImporter {
	fn import_block(&self, block: &BlockData, origin: BlockOrigin) -> Result<bool> {
		let Some(header) = &block.header else {
			return Err(eyre!("Cannot import block {} without header", block.hash));
		};

		if self.state.has_header(&block.hash)? && self.state.has_block_body(&block.hash)? {
			debug!(block_number = header.number, hash = %ShortHash(&block.hash), "Skipping block, already imported");
			if let Some(justification) = &block.justification {
				self.apply_justification(header, justification)?;
			}
			return Ok(false);
		}

		let Some(body) = &block.body else {
			return Err(eyre!("Cannot import block {} without body", block.hash));
		};

		if !self.state.has_header(&header.parent_hash)? {
			return Err(eyre!(
				"Failed to get parent header {} of block #{}",
				header.parent_hash,
				header.number
			));
		}

		self.executor
			.execute_and_import(header, body, origin)
			.wrap_err(format!("Failed to execute block #{}", header.number))?;

		debug!(block_number = header.number, hash = %ShortHash(&block.hash), %origin, "Imported block");

		if let Some(justification) = &block.justification {
			self.apply_justification(header, justification)?;
		}

		Ok(true)
	}
}
