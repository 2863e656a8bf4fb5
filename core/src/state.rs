use color_eyre::Result;
use mockall::automock;
use sp_core::H256;

use crate::types::{BlockNumber, Header, Justification, SetId};

/// Read and finalization access to the local chain storage.
#[automock]
pub trait BlockState: Send + Sync {
	fn best_block_header(&self) -> Result<Header>;
	fn best_block_number(&self) -> Result<BlockNumber>;
	fn has_header(&self, hash: &H256) -> Result<bool>;
	fn has_block_body(&self, hash: &H256) -> Result<bool>;
	fn highest_finalized_header(&self) -> Result<Header>;
	fn get_header(&self, hash: &H256) -> Result<Option<Header>>;
	fn get_hash_by_number(&self, number: BlockNumber) -> Result<Option<H256>>;
	fn set_justification(&self, hash: &H256, justification: &Justification) -> Result<()>;
	fn set_finalized_hash(&self, hash: &H256, round: u64, set_id: SetId) -> Result<()>;
	/// Storage is paused during shutdown or maintenance.
	fn is_paused(&self) -> bool;
}
