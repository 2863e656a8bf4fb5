use color_eyre::Result;
use mockall::automock;
use sp_core::H256;

use crate::types::{AuthorityList, BlockNumber, Header, SetId};

/// Verifies GRANDPA justifications of imported blocks.
#[automock]
pub trait FinalityVerifier: Send + Sync {
	/// Returns the round and authority set id the justification was produced in.
	fn verify_block_justification(
		&self,
		hash: H256,
		number: BlockNumber,
		justification: &[u8],
	) -> Result<(u64, SetId)>;
}

/// Outcome of a successfully verified warp proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WarpVerificationResult {
	pub set_id: SetId,
	pub authorities: AuthorityList,
	/// Last header proven by the fragments.
	pub header: Header,
	/// Proof reaches the latest finalized block.
	pub completed: bool,
}

#[automock]
pub trait WarpProofVerifier: Send + Sync {
	fn verify(
		&self,
		encoded_proof: &[u8],
		set_id: SetId,
		authorities: &AuthorityList,
	) -> Result<WarpVerificationResult>;
}
