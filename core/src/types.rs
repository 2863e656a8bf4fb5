//! Shared block sync structs and enums.
use codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use sp_core::H256;
use std::fmt::{self, Display, Formatter};
use strum::Display as StrumDisplay;

use crate::utils::blake2_256;

pub type BlockNumber = u32;

/// Consensus engine identifier carried by digest items (e.g. `BABE`, `FRNK`).
pub type ConsensusEngineId = [u8; 4];

#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum DigestItem {
	#[codec(index = 6)]
	PreRuntime(ConsensusEngineId, Vec<u8>),
	#[codec(index = 4)]
	Consensus(ConsensusEngineId, Vec<u8>),
	#[codec(index = 5)]
	Seal(ConsensusEngineId, Vec<u8>),
	#[codec(index = 0)]
	Other(Vec<u8>),
	#[codec(index = 8)]
	RuntimeEnvironmentUpdated,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct Digest {
	pub logs: Vec<DigestItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct Header {
	pub parent_hash: H256,
	#[codec(compact)]
	pub number: BlockNumber,
	pub state_root: H256,
	pub extrinsics_root: H256,
	pub digest: Digest,
}

impl Header {
	pub fn new(
		parent_hash: H256,
		state_root: H256,
		extrinsics_root: H256,
		number: BlockNumber,
		digest: Digest,
	) -> Self {
		Header {
			parent_hash,
			number,
			state_root,
			extrinsics_root,
			digest,
		}
	}

	/// Blake2-256 hash of the SCALE encoded header.
	pub fn hash(&self) -> H256 {
		Encode::using_encoded(self, blake2_256).into()
	}
}

/// Opaque encoded extrinsics of a block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct Body(pub Vec<Vec<u8>>);

pub type Justification = Vec<u8>;

/// A block in flight, possibly partial.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockData {
	pub hash: H256,
	pub header: Option<Header>,
	pub body: Option<Body>,
	pub justification: Option<Justification>,
}

impl BlockData {
	pub fn new(header: Header, body: Option<Body>, justification: Option<Justification>) -> Self {
		BlockData {
			hash: header.hash(),
			header: Some(header),
			body,
			justification,
		}
	}

	/// Block data carrying only a hash, to be completed with parts from a later response.
	pub fn from_hash(hash: H256) -> Self {
		BlockData {
			hash,
			header: None,
			body: None,
			justification: None,
		}
	}

	pub fn number(&self) -> Option<BlockNumber> {
		self.header.as_ref().map(|header| header.number)
	}

	pub fn parent_hash(&self) -> Option<H256> {
		self.header.as_ref().map(|header| header.parent_hash)
	}

	pub fn is_complete(&self) -> bool {
		self.header.is_some() && self.body.is_some()
	}
}

/// Origin of a block handed to the importer.
///
/// * `NetworkInitialSync` - block fetched by the sync engine while catching up
/// * `NetworkBroadcast` - block received through gossip
#[derive(Clone, Copy, Debug, PartialEq, Eq, StrumDisplay)]
pub enum BlockOrigin {
	#[strum(serialize = "network-initial-sync")]
	NetworkInitialSync,
	#[strum(serialize = "network-broadcast")]
	NetworkBroadcast,
}

/// GRANDPA authority: ed25519 public key and voting weight.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Authority {
	pub id: [u8; 32],
	pub weight: u64,
}

pub type AuthorityList = Vec<Authority>;

pub type SetId = u64;

/// Short `0x1234…abcd` form of a hash for log lines.
pub struct ShortHash<'a>(pub &'a H256);

impl Display for ShortHash<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let bytes = self.0.as_bytes();
		write!(
			f,
			"0x{}…{}",
			hex::encode(&bytes[..2]),
			hex::encode(&bytes[bytes.len() - 2..])
		)
	}
}

pub mod tracing_level_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::str::FromStr;
	use tracing::Level;

	pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&level.to_string())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		Level::from_str(&value).map_err(serde::de::Error::custom)
	}
}

pub mod duration_seconds_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(duration.as_secs())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = u64::deserialize(deserializer)?;
		Ok(Duration::from_secs(value))
	}
}

pub mod duration_millis_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(duration.as_millis() as u64)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = u64::deserialize(deserializer)?;
		Ok(Duration::from_millis(value))
	}
}

/// Hex encoded block hash as it appears in configuration files.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct HexHash(pub H256);

impl TryFrom<String> for HexHash {
	type Error = color_eyre::Report;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		let trimmed = value.strip_prefix("0x").unwrap_or(&value);
		let bytes = hex::decode(trimmed)?;
		let bytes: [u8; 32] = bytes
			.try_into()
			.map_err(|_| color_eyre::eyre::eyre!("Block hash must be 32 bytes long: {value}"))?;
		Ok(HexHash(H256(bytes)))
	}
}

impl From<HexHash> for String {
	fn from(value: HexHash) -> Self {
		format!("0x{}", hex::encode(value.0.as_bytes()))
	}
}
