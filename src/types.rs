//! Wire types shared by every engine (§3, §6).
//!
//! Hashes are already uniformly distributed (SHA-256 outputs, including the
//! spend-database key in [`OutputPoint::spend_key`]), so bucket indices are
//! derived by reading the leading eight bytes of the key as a little-endian
//! `u64` and reducing modulo the bucket count, rather than hashing the key a
//! second time. Mirrors `original_source/src/utility/`'s `remainder` helper,
//! which reduces a hash value directly rather than re-hashing it.
use sha2::{Digest, Sha256};

pub const HASH_LEN: usize = 32;
pub const SHORT_HASH_LEN: usize = 20;

pub type Hash256 = [u8; HASH_LEN];
pub type ShortHash = [u8; SHORT_HASH_LEN];

/// Double SHA-256, the hash used for block and transaction identifiers
/// throughout the original chain format.
pub fn hash256(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

/// Reduce a key's leading bytes to a bucket index. `key` must be at least 8
/// bytes (every key type in this crate is: 32-byte hashes or 20-byte short
/// hashes).
pub fn short_hash_u64(key: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&key[..8]);
    u64::from_le_bytes(buf)
}

/// An output being spent: the transaction hash plus the output index within
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPoint {
    pub hash: Hash256,
    pub index: u32,
}

impl OutputPoint {
    pub const SERIALIZED_LEN: usize = HASH_LEN + 4;

    pub fn to_bytes(&self) -> [u8; Self::SERIALIZED_LEN] {
        let mut out = [0u8; Self::SERIALIZED_LEN];
        out[..HASH_LEN].copy_from_slice(&self.hash);
        out[HASH_LEN..].copy_from_slice(&self.index.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; Self::SERIALIZED_LEN]) -> Self {
        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(&bytes[..HASH_LEN]);
        let index = u32::from_le_bytes(bytes[HASH_LEN..].try_into().unwrap());
        Self { hash, index }
    }

    /// Spend-database key: SHA-256 of the full 36-byte outpoint (the 32-byte
    /// `hash` followed by the 4-byte little-endian `index`), not just the
    /// 32-byte `hash` alone. Two outputs of the same transaction — which
    /// would otherwise differ only in their low-entropy trailing `index`
    /// bytes — land in unrelated, well-distributed buckets this way.
    ///
    /// Exact formula grounded on `original_source/src/database/spend_database.cpp`'s
    /// `output_to_hash()`.
    pub fn spend_key(&self) -> Hash256 {
        Sha256::digest(self.to_bytes()).into()
    }

    /// History-row checksum: `index` written little-endian over the first
    /// four bytes of `hash`, read back as a little-endian `u64`, with the top
    /// bit cleared. Unlike [`Self::spend_key`] this never hashes — it's a
    /// cheap correlator linking a spend row back to the output row it
    /// consumes, not a bucket key.
    ///
    /// Exact formula grounded on `original_source/src/block.cpp`'s
    /// `checksum(output_point)`, as used by `history_database.cpp`.
    pub fn checksum(&self) -> u64 {
        let mut mutated = self.hash;
        mutated[..4].copy_from_slice(&self.index.to_le_bytes());
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&mutated[..8]);
        let value = u64::from_le_bytes(buf);
        value & (u64::MAX >> 1)
    }
}

/// The location of an input that spends some `OutputPoint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputPoint {
    pub hash: Hash256,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub previous_block_hash: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub const SERIALIZED_LEN: usize = 4 + HASH_LEN + HASH_LEN + 4 + 4 + 4;

    pub fn to_bytes(&self) -> [u8; Self::SERIALIZED_LEN] {
        let mut out = [0u8; Self::SERIALIZED_LEN];
        let mut pos = 0;
        out[pos..pos + 4].copy_from_slice(&self.version.to_le_bytes());
        pos += 4;
        out[pos..pos + HASH_LEN].copy_from_slice(&self.previous_block_hash);
        pos += HASH_LEN;
        out[pos..pos + HASH_LEN].copy_from_slice(&self.merkle_root);
        pos += HASH_LEN;
        out[pos..pos + 4].copy_from_slice(&self.timestamp.to_le_bytes());
        pos += 4;
        out[pos..pos + 4].copy_from_slice(&self.bits.to_le_bytes());
        pos += 4;
        out[pos..pos + 4].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; Self::SERIALIZED_LEN]) -> Self {
        let mut pos = 0;
        let version = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let mut previous_block_hash = [0u8; HASH_LEN];
        previous_block_hash.copy_from_slice(&bytes[pos..pos + HASH_LEN]);
        pos += HASH_LEN;
        let mut merkle_root = [0u8; HASH_LEN];
        merkle_root.copy_from_slice(&bytes[pos..pos + HASH_LEN]);
        pos += HASH_LEN;
        let timestamp = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let bits = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let nonce = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        Self {
            version,
            previous_block_hash,
            merkle_root,
            timestamp,
            bits,
            nonce,
        }
    }

    pub fn hash(&self) -> Hash256 {
        hash256(&self.to_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub previous_output: OutputPoint,
    pub script: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub script: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub locktime: u32,
}

impl Transaction {
    /// Raw, already-serialized bytes — used when the caller already has an
    /// encoded transaction and only the storage engine's hash is needed.
    pub fn hash_of(raw: &[u8]) -> Hash256 {
        hash256(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_bytes() {
        let header = BlockHeader {
            version: 1,
            previous_block_hash: [1u8; HASH_LEN],
            merkle_root: [2u8; HASH_LEN],
            timestamp: 1_600_000_000,
            bits: 0x1d00ffff,
            nonce: 42,
        };
        let bytes = header.to_bytes();
        assert_eq!(BlockHeader::from_bytes(&bytes), header);
    }

    #[test]
    fn checksum_differs_for_differing_index_with_same_hash() {
        let base = [7u8; HASH_LEN];
        let a = OutputPoint { hash: base, index: 0 };
        let b = OutputPoint { hash: base, index: 1 };
        assert_ne!(a.checksum(), b.checksum());
    }

    #[test]
    fn checksum_is_deterministic() {
        let point = OutputPoint { hash: [3u8; HASH_LEN], index: 7 };
        assert_eq!(point.checksum(), point.checksum());
    }

    #[test]
    fn checksum_top_bit_is_always_clear() {
        let point = OutputPoint { hash: [255u8; HASH_LEN], index: u32::MAX };
        assert_eq!(point.checksum() & (1 << 63), 0);
    }
}
