//! Block content addressing: hash and on-store path layout.
//!
//! The path is a pure function of the block hash and is used verbatim as
//! the object key on every backend, so a block lives at exactly one key no
//! matter which vendor hosts it.

use sha2::{Digest, Sha256};

/// Leading hash characters used for directory fan-out.
const SHARD_PREFIX_LEN: usize = 2;

/// SHA-256 of the block contents, hex encoded. This is the storage key and
/// the wire identity of the block.
pub fn block_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Object key for a block: `block/<shard>/<hash>`.
pub fn block_path(hash: &str) -> String {
    let shard = &hash[..SHARD_PREFIX_LEN.min(hash.len())];
    format!("block/{}/{}", shard, hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_hex_sha256() {
        // Known SHA-256 vectors.
        assert_eq!(
            block_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            block_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn path_shards_by_hash_prefix() {
        let hash = block_hash(b"abc");
        assert_eq!(
            block_path(&hash),
            format!("block/ba/{}", hash)
        );
    }

    #[test]
    fn path_is_a_pure_function_of_the_hash() {
        let hash = block_hash(b"same input");
        assert_eq!(block_path(&hash), block_path(&hash));
    }
}
