//! Merkle tree.
//!
//! Public keys received over the air in DSM-PKR messages are pinned to a
//! Merkle tree whose root the user obtains out of band. The DSM-PKR carries
//! the leaf position and the four intermediate nodes needed to reconstruct
//! the root from the candidate key.

use crate::bitfields::DsmPkr;
use crate::types::{MerkleTreeNode, MERKLE_TREE_NODE_BYTES};
use core::fmt;
use sha2::{Digest, Sha256};
use std::io::{self, BufRead};
use std::path::Path;

const MERKLE_TREE_DEPTH: usize = 4;

/// The OSNMA Merkle tree, represented by its pinned root.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MerkleTree {
    root: MerkleTreeNode,
}

impl MerkleTree {
    /// Creates a Merkle tree from its root node.
    pub fn new(root: MerkleTreeNode) -> MerkleTree {
        MerkleTree { root }
    }

    /// Gives the pinned root node.
    pub fn root(&self) -> &MerkleTreeNode {
        &self.root
    }

    /// Loads the pinned root from a text file.
    ///
    /// The first non-empty line must hold the 64 hex digit root node.
    /// Further lines are ignored.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<MerkleTree> {
        let file = std::fs::File::open(path)?;
        for line in io::BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut root = [0u8; MERKLE_TREE_NODE_BYTES];
            hex::decode_to_slice(line, &mut root).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Merkle tree root is not 64 hex digits",
                )
            })?;
            return Ok(MerkleTree::new(root));
        }
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Merkle tree file holds no root",
        ))
    }

    /// Validates a DSM-PKR against this Merkle tree.
    ///
    /// The candidate key is hashed into a leaf and combined with the
    /// intermediate tree nodes of the DSM-PKR; the message ID selects the
    /// concatenation side at each level. Validation succeeds when the
    /// computed root equals the pinned root.
    pub fn validate_pkr(&self, dsm_pkr: &DsmPkr<'_>) -> Result<(), PkrError> {
        let Some(leaf) = dsm_pkr.merkle_tree_leaf() else {
            return Err(PkrError::ReservedField);
        };
        let mut id = dsm_pkr.message_id();
        let mut node = Self::hash_leaf(leaf);
        for j in 0..MERKLE_TREE_DEPTH {
            let itn = dsm_pkr.intermediate_tree_node(j);
            let is_left = id & 1 == 0;
            node = if is_left {
                Self::parent(&node, itn)
            } else {
                Self::parent(itn, &node)
            };
            id >>= 1;
        }
        if node == self.root {
            Ok(())
        } else {
            Err(PkrError::Invalid)
        }
    }

    fn hash_leaf(leaf: &[u8]) -> MerkleTreeNode {
        let mut hash = Sha256::new();
        hash.update(leaf);
        hash.finalize().into()
    }

    fn parent(left: &MerkleTreeNode, right: &MerkleTreeNode) -> MerkleTreeNode {
        let mut hash = Sha256::new();
        hash.update(left);
        hash.update(right);
        hash.finalize().into()
    }
}

/// Errors produced during validation of a DSM-PKR against the Merkle tree.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PkrError {
    /// A field needed to interpret the DSM-PKR holds a reserved value.
    ReservedField,
    /// The computed root does not match the pinned root.
    Invalid,
}

impl fmt::Display for PkrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PkrError::ReservedField => "reserved value present in some field".fmt(f),
            PkrError::Invalid => "wrong calculated Merkle tree root".fmt(f),
        }
    }
}

impl std::error::Error for PkrError {}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    fn merkle_tree() -> MerkleTree {
        // Obtained from OSNMA_MerkleTree_20231213105954_PKID_1.xml
        let root = hex!("0E63F552C8021709043C239032EFFE941BF22C8389032F5F2701E0FBC80148B8");
        MerkleTree::new(root)
    }

    #[test]
    fn message_0() {
        // DSM-PKR broadcast on 2023-12-12 12:00 UTC
        let mut dsm_buf = hex!(
            "
            70 01 63 1b dc ed 79 d4 31 7b c2 87 0e e3 89 5b
            d5 9c f2 b6 ea 51 6f ab bf df 1d 73 96 26 14 6f
            fe 31 6f a9 28 5f 5a 1e 44 04 24 13 bd af 18 aa
            3c f6 84 72 33 97 d7 b8 32 5a ec a1 eb ca 9f 0f
            64 99 05 42 4c be 48 2a 1a 32 b0 10 64 f8 5d 0c
            36 df 03 8e 52 ce 12 8e 7e c5 f3 23 e1 65 b1 82
            a7 15 37 bd b0 10 97 2e b4 a3 b9 0b aa cd 14 94
            1e f4 0d a2 cb 2b 82 d3 78 b3 15 c0 08 de ce fd
            8e 11 03 74 a9 25 cf a0 ff 18 05 e5 c5 a5 8f db
            a3 1b f0 14 5d 5b 5b e2 f0 62 d3 f8 bb 2e e9 8f
            0f 6d b0 e8 23 c5 e7 5e 78"
        );
        let mtree = merkle_tree();
        assert_eq!(mtree.validate_pkr(&DsmPkr(&dsm_buf)), Ok(()));
        // inject error
        dsm_buf[40] ^= 1;
        assert_eq!(mtree.validate_pkr(&DsmPkr(&dsm_buf)), Err(PkrError::Invalid));
    }

    #[test]
    fn message_1() {
        // DSM-PKR broadcast on 2023-12-15 00:00 UTC
        let mut dsm_buf = hex!(
            "
            71 e5 53 0a 33 d5 cb 60 c9 50 16 b8 ae c7 45 93
            db cd f2 71 1d 39 9e a2 48 69 17 3c a2 29 37 9a
            15 31 6f a9 28 5f 5a 1e 44 04 24 13 bd af 18 aa
            3c f6 84 72 33 97 d7 b8 32 5a ec a1 eb ca 9f 0f
            64 99 05 42 4c be 48 2a 1a 32 b0 10 64 f8 5d 0c
            36 df 03 8e 52 ce 12 8e 7e c5 f3 23 e1 65 b1 82
            a7 15 37 bd b0 10 97 2e b4 a3 b9 0b aa cd 14 94
            1e f4 0d a2 cb 2b 82 d3 78 b3 15 c0 08 de ce fd
            8e 12 03 35 78 e5 c7 11 a9 c3 bd dd 1c a4 ee 85
            f7 c5 1b 36 78 97 cb 40 b8 85 68 a0 c8 97 da 30
            ef b7 c3 24 e0 22 2c 90 80"
        );
        let mtree = merkle_tree();
        assert_eq!(mtree.validate_pkr(&DsmPkr(&dsm_buf)), Ok(()));
        // inject error
        dsm_buf[123] ^= 1;
        assert_eq!(mtree.validate_pkr(&DsmPkr(&dsm_buf)), Err(PkrError::Invalid));
    }
}
