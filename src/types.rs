//! Common types and sizes.
//!
//! This module defines the array types and sizes of the messages handled by
//! the receiver, as well as the `BitSlice` type used for bit-level access to
//! message fields.

/// Number of satellites in the Galileo constellation.
pub const NUM_SVNS: usize = 36;

/// Number of nominal pages in an I/NAV sub-frame.
pub const PAGES_PER_SUBFRAME: usize = 15;

/// Size of a nominal I/NAV page in bytes (240 bits; even and odd half-page).
pub const PAGE_BYTES: usize = 30;

/// A nominal I/NAV page (even half-page followed by odd half-page).
pub type PageBits = [u8; PAGE_BYTES];

/// Size of an I/NAV half-page in bytes (120 bits).
pub const HALF_PAGE_BYTES: usize = 15;

/// An I/NAV half-page.
pub type HalfPageBits = [u8; HALF_PAGE_BYTES];

/// Size of an I/NAV word in bytes (128 bits).
pub const INAV_WORD_BYTES: usize = 16;

/// An I/NAV word (the 112 + 16 data bits of a nominal page).
pub type InavWord = [u8; INAV_WORD_BYTES];

/// Size in bytes of the HKROOT section carried by one page (8 bits).
pub const HKROOT_SECTION_BYTES: usize = 1;

/// Size in bytes of the MACK section carried by one page (32 bits).
pub const MACK_SECTION_BYTES: usize = 4;

/// Size in bytes of the 40-bit OSNMA field carried by one page.
pub const OSNMA_FIELD_BYTES: usize = HKROOT_SECTION_BYTES + MACK_SECTION_BYTES;

/// The OSNMA field of a single page.
pub type OsnmaField = [u8; OSNMA_FIELD_BYTES];

/// Size in bytes of an HKROOT message (one sub-frame; 120 bits).
pub const HKROOT_MESSAGE_BYTES: usize = HKROOT_SECTION_BYTES * PAGES_PER_SUBFRAME;

/// An HKROOT message.
pub type HkrootMessage = [u8; HKROOT_MESSAGE_BYTES];

/// Size in bytes of a MACK message (one sub-frame; 480 bits).
pub const MACK_MESSAGE_BYTES: usize = MACK_SECTION_BYTES * PAGES_PER_SUBFRAME;

/// A MACK message.
pub type MackMessage = [u8; MACK_MESSAGE_BYTES];

/// Size in bytes of a DSM block (104 bits).
pub const DSM_BLOCK_BYTES: usize = 13;

/// A DSM block.
pub type DsmBlock = [u8; DSM_BLOCK_BYTES];

/// Size in bytes of a Merkle tree node (SHA-256 output).
pub const MERKLE_TREE_NODE_BYTES: usize = 32;

/// A Merkle tree node.
pub type MerkleTreeNode = [u8; MERKLE_TREE_NODE_BYTES];

/// Bit slice with the ordering used by all the OSNMA messages.
pub type BitSlice = bitvec::slice::BitSlice<u8, bitvec::order::Msb0>;

/// Owned bit vector matching [`BitSlice`].
pub type BitVec = bitvec::vec::BitVec<u8, bitvec::order::Msb0>;
