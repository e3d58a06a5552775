//! Message bit fields.
//!
//! This module contains structures that give access to each of the fields in
//! the messages used by OSNMA. As a general rule, the structures are a thin
//! wrapper over a byte or a `&[u8]` and decode fields on demand.

use crate::types::{BitSlice, MackMessage, MerkleTreeNode, MERKLE_TREE_NODE_BYTES};
use crate::{Gst, Towh, Wn};
use bitvec::prelude::*;
use core::fmt;
use sha2::{Digest, Sha256};

/// Status of the NMA chain.
///
/// The values of the NMAS field of the [`NmaHeader`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum NmaStatus {
    /// Reserved value (NMAS = 0).
    Reserved,
    /// Test (NMAS = 1).
    Test,
    /// Operational (NMAS = 2).
    Operational,
    /// Don't use (NMAS = 3).
    DontUse,
}

impl NmaStatus {
    /// Gives the 2-bit wire value of the NMAS field.
    pub fn value(&self) -> u8 {
        match self {
            NmaStatus::Reserved => 0,
            NmaStatus::Test => 1,
            NmaStatus::Operational => 2,
            NmaStatus::DontUse => 3,
        }
    }
}

/// Chain and Public Key status.
///
/// The values of the CPKS field of the [`NmaHeader`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ChainAndPubkeyStatus {
    /// Reserved value (CPKS = 0 or 7).
    Reserved,
    /// Nominal (CPKS = 1).
    Nominal,
    /// End of chain (CPKS = 2).
    EndOfChain,
    /// Chain revoked (CPKS = 3).
    ChainRevoked,
    /// New public key (CPKS = 4).
    NewPublicKey,
    /// Public key revoked (CPKS = 5).
    PublicKeyRevoked,
    /// New Merkle tree (CPKS = 6).
    NewMerkleTree,
}

/// NMA header.
///
/// The first byte of an HKROOT message.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct NmaHeader(pub u8);

impl NmaHeader {
    fn bits(&self) -> &BitSlice {
        BitSlice::from_element(&self.0)
    }

    /// Gives the value of the NMAS field.
    pub fn nma_status(&self) -> NmaStatus {
        match self.bits()[..2].load_be::<u8>() {
            1 => NmaStatus::Test,
            2 => NmaStatus::Operational,
            3 => NmaStatus::DontUse,
            _ => NmaStatus::Reserved,
        }
    }

    /// Gives the value of the CID field.
    pub fn chain_id(&self) -> u8 {
        self.bits()[2..4].load_be()
    }

    /// Gives the value of the CPKS field.
    pub fn chain_and_pubkey_status(&self) -> ChainAndPubkeyStatus {
        match self.bits()[4..7].load_be::<u8>() {
            1 => ChainAndPubkeyStatus::Nominal,
            2 => ChainAndPubkeyStatus::EndOfChain,
            3 => ChainAndPubkeyStatus::ChainRevoked,
            4 => ChainAndPubkeyStatus::NewPublicKey,
            5 => ChainAndPubkeyStatus::PublicKeyRevoked,
            6 => ChainAndPubkeyStatus::NewMerkleTree,
            _ => ChainAndPubkeyStatus::Reserved,
        }
    }

    /// Returns true when neither the NMAS nor the CPKS field holds a reserved
    /// value, so the header can be acted upon.
    pub fn usable(&self) -> bool {
        self.nma_status() != NmaStatus::Reserved
            && self.chain_and_pubkey_status() != ChainAndPubkeyStatus::Reserved
    }
}

impl fmt::Debug for NmaHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NmaHeader")
            .field("nma_status", &self.nma_status())
            .field("chain_id", &self.chain_id())
            .field("chain_and_pubkey_status", &self.chain_and_pubkey_status())
            .finish()
    }
}

/// Type of a DSM message, derived from the DSM ID field.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DsmType {
    /// DSM-KROOT (DSM IDs 0 to 11), carrying a signed TESLA root key.
    Kroot,
    /// DSM-PKR (DSM IDs 12 to 15), carrying a new ECDSA public key.
    Pkr,
}

/// DSM header.
///
/// The second byte of an HKROOT message.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct DsmHeader(pub u8);

impl DsmHeader {
    fn bits(&self) -> &BitSlice {
        BitSlice::from_element(&self.0)
    }

    /// Gives the value of the DSM ID field.
    pub fn dsm_id(&self) -> u8 {
        self.bits()[..4].load_be()
    }

    /// Gives the value of the DSM block ID field.
    pub fn dsm_block_id(&self) -> u8 {
        self.bits()[4..8].load_be()
    }

    /// Gives the type of DSM message, according to the DSM ID field.
    pub fn dsm_type(&self) -> DsmType {
        if self.dsm_id() >= 12 {
            DsmType::Pkr
        } else {
            DsmType::Kroot
        }
    }
}

impl fmt::Debug for DsmHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DsmHeader")
            .field("dsm_id", &self.dsm_id())
            .field("dsm_block_id", &self.dsm_block_id())
            .finish()
    }
}

/// Hash function, from the HF field of the DSM-KROOT message.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HashFunction {
    /// SHA-256 (HF = 0).
    Sha256,
    /// SHA3-256 (HF = 2).
    Sha3_256,
    /// Reserved value (HF = 1, 3).
    Reserved,
}

/// MAC function, from the MF field of the DSM-KROOT message.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MacFunction {
    /// HMAC-SHA-256 (MF = 0).
    HmacSha256,
    /// CMAC-AES (MF = 1).
    CmacAes,
    /// Reserved value (MF = 2, 3).
    Reserved,
}

/// ECDSA function used for the digital signature of a DSM-KROOT.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EcdsaFunction {
    /// ECDSA P-256/SHA-256.
    P256Sha256,
    /// ECDSA P-521/SHA-512.
    P521Sha512,
}

/// DSM-KROOT message.
///
/// A wrapper over a slice holding a reassembled DSM-KROOT.
///
/// # Panics
///
/// The slice should be long enough to contain the full DSM-KROOT message.
/// Otherwise the methods of `DsmKroot` may panic.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct DsmKroot<'a>(pub &'a [u8]);

impl DsmKroot<'_> {
    fn bits(&self) -> &BitSlice {
        BitSlice::from_slice(self.0)
    }

    /// Gives the number of DSM-KROOT blocks, from the NB_DK field.
    ///
    /// If the NB_DK field contains a reserved value, `None` is returned.
    pub fn number_of_blocks(&self) -> Option<usize> {
        match self.bits()[..4].load_be::<u8>() {
            v @ 1..=8 => Some(usize::from(v) + 6),
            _ => None, // reserved value
        }
    }

    /// Gives the value of the PKID (public key ID) field.
    pub fn public_key_id(&self) -> u8 {
        self.bits()[4..8].load_be()
    }

    /// Gives the value of the CIDKR (KROOT chain ID) field.
    pub fn chain_id(&self) -> u8 {
        self.bits()[8..10].load_be()
    }

    /// Gives the value of the hash function field.
    pub fn hash_function(&self) -> HashFunction {
        match self.bits()[12..14].load_be::<u8>() {
            0 => HashFunction::Sha256,
            2 => HashFunction::Sha3_256,
            _ => HashFunction::Reserved,
        }
    }

    /// Gives the value of the MAC function field.
    pub fn mac_function(&self) -> MacFunction {
        match self.bits()[14..16].load_be::<u8>() {
            0 => MacFunction::HmacSha256,
            1 => MacFunction::CmacAes,
            _ => MacFunction::Reserved,
        }
    }

    /// Gives the TESLA key size in bits, from the KS field.
    ///
    /// If the KS field contains a reserved value, `None` is returned.
    pub fn key_size(&self) -> Option<usize> {
        // all the defined key sizes are a multiple of 8 bits
        match self.bits()[16..20].load_be::<u8>() {
            0 => Some(96),
            1 => Some(104),
            2 => Some(112),
            3 => Some(120),
            4 => Some(128),
            5 => Some(160),
            6 => Some(192),
            7 => Some(224),
            8 => Some(256),
            _ => None,
        }
    }

    /// Gives the MAC tag size in bits, from the TS field.
    ///
    /// If the TS field contains a reserved value, `None` is returned.
    pub fn tag_size(&self) -> Option<usize> {
        match self.bits()[20..24].load_be::<u8>() {
            5 => Some(20),
            6 => Some(24),
            7 => Some(28),
            8 => Some(32),
            9 => Some(40),
            _ => None,
        }
    }

    /// Gives the value of the MACLT (MAC look-up table) field.
    pub fn mac_lookup_table(&self) -> u8 {
        self.bits()[24..32].load_be()
    }

    /// Gives the KROOT week number (WNK field).
    pub fn kroot_wn(&self) -> Wn {
        self.bits()[36..48].load_be()
    }

    /// Gives the KROOT time of week in hours (TOWHK field).
    pub fn kroot_towh(&self) -> Towh {
        self.bits()[48..56].load_be()
    }

    /// Gives the GST at which the chain becomes applicable.
    pub fn chain_gst0(&self) -> Gst {
        Gst::new(self.kroot_wn(), u32::from(self.kroot_towh()) * 3600)
    }

    /// Gives the 48-bit random pattern alpha, in a `u64`.
    pub fn alpha(&self) -> u64 {
        self.bits()[56..104].load_be()
    }

    /// Returns a slice reference to the KROOT field.
    ///
    /// # Panics
    ///
    /// Panics if the key size field contains a reserved value.
    pub fn kroot(&self) -> &[u8] {
        let size = self
            .key_size()
            .expect("attempted to extract kroot of DSM with reserved key size");
        &self.0[13..13 + size / 8]
    }

    /// Returns the ECDSA function used by this DSM-KROOT message.
    ///
    /// Although the ICD is not explicit about this, the ECDSA function can be
    /// deduced from the size of the signature, since the remaining length
    /// after the KROOT field is signature plus padding to a block boundary.
    ///
    /// If the remaining length matches neither a P-256 nor a P-521 signature,
    /// `None` is returned.
    pub fn ecdsa_function(&self) -> Option<EcdsaFunction> {
        let fixed_len = 13;
        let block = 13;
        let kroot_len = self.kroot().len();
        let remaining = self.0.len() - fixed_len - kroot_len;
        let p256_bytes = 64; // 512 bits
        let p521_bytes = 132; // 1056 bits
        let p256_padding = (block - (kroot_len + p256_bytes) % block) % block;
        let p521_padding = (block - (kroot_len + p521_bytes) % block) % block;
        if remaining == p256_bytes + p256_padding {
            Some(EcdsaFunction::P256Sha256)
        } else if remaining == p521_bytes + p521_padding {
            Some(EcdsaFunction::P521Sha512)
        } else {
            None
        }
    }

    /// Returns a slice reference to the digital signature (DS) field.
    ///
    /// If the ECDSA function cannot be deduced, `None` is returned.
    pub fn digital_signature(&self) -> Option<&[u8]> {
        let size = match self.ecdsa_function()? {
            EcdsaFunction::P256Sha256 => 64,
            EcdsaFunction::P521Sha512 => 132,
        };
        let start = 13 + self.kroot().len();
        Some(&self.0[start..start + size])
    }

    /// Gives the contents of the padding (P_DK) field.
    pub fn padding(&self) -> Option<&[u8]> {
        let start = 13 + self.kroot().len() + self.digital_signature()?.len();
        Some(&self.0[start..])
    }

    /// Builds the message over which the digital signature is computed.
    ///
    /// The message is the NMA header followed by the DSM-KROOT contents from
    /// the CIDKR field up to and including the KROOT field.
    pub fn signature_message(&self, nma_header: NmaHeader) -> Vec<u8> {
        let end = 13 + self.kroot().len();
        let mut m = Vec::with_capacity(end);
        m.push(nma_header.0);
        // the NB_DK and PKID fields in the first byte are skipped
        m.extend_from_slice(&self.0[1..end]);
        m
    }

    /// Checks the contents of the padding field.
    ///
    /// The padding is the truncated SHA-256 of the signature message followed
    /// by the signature itself.
    pub fn check_padding(&self, nma_header: NmaHeader) -> bool {
        let (Some(ds), Some(padding)) = (self.digital_signature(), self.padding()) else {
            return false;
        };
        let mut hash = Sha256::new();
        hash.update(self.signature_message(nma_header));
        hash.update(ds);
        let hash = hash.finalize();
        &hash[..padding.len()] == padding
    }
}

impl fmt::Debug for DsmKroot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DsmKroot")
            .field("number_of_blocks", &self.number_of_blocks())
            .field("public_key_id", &self.public_key_id())
            .field("chain_id", &self.chain_id())
            .field("hash_function", &self.hash_function())
            .field("mac_function", &self.mac_function())
            .field("key_size", &self.key_size())
            .field("tag_size", &self.tag_size())
            .field("mac_lookup_table", &self.mac_lookup_table())
            .field("kroot_wn", &self.kroot_wn())
            .field("kroot_towh", &self.kroot_towh())
            .field("alpha", &self.alpha())
            .field("kroot", &self.kroot())
            .field("digital_signature", &self.digital_signature())
            .field("padding", &self.padding())
            .finish()
    }
}

/// New Public Key Type (NPKT) field of the DSM-PKR message.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum NewPublicKeyType {
    /// An ECDSA key.
    EcdsaKey(EcdsaFunction),
    /// OSNMA Alert Message (OAM).
    OsnmaAlertMessage,
    /// Reserved value.
    Reserved,
}

/// DSM-PKR message.
///
/// A wrapper over a slice holding a reassembled DSM-PKR.
///
/// # Panics
///
/// The slice should be long enough to contain the full DSM-PKR message.
/// Otherwise the methods of `DsmPkr` may panic.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct DsmPkr<'a>(pub &'a [u8]);

impl DsmPkr<'_> {
    fn bits(&self) -> &BitSlice {
        BitSlice::from_slice(self.0)
    }

    /// Gives the number of DSM-PKR blocks, from the NB_DP field.
    ///
    /// If the NB_DP field contains a reserved value, `None` is returned.
    pub fn number_of_blocks(&self) -> Option<usize> {
        match self.bits()[..4].load_be::<u8>() {
            v @ 7..=10 => Some(usize::from(v) + 6),
            _ => None, // reserved value
        }
    }

    /// Gives the value of the Message ID (MID) field.
    pub fn message_id(&self) -> u8 {
        self.bits()[4..8].load_be()
    }

    /// Gives one of the four 256-bit intermediate tree nodes.
    ///
    /// # Panics
    ///
    /// Panics if `node_number` is not 0, 1, 2, or 3.
    pub fn intermediate_tree_node(&self, node_number: usize) -> &MerkleTreeNode {
        assert!(node_number < 4);
        let start = 1 + node_number * MERKLE_TREE_NODE_BYTES;
        (&self.0[start..start + MERKLE_TREE_NODE_BYTES])
            .try_into()
            .unwrap()
    }

    /// Gives the value of the New Public Key Type (NPKT) field.
    pub fn new_public_key_type(&self) -> NewPublicKeyType {
        match self.bits()[1032..1036].load_be::<u8>() {
            1 => NewPublicKeyType::EcdsaKey(EcdsaFunction::P256Sha256),
            3 => NewPublicKeyType::EcdsaKey(EcdsaFunction::P521Sha512),
            4 => NewPublicKeyType::OsnmaAlertMessage,
            _ => NewPublicKeyType::Reserved,
        }
    }

    /// Gives the value of the New Public Key ID (NPKID) field.
    pub fn new_public_key_id(&self) -> u8 {
        self.bits()[1036..1040].load_be()
    }

    /// Gives the size of the New Public Key field in bytes.
    ///
    /// If the NPKT field contains a reserved value, `None` is returned.
    pub fn key_size(&self) -> Option<usize> {
        match self.new_public_key_type() {
            NewPublicKeyType::EcdsaKey(EcdsaFunction::P256Sha256) => Some(264 / 8),
            NewPublicKeyType::EcdsaKey(EcdsaFunction::P521Sha512) => Some(536 / 8),
            NewPublicKeyType::OsnmaAlertMessage => {
                self.number_of_blocks().map(|n| n * (104 / 8) - 1040 / 8)
            }
            NewPublicKeyType::Reserved => None,
        }
    }

    /// Gives a slice containing the New Public Key field, if its size can be
    /// determined.
    pub fn new_public_key(&self) -> Option<&[u8]> {
        self.key_size().map(|s| &self.0[1040 / 8..1040 / 8 + s])
    }

    /// Gives a slice containing the padding field, if its size can be
    /// determined.
    pub fn padding(&self) -> Option<&[u8]> {
        if let (Some(ks), Some(nb)) = (self.key_size(), self.number_of_blocks()) {
            Some(&self.0[1040 / 8 + ks..nb * 104 / 8])
        } else {
            None
        }
    }

    /// Gives the Merkle tree leaf corresponding to this message
    /// (NPKT || NPKID || NPK).
    pub fn merkle_tree_leaf(&self) -> Option<&[u8]> {
        self.key_size().map(|s| &self.0[1032 / 8..1040 / 8 + s])
    }

    /// Checks the contents of the padding field against the Merkle tree root.
    pub fn check_padding(&self, merkle_tree_root: &MerkleTreeNode) -> bool {
        let Some(padding) = self.padding() else {
            return false;
        };
        if padding.is_empty() {
            // OSNMA Alert Messages have an empty padding field
            return true;
        }
        let mut hash = Sha256::new();
        hash.update(merkle_tree_root);
        // merkle_tree_leaf does not return None, because padding() did not
        hash.update(self.merkle_tree_leaf().unwrap());
        let hash = hash.finalize();
        &hash[..padding.len()] == padding
    }
}

impl fmt::Debug for DsmPkr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DsmPkr")
            .field("number_of_blocks", &self.number_of_blocks())
            .field("message_id", &self.message_id())
            .field("new_public_key_type", &self.new_public_key_type())
            .field("new_public_key_id", &self.new_public_key_id())
            .field("new_public_key", &self.new_public_key())
            .field("padding", &self.padding())
            .finish()
    }
}

/// PRND field of a Tag-Info section.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Prnd {
    /// Galileo SVID (PRND = 1 - 36).
    GalileoSvid(u8),
    /// Galileo constellation-related information (PRND = 255).
    GalileoConstellation,
    /// Reserved value.
    Reserved,
}

impl TryFrom<Prnd> for u8 {
    type Error = ();
    fn try_from(value: Prnd) -> Result<u8, ()> {
        match value {
            Prnd::GalileoSvid(svid) => Ok(svid),
            Prnd::GalileoConstellation => Ok(255),
            Prnd::Reserved => Err(()),
        }
    }
}

/// ADKD (Authentication Data and Key Delay) field of a Tag-Info section.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Adkd {
    /// Galileo I/NAV ephemeris, clock and status (ADKD = 0).
    InavCed,
    /// Galileo I/NAV timing parameters (ADKD = 4).
    InavTiming,
    /// Slow MAC. Galileo I/NAV ephemeris, clock and status (ADKD = 12).
    SlowMac,
    /// Reserved value.
    Reserved,
}

impl Adkd {
    /// Gives the numeric value of the ADKD field.
    pub fn value(&self) -> u8 {
        match self {
            Adkd::InavCed => 0,
            Adkd::InavTiming => 4,
            Adkd::SlowMac => 12,
            Adkd::Reserved => 15,
        }
    }

    /// Gives the key delay in sub-frames between a tag and the TESLA key that
    /// verifies it.
    pub fn key_delay(&self) -> u32 {
        match self {
            Adkd::SlowMac => 11,
            _ => 1,
        }
    }
}

/// MACK message.
///
/// Interpreting the MACK message requires the key and tag sizes of the
/// current TESLA chain, so `Mack` holds these values along with the data.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Mack<'a> {
    data: &'a BitSlice,
    key_size: usize,
    tag_size: usize,
}

impl<'a> Mack<'a> {
    /// Constructs a new MACK message.
    ///
    /// The `key_size` and `tag_size` in bits should be taken from the
    /// parameters of the current TESLA chain.
    pub fn new(data: &'a MackMessage, key_size: usize, tag_size: usize) -> Mack<'a> {
        Mack {
            data: BitSlice::from_slice(data),
            key_size,
            tag_size,
        }
    }

    /// Gives the key size in bits used to interpret the MACK message.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Gives the tag size in bits used to interpret the MACK message.
    pub fn tag_size(&self) -> usize {
        self.tag_size
    }

    /// Gives the tag0 field from the MACK header.
    pub fn tag0(&self) -> &BitSlice {
        &self.data[..self.tag_size]
    }

    /// Gives the 12-bit MACSEQ field from the MACK header.
    pub fn macseq(&self) -> u16 {
        self.data[self.tag_size..self.tag_size + 12].load_be()
    }

    /// Gives the 4-bit COP field from the MACK header (applies to tag0).
    pub fn cop(&self) -> u8 {
        let offset = self.tag_size + 12;
        self.data[offset..offset + 4].load_be()
    }

    /// Returns the number of tags in the MACK message.
    pub fn num_tags(&self) -> usize {
        (self.data.len() - self.key_size) / (self.tag_size + 16)
    }

    /// Gives one of the Tag-Info sections of the MACK message.
    ///
    /// The first Tag-Info has `n = 1`; `n = 0` would correspond to the tag0
    /// field, which has no info section and is obtained with [`Mack::tag0`].
    ///
    /// # Panics
    ///
    /// Panics if `n` is not between 1 and `self.num_tags() - 1`.
    pub fn tag_and_info(&self, n: usize) -> TagAndInfo<'a> {
        assert!(0 < n && n < self.num_tags());
        let data = self.data;
        let size = self.tag_size + 16;
        TagAndInfo {
            data: &data[size * n..size * (n + 1)],
        }
    }

    /// Gives the Key field of the MACK message, holding a disclosed TESLA key.
    pub fn key(&self) -> &'a BitSlice {
        let data = self.data;
        let start = (self.tag_size + 16) * self.num_tags();
        &data[start..start + self.key_size]
    }
}

impl fmt::Debug for Mack<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Mack");
        dbg.field("tag0", &self.tag0())
            .field("macseq", &self.macseq())
            .field("cop", &self.cop());
        for tag in 1..self.num_tags() {
            dbg.field("tag", &self.tag_and_info(tag));
        }
        dbg.field("key", &self.key()).finish()
    }
}

/// Tag-Info section of a MACK message.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct TagAndInfo<'a> {
    data: &'a BitSlice,
}

impl<'a> TagAndInfo<'a> {
    /// Gives the tag field.
    pub fn tag(&self) -> &'a BitSlice {
        let data = self.data;
        &data[..data.len() - 16]
    }

    /// Gives the 16-bit info section (PRND || ADKD || COP).
    pub fn info(&self) -> &'a BitSlice {
        let data = self.data;
        &data[data.len() - 16..]
    }

    /// Gives the value of the PRND field.
    pub fn prnd(&self) -> Prnd {
        let len = self.data.len();
        match self.data[len - 16..len - 8].load_be::<u8>() {
            n @ 1..=36 => Prnd::GalileoSvid(n),
            255 => Prnd::GalileoConstellation,
            _ => Prnd::Reserved,
        }
    }

    /// Gives the value of the ADKD field.
    pub fn adkd(&self) -> Adkd {
        let len = self.data.len();
        match self.data[len - 8..len - 4].load_be::<u8>() {
            0 => Adkd::InavCed,
            4 => Adkd::InavTiming,
            12 => Adkd::SlowMac,
            _ => Adkd::Reserved,
        }
    }

    /// Gives the value of the COP field.
    pub fn cop(&self) -> u8 {
        let len = self.data.len();
        self.data[len - 4..].load_be()
    }
}

impl fmt::Debug for TagAndInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagAndInfo")
            .field("tag", &self.tag())
            .field("prnd", &self.prnd())
            .field("adkd", &self.adkd())
            .field("cop", &self.cop())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn nma_header() {
        // NMA header broadcast on 2022-03-07
        let nma_header = NmaHeader(0x52);
        assert_eq!(nma_header.nma_status(), NmaStatus::Test);
        assert_eq!(nma_header.chain_id(), 1);
        assert_eq!(
            nma_header.chain_and_pubkey_status(),
            ChainAndPubkeyStatus::Nominal
        );
        assert!(nma_header.usable());
        assert!(!NmaHeader(0x12).usable());
    }

    #[test]
    fn dsm_header() {
        let dsm_header = DsmHeader(0x17);
        assert_eq!(dsm_header.dsm_id(), 1);
        assert_eq!(dsm_header.dsm_block_id(), 7);
        assert_eq!(dsm_header.dsm_type(), DsmType::Kroot);
        assert_eq!(DsmHeader(0xc0).dsm_type(), DsmType::Pkr);
    }

    #[test]
    fn dsm_kroot() {
        // DSM-KROOT broadcast on 2022-03-07 9:00 UTC
        let dsm = hex!(
            "
            22 50 49 21 04 98 21 25 d3 96 4d a3 a2 84 1e 1d
            e4 d4 58 c0 e9 84 24 76 e0 04 66 6c f3 79 58 de
            28 51 97 a2 63 53 f1 a4 c6 6d 7e 3d 29 18 53 ba
            5a 13 c9 c3 48 4a 26 77 70 11 2a 13 38 3e a5 2d
            3a 01 9d 5b 6e 1d d1 87 b9 45 3c df 06 ca 7f 34
            ea 14 97 52 5a af 18 f1 f9 f1 fc cb 12 29 89 77
            35 c0 21 b0 41 73 93 b5"
        );
        let dsm = DsmKroot(&dsm);
        assert_eq!(dsm.number_of_blocks(), Some(8));
        assert_eq!(dsm.public_key_id(), 2);
        assert_eq!(dsm.chain_id(), 1);
        assert_eq!(dsm.hash_function(), HashFunction::Sha256);
        assert_eq!(dsm.mac_function(), MacFunction::HmacSha256);
        assert_eq!(dsm.key_size(), Some(128));
        assert_eq!(dsm.tag_size(), Some(40));
        assert_eq!(dsm.mac_lookup_table(), 0x21);
        assert_eq!(dsm.kroot_wn(), 0x498);
        assert_eq!(dsm.kroot_towh(), 0x21);
        assert_eq!(dsm.alpha(), 0x25d3964da3a2);
        assert_eq!(
            dsm.kroot(),
            hex!("84 1e 1d e4 d4 58 c0 e9 84 24 76 e0 04 66 6c f3")
        );
        assert_eq!(dsm.ecdsa_function(), Some(EcdsaFunction::P256Sha256));
        assert_eq!(
            dsm.digital_signature(),
            Some(
                &hex!(
                    "79 58 de 28 51 97 a2 63 53 f1 a4 c6 6d 7e 3d 29
                     18 53 ba 5a 13 c9 c3 48 4a 26 77 70 11 2a 13 38
                     3e a5 2d 3a 01 9d 5b 6e 1d d1 87 b9 45 3c df 06
                     ca 7f 34 ea 14 97 52 5a af 18 f1 f9 f1 fc cb 12"
                )[..]
            )
        );
        assert_eq!(
            dsm.padding(),
            Some(&hex!("29 89 77 35 c0 21 b0 41 73 93 b5")[..])
        );
        assert!(dsm.check_padding(NmaHeader(0x52)));
        assert!(!dsm.check_padding(NmaHeader(0x53)));
    }

    #[test]
    fn dsm_pkr() {
        // DSM-PKR broadcast on 2023-12-12 12:00 UTC
        let dsm = hex!(
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
        let dsm = DsmPkr(&dsm);
        assert_eq!(dsm.number_of_blocks(), Some(13));
        assert_eq!(dsm.message_id(), 0);
        assert_eq!(
            dsm.new_public_key_type(),
            NewPublicKeyType::EcdsaKey(EcdsaFunction::P256Sha256)
        );
        assert_eq!(dsm.new_public_key_id(), 1);
        assert_eq!(
            dsm.new_public_key(),
            Some(
                &hex!(
                    "03 74 a9 25 cf a0 ff 18 05 e5 c5 a5 8f db a3 1b
                     f0 14 5d 5b 5b e2 f0 62 d3 f8 bb 2e e9 8f 0f 6d b0"
                )[..]
            )
        );
        assert_eq!(dsm.padding(), Some(&hex!("e8 23 c5 e7 5e 78")[..]));
        // Obtained from OSNMA_MerkleTree_20231213105954_PKID_1.xml
        let merkle_tree_root =
            hex!("0E63F552C8021709043C239032EFFE941BF22C8389032F5F2701E0FBC80148B8");
        assert!(dsm.check_padding(&merkle_tree_root));
    }

    #[test]
    fn mack() {
        // MACK broadcast on 2022-03-07 9:00 UTC
        let mack = hex!(
            "
            11 55 d3 71 f2 1f 30 a8 e4 ec e0 c0 1b 07 6d 17
            7d 64 03 12 05 d4 02 7e 77 13 15 c0 4c ca 1c 16
            99 1a 05 48 91 07 a7 f7 0e c5 42 b4 19 da 6a da
            1c 0a 3d 6f 56 a5 e5 dc 59 a7 00 00"
        );
        let key_size = 128;
        let tag_size = 40;
        let mack = Mack::new(&mack, key_size, tag_size);
        assert_eq!(mack.key_size(), key_size);
        assert_eq!(mack.tag_size(), tag_size);
        assert_eq!(mack.tag0(), BitSlice::from_slice(&hex!("11 55 d3 71 f2")));
        assert_eq!(mack.macseq(), 0x1f3);
        assert_eq!(mack.num_tags(), 6);
        assert_eq!(
            mack.tag_and_info(1).tag(),
            BitSlice::from_slice(&hex!("a8 e4 ec e0 c0"))
        );
        assert_eq!(mack.tag_and_info(1).prnd(), Prnd::GalileoSvid(0x1b));
        assert_eq!(mack.tag_and_info(1).adkd(), Adkd::InavCed);
        assert_eq!(mack.tag_and_info(2).prnd(), Prnd::GalileoSvid(0x12));
        assert_eq!(mack.tag_and_info(2).adkd(), Adkd::InavCed);
        assert_eq!(mack.tag_and_info(3).prnd(), Prnd::GalileoSvid(0x15));
        assert_eq!(mack.tag_and_info(3).adkd(), Adkd::SlowMac);
        assert_eq!(mack.tag_and_info(4).prnd(), Prnd::GalileoSvid(0x1a));
        assert_eq!(mack.tag_and_info(4).adkd(), Adkd::InavCed);
        assert_eq!(mack.tag_and_info(5).prnd(), Prnd::GalileoSvid(0x0e));
        assert_eq!(mack.tag_and_info(5).adkd(), Adkd::SlowMac);
        assert_eq!(
            mack.key(),
            BitSlice::from_slice(&hex!("42 b4 19 da 6a da 1c 0a 3d 6f 56 a5 e5 dc 59 a7"))
        );
    }
}
