//! OSNMA engine.
//!
//! [`Osnma`] drives the whole receiver pipeline: pages go through CRC
//! validation and sub-frame assembly, the navigation data and OSNMA material
//! of each sub-frame are extracted, DSM messages are reassembled and
//! verified, disclosed TESLA keys are proven against the chain anchor, and
//! pending tags are resolved into authentication events published to the
//! registered subscribers.
//!
//! All state is owned by the engine and mutated from a single thread.

use crate::bitfields::{DsmHeader, DsmKroot, DsmPkr, DsmType, Mack, NmaHeader, NmaStatus};
use crate::dsm::{CollectDsm, DsmFeed};
use crate::events::{Event, Subscriber, SubscriberSystem};
use crate::merkle_tree::MerkleTree;
use crate::navdata::NavDataStore;
use crate::page::{self, InavPage, PageError, Pairing};
use crate::pubkey::PublicKey;
use crate::subframe::{AssemblerOutput, CollectSubframe, Subframe};
use crate::tags::PendingTags;
use crate::tesla::Key;
use crate::types::{DsmBlock, HalfPageBits, PageBits};
use crate::validation::Validated;
use crate::{Gst, Svn};
use core::cmp::Ordering;
use core::fmt;
use std::path::PathBuf;

/// Errors produced when offering a cached DSM-KROOT to the engine.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum HotStartError {
    /// The cache contents are not a hex-encoded NMA header and DSM-KROOT.
    Malformed,
    /// The cached DSM-KROOT did not verify; the engine falls back to live
    /// reassembly.
    Rejected,
}

impl fmt::Display for HotStartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotStartError::Malformed => "malformed KROOT cache contents".fmt(f),
            HotStartError::Rejected => "cached KROOT did not verify".fmt(f),
        }
    }
}

impl std::error::Error for HotStartError {}

/// The OSNMA receiver engine.
pub struct Osnma {
    pairing: Pairing,
    assembler: CollectSubframe,
    dsm: CollectDsm,
    navdata: NavDataStore,
    pending: PendingTags,
    key: Option<Key<Validated>>,
    pubkeys: Vec<PublicKey<Validated>>,
    merkle_tree: Option<MerkleTree>,
    nma_header: Option<NmaHeader>,
    kroot_cache: Option<PathBuf>,
    subscribers: SubscriberSystem,
}

impl fmt::Debug for Osnma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Osnma")
            .field("key", &self.key)
            .field("pubkeys", &self.pubkeys.len())
            .field("nma_header", &self.nma_header)
            .finish()
    }
}

impl Osnma {
    /// Creates a new engine.
    ///
    /// With `allow_gaps` set, sub-frames with missing pages are processed;
    /// navigation data whose span intersects a missing page is then treated
    /// as never received.
    pub fn new(allow_gaps: bool) -> Osnma {
        Osnma {
            pairing: Pairing::new(),
            assembler: CollectSubframe::new(allow_gaps),
            dsm: CollectDsm::new(),
            navdata: NavDataStore::new(),
            pending: PendingTags::new(),
            key: None,
            pubkeys: Vec::new(),
            merkle_tree: None,
            nma_header: None,
            kroot_cache: None,
            subscribers: SubscriberSystem::new(),
        }
    }

    /// Adds a trusted public key for DSM-KROOT verification.
    pub fn add_pubkey(&mut self, pubkey: PublicKey<Validated>) {
        self.pubkeys.push(pubkey);
    }

    /// Configures the Merkle tree used to accept DSM-PKR public keys.
    pub fn set_merkle_tree(&mut self, tree: MerkleTree) {
        self.merkle_tree = Some(tree);
    }

    /// Configures the cache path where verified DSM-KROOTs are written for
    /// hot starts.
    pub fn set_kroot_cache(&mut self, path: PathBuf) {
        self.kroot_cache = Some(path);
    }

    /// Registers an event subscriber.
    pub fn register_subscriber(&mut self, subscriber: Box<dyn Subscriber>) {
        self.subscribers.register(subscriber);
    }

    /// Publishes an event to the subscribers.
    ///
    /// Input adapters use this to report transport-level events, such as a
    /// CRC failure flagged by the receiver itself.
    pub fn publish(&mut self, event: Event) {
        self.subscribers.publish(&event);
    }

    /// Offers a cached DSM-KROOT, as if it had just been reassembled.
    ///
    /// The cache holds one hex-encoded line: the NMA header byte under which
    /// the DSM-KROOT was broadcast, followed by the DSM-KROOT contents. On
    /// verification failure the cache contents are discarded and the engine
    /// keeps waiting for live reassembly.
    pub fn hot_start(&mut self, contents: &str) -> Result<(), HotStartError> {
        let bytes = hex::decode(contents.trim()).map_err(|_| HotStartError::Malformed)?;
        if bytes.len() < 14 {
            return Err(HotStartError::Malformed);
        }
        let nma_header = NmaHeader(bytes[0]);
        if self.process_dsm_kroot(&bytes[1..], nma_header) {
            log::info!("hot start from cached KROOT");
            Ok(())
        } else {
            Err(HotStartError::Rejected)
        }
    }

    /// Feeds a full 240-bit nominal page.
    pub fn feed_page(&mut self, svn: Svn, gst: Gst, page: &PageBits) {
        match page::decode(svn, gst, page) {
            Ok(page) => self.process_page(page),
            Err(PageError::Crc) => self.publish(Event::PageCrcFail {
                wn: gst.wn(),
                tow: gst.tow(),
                svid: svn.into(),
            }),
            Err(e) => log::debug!("skipping page of {} at {:?}: {}", svn, gst, e),
        }
    }

    /// Feeds one half-page, pairing it with its counterpart.
    pub fn feed_half_page(&mut self, svn: Svn, gst: Gst, half: &HalfPageBits) {
        match self.pairing.feed(svn, gst, half) {
            Ok(Some(page)) => self.feed_page(svn, gst, &page),
            Ok(None) => (),
            Err(e) => {
                log::info!("half-page pairing failed for {} at {:?}: {}", svn, gst, e);
                self.publish(Event::PairingFail {
                    wn: gst.wn(),
                    tow: gst.tow(),
                    svid: svn.into(),
                });
            }
        }
    }

    /// Flushes the sub-frames under construction, applying the gap policy.
    ///
    /// Called at end of stream so that in-flight sub-frames are processed.
    pub fn flush(&mut self) {
        for output in self.assembler.flush() {
            self.handle_assembled(output);
        }
    }

    fn process_page(&mut self, page: InavPage) {
        for output in self.assembler.feed(&page) {
            self.handle_assembled(output);
        }
    }

    fn handle_assembled(&mut self, output: AssemblerOutput) {
        match output {
            AssemblerOutput::Subframe(subframe) => self.process_subframe(&subframe),
            AssemblerOutput::Gap { svn, gst } => self.publish(Event::SubframeGap {
                wn: gst.wn(),
                tow: gst.tow(),
                svid: svn.into(),
            }),
        }
    }

    fn process_subframe(&mut self, subframe: &Subframe) {
        let gst = subframe.gst();
        self.navdata.store(subframe);
        if subframe.osnma_present() {
            self.process_hkroot(subframe);
            self.process_mack(subframe);
        } else {
            log::debug!(
                "no OSNMA data in sub-frame of {} at {:?}",
                subframe.svn(),
                gst
            );
        }
        let mut events = Vec::new();
        self.pending.evict(gst, &mut |e| events.push(e));
        for event in events {
            self.publish(event);
        }
        self.navdata.prune(gst);
    }

    fn process_hkroot(&mut self, subframe: &Subframe) {
        let hkroot = subframe.hkroot_message();
        let nma_header = NmaHeader(hkroot[0]);
        if nma_header.usable() {
            self.nma_header = Some(nma_header);
        } else {
            log::warn!("NMA header {:?} holds reserved values", nma_header);
        }
        let dsm_header = DsmHeader(hkroot[1]);
        let block: DsmBlock = hkroot[2..].try_into().unwrap();
        let completed = match self.dsm.feed(dsm_header, &block, subframe.gst()) {
            DsmFeed::Incomplete => None,
            DsmFeed::Discarded { dsm_id } => {
                self.publish(Event::DsmDiscarded { dsm_id });
                return;
            }
            DsmFeed::Complete {
                dsm_type, data, ..
            } => Some((dsm_type, data.to_vec())),
        };
        let Some((dsm_type, data)) = completed else {
            return;
        };
        match dsm_type {
            DsmType::Kroot => {
                let Some(nma_header) = self.nma_header else {
                    log::warn!("complete DSM-KROOT but no usable NMA header yet");
                    return;
                };
                self.process_dsm_kroot(&data, nma_header);
            }
            DsmType::Pkr => self.process_dsm_pkr(&data),
        }
    }

    // Verifies a complete DSM-KROOT and installs its chain. Returns true
    // when a chain is installed (or already was) as a result of this data.
    fn process_dsm_kroot(&mut self, data: &[u8], nma_header: NmaHeader) -> bool {
        let dsm_kroot = DsmKroot(data);
        let pkid = dsm_kroot.public_key_id();
        let Some(pubkey) = self
            .pubkeys
            .iter()
            .find(|k| k.public_key_id().map(|id| id == pkid).unwrap_or(true))
        else {
            log::warn!("no public key available for PKID {}", pkid);
            return false;
        };
        match Key::from_dsm_kroot(nma_header, &dsm_kroot, pubkey) {
            Ok(kroot) => {
                if let Some(current) = &self.key {
                    if current.chain() == kroot.chain() {
                        log::trace!("DSM-KROOT for the installed chain. nothing to do");
                        return true;
                    }
                    if kroot.chain().gst0 <= current.chain().gst0 {
                        log::warn!(
                            "verified DSM-KROOT for a chain older than the installed one. ignoring"
                        );
                        return false;
                    }
                }
                log::info!("verified KROOT of chain {}", kroot.chain().chain_id);
                self.save_kroot_cache(nma_header, data);
                let chain_id = kroot.chain().chain_id;
                self.key = Some(kroot);
                self.publish(Event::KrootVerified { chain_id });
                true
            }
            Err(e) => {
                log::error!("could not verify KROOT: {}", e);
                self.publish(Event::KrootSignatureFail);
                false
            }
        }
    }

    fn process_dsm_pkr(&mut self, data: &[u8]) {
        let dsm_pkr = DsmPkr(data);
        let Some(tree) = &self.merkle_tree else {
            log::warn!("DSM-PKR received but no Merkle tree configured. ignoring");
            return;
        };
        if let Err(e) = tree.validate_pkr(&dsm_pkr) {
            log::error!("DSM-PKR failed the Merkle proof: {}", e);
            self.publish(Event::MerkleProofFail);
            return;
        }
        if !dsm_pkr.check_padding(tree.root()) {
            log::error!("DSM-PKR padding check failed");
            self.publish(Event::MerkleProofFail);
            return;
        }
        match PublicKey::from_dsm_pkr(&dsm_pkr) {
            Ok(pubkey) => {
                log::info!(
                    "accepted public key with PKID {} from DSM-PKR",
                    dsm_pkr.new_public_key_id()
                );
                self.pubkeys.push(pubkey.force_valid());
            }
            Err(e) => log::error!("cannot use DSM-PKR key: {}", e),
        }
    }

    fn process_mack(&mut self, subframe: &Subframe) {
        let Some(current) = self.key else {
            log::info!("no TESLA chain installed yet. unable to process MACK");
            return;
        };
        let chain = *current.chain();
        let gst = subframe.gst();
        let svn = subframe.svn();
        let mack_bytes = subframe.mack_message();
        let mack = Mack::new(&mack_bytes, chain.key_size, chain.tag_size);

        let nma_status = self
            .nma_header
            .map(|h| h.nma_status())
            .unwrap_or(NmaStatus::Reserved);
        if let Err(e) = self
            .pending
            .collect(&mack, svn, gst, nma_status, chain.maclt)
        {
            log::error!(
                "tag sequence of {} at {:?} does not follow the MACLT: {}",
                svn,
                gst,
                e
            );
            self.publish(Event::TagSequenceFail {
                wn: gst.wn(),
                tow: gst.tow(),
                svid: svn.into(),
            });
        }

        let new_key = Key::from_bitslice(mack.key(), gst, chain);
        match current.gst_subframe().cmp(&new_key.gst_subframe()) {
            Ordering::Equal => {
                // key for this sub-frame already authentic; replays and the
                // copies broadcast by other satellites are ignored
            }
            Ordering::Greater => {
                log::warn!(
                    "disclosed key of {} at {:?} is older than the current key",
                    svn,
                    gst
                );
            }
            Ordering::Less => match current.validate_key(&new_key) {
                Ok(valid) => {
                    log::info!(
                        "new TESLA key at {:?} validated against {:?}",
                        valid.gst_subframe(),
                        current.gst_subframe()
                    );
                    self.advance_key(valid);
                }
                Err(e) => {
                    log::error!(
                        "could not validate TESLA key disclosed by {} at {:?}: {}",
                        svn,
                        gst,
                        e
                    );
                    self.publish(Event::KeyChainFail {
                        wn: gst.wn(),
                        tow: gst.tow(),
                        svid: svn.into(),
                    });
                }
            },
        }
    }

    // Installs a newly authentic key and resolves the tags made verifiable
    // by it and by every intermediate key, oldest epoch first.
    fn advance_key(&mut self, new_key: Key<Validated>) {
        let previous = self.key.expect("advance_key requires an installed chain");
        self.key = Some(new_key);
        let Some(earliest) = self.pending.earliest() else {
            return;
        };
        let new_gst = new_key.gst_subframe();
        let mut epoch = core::cmp::max(
            previous.gst_subframe().add_seconds(30),
            earliest.add_seconds(30),
        );
        let mut events = Vec::new();
        while epoch <= new_gst {
            let steps = (new_gst.timestamp() - epoch.timestamp()) / 30;
            let key = new_key.derive(u32::try_from(steps).unwrap());
            self.pending
                .resolve_with_key(&key, &self.navdata, &mut |e| events.push(e));
            epoch = epoch.add_seconds(30);
        }
        for event in events {
            self.publish(event);
        }
    }

    fn save_kroot_cache(&self, nma_header: NmaHeader, data: &[u8]) {
        let Some(path) = &self.kroot_cache else {
            return;
        };
        let mut contents = hex::encode([nma_header.0]);
        contents.push_str(&hex::encode(data));
        contents.push('\n');
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("cannot create KROOT cache directory: {}", e);
                return;
            }
        }
        match std::fs::write(path, contents) {
            Ok(()) => log::info!("saved verified KROOT to {}", path.display()),
            Err(e) => log::error!("cannot write KROOT cache: {}", e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::events::AuthOutcome;
    use crate::navdata::test::word_for_slot;
    use crate::types::{BitSlice, BitVec, MackMessage, OsnmaField, DSM_BLOCK_BYTES};
    use bitvec::prelude::*;
    use hmac::{Hmac, Mac as _};
    use sha2::{Digest, Sha256};
    use signature::Signer;
    use std::cell::RefCell;
    use std::rc::Rc;

    const KEY_BYTES: usize = 16;
    const ALPHA: u64 = 0x25d3964da3a2;
    const WN: u16 = 1200;
    const TOWH: u8 = 1;
    const PKID: u8 = 2;

    fn gst0() -> Gst {
        Gst::new(WN, u32::from(TOWH) * 3600)
    }

    // Transmitter-side TESLA chain: generated from a seed at the newest
    // epoch and hashed back to the KROOT.
    struct TestChain {
        keys: Vec<(Gst, [u8; KEY_BYTES])>,
    }

    impl TestChain {
        fn new(subframes: usize) -> TestChain {
            let mut keys = Vec::new();
            let mut gst = gst0().add_subframes(i32::try_from(subframes).unwrap());
            let mut key = [0xabu8; KEY_BYTES];
            loop {
                keys.push((gst, key));
                if gst == gst0().add_seconds(-30) {
                    break;
                }
                let previous = gst.add_seconds(-30);
                let mut buffer = Vec::new();
                buffer.extend_from_slice(&key);
                let mut gst_bytes = [0u8; 4];
                previous.write_bits(&mut BitSlice::from_slice_mut(&mut gst_bytes)[..32]);
                buffer.extend_from_slice(&gst_bytes);
                buffer.extend_from_slice(&ALPHA.to_be_bytes()[2..]);
                let hash = Sha256::digest(&buffer);
                key = hash[..KEY_BYTES].try_into().unwrap();
                gst = previous;
            }
            TestChain { keys }
        }

        fn key_at(&self, gst: Gst) -> [u8; KEY_BYTES] {
            self.keys
                .iter()
                .find(|(g, _)| *g == gst)
                .expect("key epoch inside the generated chain")
                .1
        }

        fn kroot(&self) -> [u8; KEY_BYTES] {
            self.key_at(gst0().add_seconds(-30))
        }
    }

    fn signing_key() -> p256::ecdsa::SigningKey {
        p256::ecdsa::SigningKey::from_slice(&[7u8; 32]).unwrap()
    }

    fn nma_header() -> NmaHeader {
        // Test, CID 1, nominal
        NmaHeader(0x52)
    }

    // Builds a signed DSM-KROOT for the test chain (8 blocks, 104 bytes).
    fn make_dsm_kroot(chain: &TestChain, signer: &p256::ecdsa::SigningKey) -> Vec<u8> {
        let mut dsm = vec![0u8; 8 * DSM_BLOCK_BYTES];
        dsm[0] = 0x20 | PKID; // NB_DK = 2 (8 blocks)
        dsm[1] = 0x40; // CIDKR = 1, HF = SHA-256, MF = HMAC-SHA-256
        dsm[2] = 0x49; // KS = 128 bits, TS = 40 bits
        dsm[3] = 33; // MACLT
        dsm[4] = (WN >> 8) as u8;
        dsm[5] = (WN & 0xff) as u8;
        dsm[6] = TOWH;
        dsm[7..13].copy_from_slice(&ALPHA.to_be_bytes()[2..]);
        dsm[13..29].copy_from_slice(&chain.kroot());
        let mut message = vec![nma_header().0];
        message.extend_from_slice(&dsm[1..29]);
        let signature: p256::ecdsa::Signature = signer.sign(&message);
        dsm[29..93].copy_from_slice(&signature.to_bytes());
        let mut hash = Sha256::new();
        hash.update(&message);
        hash.update(&dsm[29..93]);
        let hash = hash.finalize();
        dsm[93..104].copy_from_slice(&hash[..11]);
        dsm
    }

    fn kroot_cache_line(dsm: &[u8]) -> String {
        let mut line = hex::encode([nma_header().0]);
        line.push_str(&hex::encode(dsm));
        line
    }

    fn hmac_tag(key: &[u8], message: &[u8], bits: usize) -> BitVec {
        let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap();
        mac.update(message);
        let bytes = mac.finalize().into_bytes();
        BitVec::from_bitslice(&BitSlice::from_slice(&bytes)[..bits])
    }

    fn tag_message(
        prnd: Option<u8>,
        prna: u8,
        gst: Gst,
        ctr: u8,
        navdata: &BitSlice,
    ) -> Vec<u8> {
        let mut m = BitVec::new();
        if let Some(prnd) = prnd {
            m.extend_from_bitslice(BitSlice::from_element(&prnd));
        }
        m.extend_from_bitslice(BitSlice::from_element(&prna));
        let mut gst_bytes = [0u8; 4];
        gst.write_bits(&mut BitSlice::from_slice_mut(&mut gst_bytes)[..32]);
        m.extend_from_bitslice(BitSlice::from_slice(&gst_bytes));
        m.extend_from_bitslice(BitSlice::from_element(&ctr));
        // NMAS = Test
        m.extend_from_bitslice(&BitSlice::from_slice(&[0b0100_0000u8])[..2]);
        m.extend_from_bitslice(navdata);
        while m.len() % 8 != 0 {
            m.push(false);
        }
        m.into_vec()
    }

    fn macseq_value(key: &[u8], prna: u8, gst: Gst) -> u16 {
        let mut m = BitVec::new();
        m.extend_from_bitslice(BitSlice::from_element(&prna));
        let mut gst_bytes = [0u8; 4];
        gst.write_bits(&mut BitSlice::from_slice_mut(&mut gst_bytes)[..32]);
        m.extend_from_bitslice(BitSlice::from_slice(&gst_bytes));
        let mac = hmac_tag(key, m.as_raw_slice(), 12);
        mac[..12].load_be::<u16>()
    }

    struct TagSpec {
        tag: BitVec,
        prnd: u8,
        adkd: u8,
        cop: u8,
    }

    // Assembles a MACK message for KS = 128, TS = 40: header (tag0, MACSEQ,
    // COP), five tag-info sections and the disclosed key.
    fn make_mack(
        tag0: &BitSlice,
        macseq: u16,
        cop0: u8,
        tags: &[TagSpec],
        key: &[u8; KEY_BYTES],
    ) -> MackMessage {
        assert_eq!(tags.len(), 5);
        let mut mack = [0u8; 60];
        let bits = BitSlice::from_slice_mut(&mut mack);
        bits[..40].copy_from_bitslice(tag0);
        bits[40..52].store_be(macseq);
        bits[52..56].store_be(cop0);
        for (j, spec) in tags.iter().enumerate() {
            let start = 56 * (j + 1);
            bits[start..start + 40].copy_from_bitslice(&spec.tag);
            bits[start + 40..start + 48].store_be(spec.prnd);
            bits[start + 48..start + 52].store_be(spec.adkd);
            bits[start + 52..start + 56].store_be(spec.cop);
        }
        bits[336..464].copy_from_bitslice(BitSlice::from_slice(key));
        mack
    }

    fn dummy_tag() -> BitVec {
        BitVec::repeat(false, 40)
    }

    // Feeds the 15 pages of one sub-frame into the engine. The OSNMA field
    // of page i carries HKROOT byte i and MACK bytes 4i..4i+4.
    fn feed_subframe(
        osnma: &mut Osnma,
        svn: Svn,
        gst: Gst,
        iod_nav: u16,
        mack: &MackMessage,
        dsm: &[u8],
        flip_word_bit: bool,
    ) {
        let subframe_index = (gst.tow() / 30) % 8;
        let mut hkroot = [0u8; 15];
        hkroot[0] = nma_header().0;
        hkroot[1] = u8::try_from(subframe_index).unwrap(); // DSM ID 0
        let block_start = usize::try_from(subframe_index).unwrap() * DSM_BLOCK_BYTES;
        hkroot[2..15].copy_from_slice(&dsm[block_start..block_start + DSM_BLOCK_BYTES]);
        for slot in 0..15usize {
            let mut word = word_for_slot(slot, iod_nav);
            if flip_word_bit && slot == 0 {
                word[10] ^= 0x01;
            }
            let mut osnma_field: OsnmaField = [0u8; 5];
            osnma_field[0] = hkroot[slot];
            osnma_field[1..5].copy_from_slice(&mack[slot * 4..slot * 4 + 4]);
            let page = crate::page::test::make_page(&word, &osnma_field);
            let page_gst = gst.add_seconds(2 * i32::try_from(slot).unwrap());
            osnma.feed_page(svn, page_gst, &page);
        }
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<Event>>>);

    impl Subscriber for Recorder {
        fn on_event(&mut self, event: &Event) -> Result<(), Box<dyn std::error::Error>> {
            self.0.borrow_mut().push(event.clone());
            Ok(())
        }
    }

    // Cross-authentication targets for the test MACKs, avoiding the
    // transmitter itself. None of them transmit data in the test stream.
    fn cross_targets(prna: u8) -> [u8; 3] {
        let mut it = [6u8, 7, 9, 11].into_iter().filter(|&x| x != prna);
        std::array::from_fn(|_| it.next().unwrap())
    }

    // MACLT 33, first sequence: 00E, 04S, 00E, 12S, 00E. The 04S tag value
    // may be supplied so that it verifies against real timing data.
    fn msg0_tags(prna: u8, timing_tag: BitVec) -> Vec<TagSpec> {
        let [a, b, c] = cross_targets(prna);
        vec![
            TagSpec {
                tag: dummy_tag(),
                prnd: a,
                adkd: 0,
                cop: 1,
            },
            TagSpec {
                tag: timing_tag,
                prnd: 255,
                adkd: 4,
                cop: 1,
            },
            TagSpec {
                tag: dummy_tag(),
                prnd: b,
                adkd: 0,
                cop: 1,
            },
            TagSpec {
                tag: dummy_tag(),
                prnd: prna,
                adkd: 12,
                cop: 1,
            },
            TagSpec {
                tag: dummy_tag(),
                prnd: c,
                adkd: 0,
                cop: 1,
            },
        ]
    }

    // MACLT 33, second sequence: 00E, 00E, 12S, 00E, 12E.
    fn msg1_tags(prna: u8) -> Vec<TagSpec> {
        let [a, b, c] = cross_targets(prna);
        vec![
            TagSpec {
                tag: dummy_tag(),
                prnd: a,
                adkd: 0,
                cop: 1,
            },
            TagSpec {
                tag: dummy_tag(),
                prnd: b,
                adkd: 0,
                cop: 1,
            },
            TagSpec {
                tag: dummy_tag(),
                prnd: prna,
                adkd: 12,
                cop: 1,
            },
            TagSpec {
                tag: dummy_tag(),
                prnd: c,
                adkd: 0,
                cop: 1,
            },
            TagSpec {
                tag: dummy_tag(),
                prnd: a,
                adkd: 12,
                cop: 1,
            },
        ]
    }

    // Navigation data of the satellite under test, as the engine extracts it.
    fn navdata_bits(svn: Svn, gst: Gst, iod_nav: u16) -> BitVec {
        let sf = crate::navdata::test::make_subframe(svn, gst, iod_nav, None);
        let ced = crate::navdata::extract_ced_and_status(&sf).unwrap();
        BitVec::from_bitslice(ced.bits())
    }

    fn timing_bits(svn: Svn, gst: Gst, iod_nav: u16) -> BitVec {
        let sf = crate::navdata::test::make_subframe(svn, gst, iod_nav, None);
        let timing = crate::navdata::extract_timing_parameters(&sf).unwrap();
        BitVec::from_bitslice(timing.bits())
    }

    fn run_engine(flip_word_bit_at_s0: bool) -> Vec<Event> {
        let chain = TestChain::new(10);
        let signer = signing_key();
        let dsm = make_dsm_kroot(&chain, &signer);

        let mut osnma = Osnma::new(false);
        osnma.add_pubkey(PublicKey::from_p256(
            *signer.verifying_key(),
            Some(PKID),
        ));
        let recorder = Recorder::default();
        let events = recorder.0.clone();
        osnma.register_subscriber(Box::new(recorder));

        osnma.hot_start(&kroot_cache_line(&dsm)).unwrap();

        let svn = Svn::try_from(5u8).unwrap();
        let prna = u8::from(svn);
        let iod = 37;
        // s0 at gst0 + 30: even sub-frame index (tow 3630 / 30 = 121 is
        // odd, so compute per sub-frame below)
        let s0 = gst0().add_seconds(30);
        let s1 = s0.add_seconds(30);
        let s2 = s1.add_seconds(30);

        // s0 (tow 3630, msg 1): all tags reference data at s0 - 30, which
        // the engine never saw.
        let mack_s0 = make_mack(
            &dummy_tag(),
            macseq_value(&chain.key_at(s1), prna, s0),
            1,
            &msg1_tags(prna),
            &chain.key_at(s0),
        );
        feed_subframe(&mut osnma, svn, s0, iod, &mack_s0, &dsm, flip_word_bit_at_s0);

        // s1 (tow 3660, msg 0): tag0 authenticates the s0 CED data of the
        // satellite itself and the 04S tag its timing data, both with the
        // key disclosed at s2.
        let data = navdata_bits(svn, s0, iod);
        let tag0_message = tag_message(None, prna, s1, 1, &data);
        let tag0 = hmac_tag(&chain.key_at(s2), &tag0_message, 40);
        // The constellation PRND byte is replaced by PRNA in the MAC input
        let timing = timing_bits(svn, s0, iod);
        let timing_message = tag_message(Some(prna), prna, s1, 3, &timing);
        let timing_tag = hmac_tag(&chain.key_at(s2), &timing_message, 40);
        let mack_s1 = make_mack(
            &tag0,
            macseq_value(&chain.key_at(s2), prna, s1),
            1,
            &msg0_tags(prna, timing_tag),
            &chain.key_at(s1),
        );
        feed_subframe(&mut osnma, svn, s1, iod, &mack_s1, &dsm, false);

        // s2 (tow 3690, msg 1): discloses the key that resolves the s1 tags.
        let mack_s2 = make_mack(
            &dummy_tag(),
            macseq_value(&chain.key_at(s2.add_seconds(30)), prna, s2),
            1,
            &msg1_tags(prna),
            &chain.key_at(s2),
        );
        feed_subframe(&mut osnma, svn, s2, iod, &mack_s2, &dsm, false);

        // A second satellite disclosing the same key at the same epoch is
        // ignored silently.
        let other = 6u8;
        let svn6 = Svn::try_from(other).unwrap();
        let mack_s2_e06 = make_mack(
            &dummy_tag(),
            macseq_value(&chain.key_at(s2.add_seconds(30)), other, s2),
            1,
            &msg1_tags(other),
            &chain.key_at(s2),
        );
        feed_subframe(&mut osnma, svn6, s2, iod, &mack_s2_e06, &dsm, false);

        let collected = events.borrow().clone();
        collected
    }

    #[test]
    fn authenticates_own_data() {
        let events = run_engine(false);

        assert!(events.contains(&Event::KrootVerified { chain_id: 1 }));
        assert!(!events
            .iter()
            .any(|e| matches!(e, Event::KeyChainFail { .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, Event::TagSequenceFail { .. })));
        assert!(!events.iter().any(|e| matches!(e, Event::MacseqFail { .. })));

        let attempts: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::AuthAttempt {
                    prnd,
                    prna,
                    tow,
                    adkd,
                    outcome,
                    ..
                } => Some((*prnd, *prna, *tow, *adkd, *outcome)),
                _ => None,
            })
            .collect();

        // s0 tags resolve first (key disclosed at s1): all unknown data
        let s0_tow = gst0().tow() + 30;
        let s0_attempts: Vec<_> = attempts.iter().filter(|a| a.2 == s0_tow).collect();
        assert_eq!(s0_attempts.len(), 4); // tag0 + three fast cross tags
        assert!(s0_attempts
            .iter()
            .all(|a| a.4 == AuthOutcome::UnknownData));

        // s1 tags resolve next: tag0 and the timing tag are authentic,
        // cross tags unknown
        let s1_tow = s0_tow + 30;
        let s1_attempts: Vec<_> = attempts.iter().filter(|a| a.2 == s1_tow).collect();
        assert_eq!(s1_attempts.len(), 5); // tag0 + 00E + 04S + 00E + 00E
        assert_eq!(
            s1_attempts[0],
            &(5, 5, s1_tow, 0, AuthOutcome::Ok),
            "tag0 resolves first and verifies"
        );
        assert_eq!(
            s1_attempts[2],
            &(255, 5, s1_tow, 4, AuthOutcome::Ok),
            "timing parameters verify"
        );
        for idx in [1, 3, 4] {
            assert_eq!(s1_attempts[idx].4, AuthOutcome::UnknownData);
        }

        // Ordering: every s0 event precedes every s1 event
        let first_s1 = attempts.iter().position(|a| a.2 == s1_tow).unwrap();
        assert!(attempts[..first_s1].iter().all(|a| a.2 == s0_tow));
    }

    #[test]
    fn flipped_navigation_bit_invalidates_tag() {
        let events = run_engine(true);
        let s1_tow = gst0().tow() + 60;
        assert!(events.iter().any(|e| matches!(
            e,
            Event::AuthAttempt {
                prnd: 5,
                prna: 5,
                tow,
                adkd: 0,
                outcome: AuthOutcome::InvalidTag,
                ..
            } if *tow == s1_tow
        )));
    }

    #[test]
    fn wrong_pubkey_rejects_kroot() {
        let chain = TestChain::new(10);
        let dsm = make_dsm_kroot(&chain, &signing_key());

        let mut osnma = Osnma::new(false);
        let other_signer = p256::ecdsa::SigningKey::from_slice(&[9u8; 32]).unwrap();
        osnma.add_pubkey(PublicKey::from_p256(
            *other_signer.verifying_key(),
            Some(PKID),
        ));
        let recorder = Recorder::default();
        let events = recorder.0.clone();
        osnma.register_subscriber(Box::new(recorder));

        assert_eq!(
            osnma.hot_start(&kroot_cache_line(&dsm)),
            Err(HotStartError::Rejected)
        );
        assert!(events.borrow().contains(&Event::KrootSignatureFail));
        assert!(!events
            .borrow()
            .iter()
            .any(|e| matches!(e, Event::KrootVerified { .. })));
    }

    #[test]
    fn saves_kroot_cache() {
        let chain = TestChain::new(10);
        let signer = signing_key();
        let dsm = make_dsm_kroot(&chain, &signer);
        let dir = std::env::temp_dir().join("osnma-rx-test-cache");
        let path = dir.join("kroot");
        let _ = std::fs::remove_file(&path);

        let mut osnma = Osnma::new(false);
        osnma.add_pubkey(PublicKey::from_p256(*signer.verifying_key(), Some(PKID)));
        osnma.set_kroot_cache(path.clone());
        osnma.hot_start(&kroot_cache_line(&dsm)).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.trim(), kroot_cache_line(&dsm));
        let _ = std::fs::remove_file(&path);
    }
}
