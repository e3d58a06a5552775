//! Navigation data extraction and storage.
//!
//! This module pulls the bit ranges authenticated by OSNMA out of each
//! sub-frame (ADKD=0 and 12 use the ephemeris, clock and status from I/NAV
//! words 1-5; ADKD=4 uses the timing parameters from words 6 and 10) and
//! keeps a bounded history of them, so that tags received in later
//! sub-frames can be matched to the data they authenticate.

use crate::subframe::Subframe;
use crate::types::BitSlice;
use crate::{Gst, Svn};
use bitvec::prelude::*;
use std::collections::BTreeMap;

/// Length in bits of the ADKD=0/12 navigation data.
pub const CED_AND_STATUS_BITS: usize = 549;
const CED_AND_STATUS_BYTES: usize = CED_AND_STATUS_BITS.div_ceil(8);

/// Length in bits of the ADKD=4 navigation data.
pub const TIMING_PARAMETERS_BITS: usize = 141;
const TIMING_PARAMETERS_BYTES: usize = TIMING_PARAMETERS_BITS.div_ceil(8);

// History depth in sub-frames. Slow MAC tags wait up to twice the
// 11-sub-frame key delay before they are abandoned, and their data is one
// sub-frame older still.
const DEPTH_SUBFRAMES: i32 = 24;

// Word placement within the E1-B nominal sub-frame: (slot, word type,
// authenticated bit range within the word, destination offset).
const CED_WORDS: [(usize, u8, core::ops::Range<usize>, usize); 5] = [
    (10, 1, 6..126, 0),
    (0, 2, 6..126, 120),
    (11, 3, 6..128, 240),
    (1, 4, 6..126, 362),
    (12, 5, 6..73, 482),
];

/// Ephemeris, clock and status data block (ADKD=0 and 12).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct CedAndStatus {
    data: [u8; CED_AND_STATUS_BYTES],
    iod_nav: u16,
}

impl CedAndStatus {
    /// Gives the 549 navigation data bits.
    pub fn bits(&self) -> &BitSlice {
        &BitSlice::from_slice(&self.data)[..CED_AND_STATUS_BITS]
    }

    /// Gives the IOD-NAV identity of this data block.
    pub fn iod_nav(&self) -> u16 {
        self.iod_nav
    }
}

/// Timing parameters data block (ADKD=4).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct TimingParameters {
    data: [u8; TIMING_PARAMETERS_BYTES],
}

impl TimingParameters {
    /// Gives the 141 navigation data bits.
    pub fn bits(&self) -> &BitSlice {
        &BitSlice::from_slice(&self.data)[..TIMING_PARAMETERS_BITS]
    }
}

/// Extracts the ADKD=0/12 data block from a sub-frame.
///
/// Returns `None` when a required page is missing or does not carry the
/// expected word type, or when the words do not share a single IOD-NAV.
pub fn extract_ced_and_status(subframe: &Subframe) -> Option<CedAndStatus> {
    let mut data = [0u8; CED_AND_STATUS_BYTES];
    let dest = BitSlice::from_slice_mut(&mut data);
    let mut iod_nav = None;
    for (slot, word_type, src, offset) in CED_WORDS {
        let word = subframe.word(slot)?;
        let bits = BitSlice::from_slice(&word);
        if bits[..6].load_be::<u8>() != word_type {
            log::trace!(
                "{} sub-frame at {:?}: expected word {} in slot {}",
                subframe.svn(),
                subframe.gst(),
                word_type,
                slot
            );
            return None;
        }
        // Words 1-4 carry the IOD-NAV in their first 10 data bits
        if word_type <= 4 {
            let iod = bits[6..16].load_be::<u16>();
            match iod_nav {
                None => iod_nav = Some(iod),
                Some(prev) if prev != iod => {
                    log::trace!(
                        "{} sub-frame at {:?}: IOD-NAV mismatch ({} != {})",
                        subframe.svn(),
                        subframe.gst(),
                        prev,
                        iod
                    );
                    return None;
                }
                Some(_) => (),
            }
        }
        let len = src.end - src.start;
        dest[offset..offset + len].copy_from_bitslice(&bits[src]);
    }
    Some(CedAndStatus {
        data,
        iod_nav: iod_nav.unwrap(),
    })
}

/// Extracts the ADKD=4 data block from a sub-frame.
///
/// Returns `None` when a required page is missing, or when the slot that
/// alternates between words 8 and 10 does not carry word 10 this sub-frame.
pub fn extract_timing_parameters(subframe: &Subframe) -> Option<TimingParameters> {
    let word6 = subframe.word(2)?;
    let word10 = subframe.word(4)?;
    let word6 = BitSlice::from_slice(&word6);
    let word10 = BitSlice::from_slice(&word10);
    if word6[..6].load_be::<u8>() != 6 || word10[..6].load_be::<u8>() != 10 {
        return None;
    }
    let mut data = [0u8; TIMING_PARAMETERS_BYTES];
    let dest = BitSlice::from_slice_mut(&mut data);
    dest[..99].copy_from_bitslice(&word6[6..105]);
    dest[99..141].copy_from_bitslice(&word10[86..128]);
    Some(TimingParameters { data })
}

/// Bounded store of recent navigation data blocks.
///
/// Blocks are keyed by sub-frame epoch (and SVN for ADKD=0/12; the timing
/// parameters are constellation data and keyed by epoch alone). Lookups
/// honor the tag COP field: when the exact epoch is absent, the newest block
/// not older than `cop - 1` sub-frames is returned.
#[derive(Debug, Clone, Default)]
pub struct NavDataStore {
    ced: BTreeMap<(Gst, u8), CedAndStatus>,
    timing: BTreeMap<Gst, TimingParameters>,
}

impl NavDataStore {
    /// Creates an empty store.
    pub fn new() -> NavDataStore {
        NavDataStore::default()
    }

    /// Extracts and stores the navigation data of a sub-frame.
    ///
    /// Data blocks whose bit spans intersect missing pages are not stored,
    /// so that tags referring to them resolve to an unknown-data outcome.
    pub fn store(&mut self, subframe: &Subframe) {
        let gst = subframe.gst();
        if let Some(ced) = extract_ced_and_status(subframe) {
            log::trace!(
                "stored CED for {} at {:?} (IOD-NAV {})",
                subframe.svn(),
                gst,
                ced.iod_nav()
            );
            self.ced.insert((gst, u8::from(subframe.svn())), ced);
        }
        if let Some(timing) = extract_timing_parameters(subframe) {
            log::trace!("stored timing parameters at {:?}", gst);
            self.timing.insert(gst, timing);
        }
    }

    /// Looks up the ADKD=0/12 data of a satellite at a sub-frame epoch.
    pub fn get_ced(&self, svn: Svn, gst: Gst, cop: u8) -> Option<&CedAndStatus> {
        let svn = u8::from(svn);
        if let Some(ced) = self.ced.get(&(gst, svn)) {
            return Some(ced);
        }
        if cop <= 1 {
            return None;
        }
        let oldest = gst.add_subframes(-i32::from(cop - 1));
        self.ced
            .range((oldest, 0)..=(gst, u8::MAX))
            .rev()
            .find_map(|((_, s), ced)| if *s == svn { Some(ced) } else { None })
    }

    /// Looks up the ADKD=4 timing data at a sub-frame epoch.
    pub fn get_timing(&self, gst: Gst, cop: u8) -> Option<&TimingParameters> {
        if let Some(timing) = self.timing.get(&gst) {
            return Some(timing);
        }
        if cop <= 1 {
            return None;
        }
        let oldest = gst.add_subframes(-i32::from(cop - 1));
        self.timing.range(oldest..=gst).next_back().map(|(_, t)| t)
    }

    /// Discards data older than the history depth.
    pub fn prune(&mut self, now: Gst) {
        let cutoff = now.add_subframes(-DEPTH_SUBFRAMES);
        self.ced = self.ced.split_off(&(cutoff, 0));
        self.timing = self.timing.split_off(&cutoff);
    }
}
