//! Sub-frame assembly.
//!
//! An I/NAV sub-frame is the 30-second grouping of 15 nominal pages
//! transmitted by one satellite. The assembler buffers decoded pages per SVN
//! and emits a sub-frame when its last page arrives, or flushes the buffer
//! when pages of a newer sub-frame epoch are observed.

use crate::page::InavPage;
use crate::types::{
    BitSlice, HkrootMessage, InavWord, MackMessage, PageBits, HKROOT_SECTION_BYTES,
    MACK_SECTION_BYTES, NUM_SVNS, PAGES_PER_SUBFRAME,
};
use crate::{Gst, Svn};
use bitvec::prelude::*;

/// An assembled I/NAV sub-frame.
///
/// The sub-frame epoch is unique per `(SVN, wn, tow)` and has `tow` equal to
/// a multiple of 30. Missing pages (when gaps are allowed) have their bits
/// zeroed and are marked absent in the presence bitmap.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Subframe {
    svn: Svn,
    gst: Gst,
    pages: [PageBits; PAGES_PER_SUBFRAME],
    present: [bool; PAGES_PER_SUBFRAME],
}

impl Subframe {
    fn new(svn: Svn, gst: Gst) -> Subframe {
        assert!(gst.is_subframe());
        Subframe {
            svn,
            gst,
            pages: [[0; 30]; PAGES_PER_SUBFRAME],
            present: [false; PAGES_PER_SUBFRAME],
        }
    }

    /// Gives the SVN of the satellite that transmitted the sub-frame.
    pub fn svn(&self) -> Svn {
        self.svn
    }

    /// Gives the sub-frame epoch.
    pub fn gst(&self) -> Gst {
        self.gst
    }

    /// Returns true if all 15 pages are present.
    pub fn complete(&self) -> bool {
        self.present.iter().all(|&p| p)
    }

    /// Returns true if the page in the given slot is present.
    pub fn page_present(&self, slot: usize) -> bool {
        self.present[slot]
    }

    /// Gives the I/NAV word carried in the given page slot, if the page is
    /// present.
    pub fn word(&self, slot: usize) -> Option<InavWord> {
        if !self.present[slot] {
            return None;
        }
        let bits = BitSlice::from_slice(&self.pages[slot]);
        let mut word = [0u8; 16];
        let dest = BitSlice::from_slice_mut(&mut word);
        dest[..112].copy_from_bitslice(&bits[2..114]);
        dest[112..128].copy_from_bitslice(&bits[122..138]);
        Some(word)
    }

    /// Gives the 120-bit HKROOT message, concatenated from the HKROOT
    /// sections of the 15 pages. Missing pages contribute zeros.
    pub fn hkroot_message(&self) -> HkrootMessage {
        let mut hkroot = [0u8; HKROOT_SECTION_BYTES * PAGES_PER_SUBFRAME];
        for (slot, page) in self.pages.iter().enumerate() {
            if !self.present[slot] {
                continue;
            }
            let bits = BitSlice::from_slice(page);
            BitSlice::from_slice_mut(&mut hkroot)[slot * 8..(slot + 1) * 8]
                .copy_from_bitslice(&bits[138..146]);
        }
        hkroot
    }

    /// Gives the 480-bit MACK message, concatenated from the MACK sections of
    /// the 15 pages. Missing pages contribute zeros.
    pub fn mack_message(&self) -> MackMessage {
        let mut mack = [0u8; MACK_SECTION_BYTES * PAGES_PER_SUBFRAME];
        for (slot, page) in self.pages.iter().enumerate() {
            if !self.present[slot] {
                continue;
            }
            let bits = BitSlice::from_slice(page);
            BitSlice::from_slice_mut(&mut mack)[slot * 32..(slot + 1) * 32]
                .copy_from_bitslice(&bits[146..178]);
        }
        mack
    }

    /// Returns true if the sub-frame carries any OSNMA bits.
    pub fn osnma_present(&self) -> bool {
        self.hkroot_message().iter().any(|&x| x != 0)
            || self.mack_message().iter().any(|&x| x != 0)
    }
}

/// Output of feeding a page to the assembler.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum AssemblerOutput {
    /// A sub-frame was assembled, either complete or (with gaps allowed)
    /// incomplete.
    Subframe(Subframe),
    /// A sub-frame epoch ended with missing pages and no sub-frame could be
    /// delivered under the current gap policy.
    Gap {
        /// SVN of the affected satellite.
        svn: Svn,
        /// Epoch of the abandoned sub-frame.
        gst: Gst,
    },
}

/// Sub-frame assembler.
///
/// Keeps one sub-frame under construction per SVN and guarantees that
/// sub-frames for a given SVN are emitted in strictly increasing GST order.
#[derive(Debug, Clone)]
pub struct CollectSubframe {
    allow_gaps: bool,
    current: [Option<Subframe>; NUM_SVNS],
    last_epoch: [Option<Gst>; NUM_SVNS],
}

impl CollectSubframe {
    /// Creates a new assembler.
    ///
    /// With `allow_gaps` set, sub-frames with missing pages are emitted with
    /// a presence bitmap; otherwise they are discarded with a gap notice.
    pub fn new(allow_gaps: bool) -> CollectSubframe {
        CollectSubframe {
            allow_gaps,
            current: std::array::from_fn(|_| None),
            last_epoch: [None; NUM_SVNS],
        }
    }

    /// Feeds a decoded page.
    ///
    /// Returns the sub-frames and gap notices produced by this page, in
    /// order. At most one flush of an older epoch and one emission of the
    /// page's own epoch can happen per call.
    pub fn feed(&mut self, page: &InavPage) -> Vec<AssemblerOutput> {
        let svn = page.svn();
        let epoch = page.gst().subframe();
        let idx = svn.index();
        let mut out = Vec::new();

        if let Some(last) = self.last_epoch[idx] {
            if epoch <= last {
                log::trace!(
                    "ignoring page for {} at {:?}: epoch not newer than last emitted {:?}",
                    svn,
                    epoch,
                    last
                );
                return out;
            }
        }

        // Flush an older epoch interrupted by this page
        if let Some(current) = &self.current[idx] {
            if current.gst() != epoch {
                let flushed = self.current[idx].take().unwrap();
                log::info!(
                    "flushing sub-frame of {} at {:?}: interrupted by epoch {:?}",
                    svn,
                    flushed.gst(),
                    epoch
                );
                out.push(self.finish(flushed));
            }
        }

        let current = self.current[idx].get_or_insert_with(|| {
            log::trace!("starting sub-frame collection for {} at {:?}", svn, epoch);
            Subframe::new(svn, epoch)
        });
        let slot = page.slot();
        current.pages[slot] = *page.bits();
        current.present[slot] = true;

        if slot == PAGES_PER_SUBFRAME - 1 {
            let finished = self.current[idx].take().unwrap();
            out.push(self.finish(finished));
        }
        out
    }

    /// Flushes every sub-frame under construction, applying the gap policy.
    ///
    /// Used at end of stream so that in-flight sub-frames are not lost.
    pub fn flush(&mut self) -> Vec<AssemblerOutput> {
        let mut out = Vec::new();
        for idx in 0..NUM_SVNS {
            if let Some(subframe) = self.current[idx].take() {
                out.push(self.finish(subframe));
            }
        }
        out
    }

    fn finish(&mut self, subframe: Subframe) -> AssemblerOutput {
        let idx = subframe.svn().index();
        self.last_epoch[idx] = Some(subframe.gst());
        if subframe.complete() || self.allow_gaps {
            AssemblerOutput::Subframe(subframe)
        } else {
            AssemblerOutput::Gap {
                svn: subframe.svn(),
                gst: subframe.gst(),
            }
        }
    }
}
