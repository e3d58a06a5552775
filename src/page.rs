//! I/NAV page decoding.
//!
//! A nominal I/NAV page is 240 bits: a 120-bit even half-page followed by a
//! 120-bit odd half-page. This module validates the 24-bit CRC, screens out
//! non-nominal pages (alert pages and dummy words), and pairs half-pages for
//! sources that deliver them separately.

use crate::types::{
    BitSlice, HalfPageBits, InavWord, OsnmaField, PageBits, INAV_WORD_BYTES, NUM_SVNS,
    OSNMA_FIELD_BYTES, PAGE_BYTES,
};
use crate::{Gst, Svn};
use bitvec::prelude::*;
use core::fmt;

// CRC-24Q, the I/NAV page CRC (poly 0x864CFB, init 0).
const CRC24: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_24_LTE_A);

/// A decoded nominal I/NAV page.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct InavPage {
    svn: Svn,
    gst: Gst,
    bits: PageBits,
}

impl InavPage {
    /// Gives the SVN of the satellite that transmitted the page.
    pub fn svn(&self) -> Svn {
        self.svn
    }

    /// Gives the GST at the start of the page transmission.
    pub fn gst(&self) -> Gst {
        self.gst
    }

    /// Gives the 240 payload bits of the page.
    pub fn bits(&self) -> &PageBits {
        &self.bits
    }

    /// Gives the slot of this page within its sub-frame (0 to 14).
    pub fn slot(&self) -> usize {
        usize::try_from((self.gst.tow() % 30) / 2).unwrap()
    }

    /// Gives the I/NAV word carried by the page (data 1/2 || data 2/2).
    pub fn word(&self) -> InavWord {
        let bits = BitSlice::from_slice(&self.bits);
        let mut word = [0u8; INAV_WORD_BYTES];
        let dest = BitSlice::from_slice_mut(&mut word);
        dest[..112].copy_from_bitslice(&bits[2..114]);
        dest[112..128].copy_from_bitslice(&bits[122..138]);
        word
    }

    /// Gives the 40-bit OSNMA field carried by the odd half-page.
    pub fn osnma(&self) -> OsnmaField {
        let bits = BitSlice::from_slice(&self.bits);
        let mut osnma = [0u8; OSNMA_FIELD_BYTES];
        BitSlice::from_slice_mut(&mut osnma).copy_from_bitslice(&bits[138..178]);
        osnma
    }
}

/// Page decoding error.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum PageError {
    /// The even/odd flags do not correspond to an even half followed by an
    /// odd half.
    WrongHalves,
    /// The 24-bit CRC check failed.
    Crc,
    /// Alert page (page type 1). Excluded from sub-frame assembly.
    Alert,
    /// Dummy word (word type 63). Excluded from sub-frame assembly.
    Dummy,
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageError::WrongHalves => "wrong even/odd half-page flags".fmt(f),
            PageError::Crc => "page CRC check failed".fmt(f),
            PageError::Alert => "alert page".fmt(f),
            PageError::Dummy => "dummy word".fmt(f),
        }
    }
}

impl std::error::Error for PageError {}

/// Decodes and validates a nominal page.
///
/// The page CRC is computed over the concatenation of even[0..114] and
/// odd[0..82], as prescribed by the Galileo SIS ICD. The bit string is
/// prepended with four zero bits to reach a byte boundary; this leaves the
/// CRC unchanged because the register initializer is zero.
pub fn decode(svn: Svn, gst: Gst, page: &PageBits) -> Result<InavPage, PageError> {
    let bits = BitSlice::from_slice(page);
    let (even, odd) = bits.split_at(120);
    if even[0] || !odd[0] {
        return Err(PageError::WrongHalves);
    }
    let mut buf = [0u8; 25];
    let crc_input = BitSlice::from_slice_mut(&mut buf);
    crc_input[4..118].copy_from_bitslice(&even[..114]);
    crc_input[118..200].copy_from_bitslice(&odd[..82]);
    let computed = CRC24.checksum(&buf) & 0xff_ffff;
    let received = odd[82..106].load_be::<u32>();
    if computed != received {
        return Err(PageError::Crc);
    }
    if even[1] || odd[1] {
        return Err(PageError::Alert);
    }
    if even[2..8].load_be::<u8>() == 63 {
        return Err(PageError::Dummy);
    }
    Ok(InavPage {
        svn,
        gst,
        bits: *page,
    })
}

/// Half-page pairing error.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum PairingError {
    /// An even half arrived while another even half was buffered, or an odd
    /// half arrived with no even half buffered. The incoming even half (if
    /// any) is retained for the next pairing attempt.
    LoneHalf,
    /// The odd half does not correspond to the buffered even half's GST. Both
    /// halves are discarded.
    Mismatch,
}

impl fmt::Display for PairingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingError::LoneHalf => "lone half-page".fmt(f),
            PairingError::Mismatch => "mismatched half-pages".fmt(f),
        }
    }
}

impl std::error::Error for PairingError {}

/// Pairs even and odd half-pages into nominal pages.
///
/// Holds at most one even half per SVN. An odd half with a matching GST
/// completes the page.
#[derive(Debug, Clone)]
pub struct Pairing {
    pending: [Option<(Gst, HalfPageBits)>; NUM_SVNS],
}

impl Pairing {
    /// Creates an empty pairing buffer.
    pub fn new() -> Pairing {
        Pairing {
            pending: [None; NUM_SVNS],
        }
    }

    /// Feeds one half-page.
    ///
    /// Returns the assembled 240-bit page when an odd half completes a
    /// buffered even half. Pairing violations are reported as errors; see
    /// [`PairingError`] for what is retained in each case.
    pub fn feed(
        &mut self,
        svn: Svn,
        gst: Gst,
        half: &HalfPageBits,
    ) -> Result<Option<PageBits>, PairingError> {
        let odd = BitSlice::from_slice(half)[0];
        let slot = &mut self.pending[svn.index()];
        if !odd {
            let stale = slot.replace((gst, *half)).is_some();
            if stale {
                return Err(PairingError::LoneHalf);
            }
            return Ok(None);
        }
        match slot.take() {
            None => Err(PairingError::LoneHalf),
            Some((even_gst, _)) if even_gst != gst => Err(PairingError::Mismatch),
            Some((_, even)) => {
                let mut page = [0u8; PAGE_BYTES];
                page[..15].copy_from_slice(&even);
                page[15..].copy_from_slice(half);
                Ok(Some(page))
            }
        }
    }
}

impl Default for Pairing {
    fn default() -> Pairing {
        Pairing::new()
    }
}
