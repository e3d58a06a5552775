//! Septentrio Binary Format demultiplexer.
//!
//! SBF is a framed binary stream: each block starts with the sync sequence
//! `$@`, followed by a CRC, a block ID, the block length and the body. Only
//! `GALRawINAV` blocks (number 4023) are of interest here; they carry one
//! nominal I/NAV page per block.

use crate::types::{BitSlice, PageBits, PAGE_BYTES};
use crate::{Gst, Svn};
use bitvec::prelude::*;
use std::io::Read;

const SYNC: [u8; 2] = *b"$@";

// CRC-CCITT with zero initializer, the SBF block CRC.
const CRC16: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_XMODEM);

/// Block number of the GALRawINAV SBF block.
pub const GAL_RAW_INAV: u16 = 4023;

const TOW_DO_NOT_USE: u32 = 4294967295;
const WNC_DO_NOT_USE: u16 = 65535;

/// A raw SBF block with its header fields decoded.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SbfBlock {
    /// Block number (ID with the revision bits masked off).
    pub block_number: u16,
    /// Block revision.
    pub revision: u8,
    /// Receiver time of week in milliseconds.
    pub tow_ms: u32,
    /// Receiver week number (continuous, GPS-referenced).
    pub wnc: u16,
    /// Block body after the time stamp.
    pub body: Vec<u8>,
}

/// Reads SBF blocks from a byte stream.
///
/// Malformed blocks (wrong length or CRC) are skipped by scanning for the
/// next sync sequence; only I/O errors terminate the reader.
#[derive(Debug)]
pub struct SbfReader<R> {
    read: R,
}

impl<R: Read> SbfReader<R> {
    /// Creates a reader over a byte source.
    pub fn new(read: R) -> SbfReader<R> {
        SbfReader { read }
    }

    /// Reads the next well-formed SBF block.
    ///
    /// An error with kind `UnexpectedEof` marks the end of the stream.
    pub fn read_block(&mut self) -> std::io::Result<SbfBlock> {
        loop {
            self.find_sync()?;
            let mut header = [0u8; 6];
            self.read.read_exact(&mut header)?;
            let crc = u16::from_le_bytes(header[0..2].try_into().unwrap());
            let id = u16::from_le_bytes(header[2..4].try_into().unwrap());
            let length = usize::from(u16::from_le_bytes(header[4..6].try_into().unwrap()));
            if length % 4 != 0 || length < 14 {
                log::debug!("SBF block with invalid length {}. rescanning", length);
                continue;
            }
            let mut body = vec![0u8; length - 8];
            self.read.read_exact(&mut body)?;
            let mut digest = CRC16.digest();
            digest.update(&header[2..6]);
            digest.update(&body);
            if digest.finalize() != crc {
                log::debug!("SBF block CRC mismatch. rescanning");
                continue;
            }
            let tow_ms = u32::from_le_bytes(body[0..4].try_into().unwrap());
            let wnc = u16::from_le_bytes(body[4..6].try_into().unwrap());
            return Ok(SbfBlock {
                block_number: id & 0x1fff,
                revision: u8::try_from(id >> 13).unwrap(),
                tow_ms,
                wnc,
                body: body.split_off(6),
            });
        }
    }

    fn find_sync(&mut self) -> std::io::Result<()> {
        let mut last = 0u8;
        loop {
            let mut byte = [0u8; 1];
            self.read.read_exact(&mut byte)?;
            if last == SYNC[0] && byte[0] == SYNC[1] {
                return Ok(());
            }
            last = byte[0];
        }
    }
}

/// A decoded GALRawINAV block.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GalRawInav {
    /// SVID as transmitted (Galileo SVN + 70).
    pub svid: u8,
    /// Whether the receiver reported the page CRC as passed.
    pub crc_passed: bool,
    /// Signal type (17 for E1).
    pub signal: u8,
    /// Receiver time of week in milliseconds.
    pub tow_ms: u32,
    /// Receiver week number.
    pub wnc: u16,
    /// The navigation bits, 8 little-endian 32-bit words.
    navbits: [u32; 8],
}

impl GalRawInav {
    /// Decodes a GALRawINAV from an SBF block.
    ///
    /// Returns `None` for other block numbers or truncated bodies.
    pub fn from_block(block: &SbfBlock) -> Option<GalRawInav> {
        if block.block_number != GAL_RAW_INAV || block.body.len() < 38 {
            return None;
        }
        let body = &block.body;
        let mut navbits = [0u32; 8];
        for (j, word) in navbits.iter_mut().enumerate() {
            *word = u32::from_le_bytes(body[6 + 4 * j..10 + 4 * j].try_into().unwrap());
        }
        Some(GalRawInav {
            svid: body[0],
            crc_passed: body[1] != 0,
            signal: body[3] & 0x1f,
            tow_ms: block.tow_ms,
            wnc: block.wnc,
            navbits,
        })
    }

    /// Gives the GST at the start of the page transmission.
    ///
    /// The receiver time stamps the end of the first second of the page; the
    /// page started two seconds before that plus the one-second offset of
    /// the time stamp itself, three seconds in total. Galileo weeks are the
    /// continuous week number minus 1024.
    pub fn gst(&self) -> Option<Gst> {
        if self.tow_ms == TOW_DO_NOT_USE || self.wnc == WNC_DO_NOT_USE {
            return None;
        }
        let tow = self.tow_ms / 1000;
        if tow >= 604800 || self.wnc < 1024 {
            return None;
        }
        Some(Gst::new(self.wnc - 1024, tow).add_seconds(-3))
    }

    /// Gives the Galileo SVN.
    pub fn svn(&self) -> Option<Svn> {
        Svn::try_from(self.svid.wrapping_sub(70)).ok()
    }

    /// Returns true when the block was received on E1.
    pub fn is_e1(&self) -> bool {
        self.signal == 17
    }

    /// Re-expands the 234 navigation bits into a 240-bit nominal page.
    ///
    /// Septentrio strips the 6-bit tail of the even half-page; it is
    /// restored as zeros, which the page CRC does not cover.
    pub fn page(&self) -> PageBits {
        let mut stream = [0u8; 32];
        for (j, word) in self.navbits.iter().enumerate() {
            stream[4 * j..4 * j + 4].copy_from_slice(&word.to_be_bytes());
        }
        let bits = BitSlice::from_slice(&stream);
        let mut page = [0u8; PAGE_BYTES];
        let dest = BitSlice::from_slice_mut(&mut page);
        dest[..114].copy_from_bitslice(&bits[..114]);
        dest[120..240].copy_from_bitslice(&bits[114..234]);
        page
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn make_block(block_number: u16, body: &[u8]) -> Vec<u8> {
        let length = 8 + body.len();
        assert_eq!(length % 4, 0);
        let mut frame = Vec::new();
        frame.extend_from_slice(&SYNC);
        let id = block_number; // revision 0
        let mut digest = CRC16.digest();
        digest.update(&id.to_le_bytes());
        digest.update(&u16::try_from(length).unwrap().to_le_bytes());
        digest.update(body);
        frame.extend_from_slice(&digest.finalize().to_le_bytes());
        frame.extend_from_slice(&id.to_le_bytes());
        frame.extend_from_slice(&u16::try_from(length).unwrap().to_le_bytes());
        frame.extend_from_slice(body);
        frame
    }

    fn inav_body(svid: u8, crc_passed: u8, signal: u8, tow_ms: u32, wnc: u16) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&tow_ms.to_le_bytes());
        body.extend_from_slice(&wnc.to_le_bytes());
        body.extend_from_slice(&[svid, crc_passed, 0, signal, 0, 0]);
        for j in 0..8u32 {
            body.extend_from_slice(&(j | 0xa0000000).to_le_bytes());
        }
        body
    }

    #[test]
    fn read_inav_block() {
        let body = inav_body(75, 1, 17, 124_503_000, 2224);
        let stream = make_block(GAL_RAW_INAV, &body);
        let mut reader = SbfReader::new(&stream[..]);
        let block = reader.read_block().unwrap();
        assert_eq!(block.block_number, GAL_RAW_INAV);
        let inav = GalRawInav::from_block(&block).unwrap();
        assert_eq!(u8::from(inav.svn().unwrap()), 5);
        assert!(inav.crc_passed);
        assert!(inav.is_e1());
        assert_eq!(inav.gst(), Some(Gst::new(1200, 124_500)));
        assert!(reader.read_block().is_err()); // EOF
    }

    #[test]
    fn corrupted_block_skipped() {
        let body = inav_body(75, 1, 17, 124_503_000, 2224);
        let mut stream = make_block(GAL_RAW_INAV, &body);
        stream[10] ^= 0xff; // corrupt the body of the first block
        stream.extend_from_slice(&make_block(GAL_RAW_INAV, &body));
        let mut reader = SbfReader::new(&stream[..]);
        // The corrupted copy is skipped; the second one is returned
        let block = reader.read_block().unwrap();
        assert_eq!(block.block_number, GAL_RAW_INAV);
        assert_eq!(block.tow_ms, 124_503_000);
    }

    #[test]
    fn page_expansion() {
        let body = inav_body(75, 1, 17, 124_503_000, 2224);
        let stream = make_block(GAL_RAW_INAV, &body);
        let mut reader = SbfReader::new(&stream[..]);
        let inav = GalRawInav::from_block(&reader.read_block().unwrap()).unwrap();
        let page = inav.page();
        let bits = BitSlice::from_slice(&page);
        // The re-inserted even tail is zeroed
        assert!(bits[114..120].not_any());
        // Bits beyond the tail come from the Septentrio stream unchanged
        let mut stream_bytes = [0u8; 32];
        for (j, word) in inav.navbits.iter().enumerate() {
            stream_bytes[4 * j..4 * j + 4].copy_from_slice(&word.to_be_bytes());
        }
        let stream_bits = BitSlice::from_slice(&stream_bytes);
        assert_eq!(&bits[..114], &stream_bits[..114]);
        assert_eq!(&bits[120..240], &stream_bits[114..234]);
    }
}
