//! Page readers.
//!
//! A page reader turns a raw byte source into a stream of nominal I/NAV
//! pages, either by demultiplexing SBF `GALRawINAV` blocks or by parsing
//! hex-encoded ASCII lines.

use crate::page::Pairing;
use crate::sbf::{GalRawInav, SbfReader};
use crate::types::{HalfPageBits, PageBits, HALF_PAGE_BYTES, PAGE_BYTES};
use crate::{Gst, Svn, Tow, Wn};
use std::io::{self, BufRead, BufReader, Read};

/// Input framing protocol.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Protocol {
    /// Septentrio Binary Format.
    Sbf,
    /// One hex-encoded page per line: `svid,wn,tow,hex`.
    Ascii,
}

/// An item produced by a page reader.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PageEvent {
    /// A nominal page, not yet CRC-validated.
    Page {
        /// Satellite that transmitted the page.
        svn: Svn,
        /// GST at the start of the page.
        gst: Gst,
        /// The 240 payload bits.
        page: PageBits,
    },
    /// The receiver flagged the page CRC as failed.
    CrcFail {
        /// Week number of the page.
        wn: Wn,
        /// Time of week of the page.
        tow: Tow,
        /// Satellite that transmitted the page.
        svid: u8,
    },
    /// Half-pages in an ASCII stream could not be paired.
    PairingFail {
        /// Week number of the offending half-page.
        wn: Wn,
        /// Time of week of the offending half-page.
        tow: Tow,
        /// Satellite that transmitted the half-page.
        svid: u8,
    },
}

enum Framing<R> {
    Sbf(SbfReader<R>),
    Ascii {
        lines: BufReader<R>,
        pairing: Pairing,
    },
}

/// Reads I/NAV pages from a byte source.
pub struct PageReader<R> {
    framing: Framing<R>,
}

impl<R: Read> PageReader<R> {
    /// Creates a page reader over a byte source.
    pub fn new(read: R, protocol: Protocol) -> PageReader<R> {
        let framing = match protocol {
            Protocol::Sbf => Framing::Sbf(SbfReader::new(read)),
            Protocol::Ascii => Framing::Ascii {
                lines: BufReader::new(read),
                pairing: Pairing::new(),
            },
        };
        PageReader { framing }
    }

    /// Reads the next page event. Returns `None` at end of stream.
    pub fn next_event(&mut self) -> io::Result<Option<PageEvent>> {
        match &mut self.framing {
            Framing::Sbf(sbf) => loop {
                let block = match sbf.read_block() {
                    Ok(block) => block,
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
                    Err(e) => return Err(e),
                };
                let Some(inav) = GalRawInav::from_block(&block) else {
                    continue;
                };
                if !inav.is_e1() {
                    continue;
                }
                let (Some(svn), Some(gst)) = (inav.svn(), inav.gst()) else {
                    log::debug!("GALRawINAV with do-not-use fields. skipping");
                    continue;
                };
                if !inav.crc_passed {
                    return Ok(Some(PageEvent::CrcFail {
                        wn: gst.wn(),
                        tow: gst.tow(),
                        svid: svn.into(),
                    }));
                }
                return Ok(Some(PageEvent::Page {
                    svn,
                    gst,
                    page: inav.page(),
                }));
            },
            Framing::Ascii { lines, pairing } => loop {
                let mut line = String::new();
                if lines.read_line(&mut line)? == 0 {
                    return Ok(None);
                }
                match parse_ascii_line(&line) {
                    Some((svn, gst, AsciiPayload::Page(page))) => {
                        return Ok(Some(PageEvent::Page { svn, gst, page }));
                    }
                    Some((svn, gst, AsciiPayload::Half(half))) => {
                        match pairing.feed(svn, gst, &half) {
                            Ok(Some(page)) => {
                                return Ok(Some(PageEvent::Page { svn, gst, page }))
                            }
                            Ok(None) => continue,
                            Err(e) => {
                                log::info!("pairing failed for {} at {:?}: {}", svn, gst, e);
                                return Ok(Some(PageEvent::PairingFail {
                                    wn: gst.wn(),
                                    tow: gst.tow(),
                                    svid: svn.into(),
                                }));
                            }
                        }
                    }
                    None => {
                        if !line.trim().is_empty() {
                            log::warn!("malformed ASCII page line: {}", line.trim());
                        }
                        continue;
                    }
                }
            },
        }
    }
}

enum AsciiPayload {
    Page(PageBits),
    Half(HalfPageBits),
}

// Line format: svid,wn,tow,hex with 60 hex digits for a full page or 30 for
// a half-page.
fn parse_ascii_line(line: &str) -> Option<(Svn, Gst, AsciiPayload)> {
    let mut fields = line.trim().split(',');
    let svid: u8 = fields.next()?.trim().parse().ok()?;
    let svn = Svn::try_from(svid).ok()?;
    let wn: Wn = fields.next()?.trim().parse().ok()?;
    let tow: Tow = fields.next()?.trim().parse().ok()?;
    if tow >= 604800 {
        return None;
    }
    let gst = Gst::new(wn, tow);
    let hex_digits = fields.next()?.trim();
    if fields.next().is_some() {
        return None;
    }
    match hex_digits.len() {
        l if l == 2 * PAGE_BYTES => {
            let mut page = [0u8; PAGE_BYTES];
            hex::decode_to_slice(hex_digits, &mut page).ok()?;
            Some((svn, gst, AsciiPayload::Page(page)))
        }
        l if l == 2 * HALF_PAGE_BYTES => {
            let mut half = [0u8; HALF_PAGE_BYTES];
            hex::decode_to_slice(hex_digits, &mut half).ok()?;
            Some((svn, gst, AsciiPayload::Half(half)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ascii_full_page() {
        let page_hex = "aa".repeat(PAGE_BYTES);
        let input = format!("11,1176,600,{page_hex}\n");
        let mut reader = PageReader::new(input.as_bytes(), Protocol::Ascii);
        match reader.next_event().unwrap().unwrap() {
            PageEvent::Page { svn, gst, page } => {
                assert_eq!(u8::from(svn), 11);
                assert_eq!(gst, Gst::new(1176, 600));
                assert_eq!(page, [0xaa; PAGE_BYTES]);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(reader.next_event().unwrap(), None);
    }

    #[test]
    fn ascii_half_pages() {
        let even_hex = "00".repeat(HALF_PAGE_BYTES);
        let odd_hex = format!("80{}", "00".repeat(HALF_PAGE_BYTES - 1));
        let input = format!("3,1176,602,{even_hex}\n3,1176,602,{odd_hex}\n");
        let mut reader = PageReader::new(input.as_bytes(), Protocol::Ascii);
        match reader.next_event().unwrap().unwrap() {
            PageEvent::Page { svn, page, .. } => {
                assert_eq!(u8::from(svn), 3);
                assert_eq!(page[15], 0x80);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn ascii_lone_odd_half() {
        let odd_hex = format!("80{}", "00".repeat(HALF_PAGE_BYTES - 1));
        let input = format!("3,1176,602,{odd_hex}\n");
        let mut reader = PageReader::new(input.as_bytes(), Protocol::Ascii);
        assert_eq!(
            reader.next_event().unwrap(),
            Some(PageEvent::PairingFail {
                wn: 1176,
                tow: 602,
                svid: 3
            })
        );
    }

    #[test]
    fn malformed_lines_skipped() {
        let input = "garbage\n11,1176,notanumber,aa\n\n";
        let mut reader = PageReader::new(input.as_bytes(), Protocol::Ascii);
        assert_eq!(reader.next_event().unwrap(), None);
    }
}
