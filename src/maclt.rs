//! MAC Look-up Table.
//!
//! This module contains the MAC Look-up Table defined in ANNEX C of the
//! OSNMA ICD and the checks that use it: validation of the tag sequence
//! transmitted in a MACK message, and enumeration of the flexible entries
//! that enter the MACSEQ computation.

use crate::bitfields::{Adkd, Mack, Prnd};
use crate::Svn;
use core::fmt;

const MSG: usize = 2;

// Maximum value of nt in the MAC Look-up Table
const MAX_NT: usize = 10;

// Constants used for defining MAC Look-up Table entries more briefly
const F00S: Slot = Slot::Fixed {
    adkd: Adkd::InavCed,
    object: AuthObject::SelfAuth,
};
const F00E: Slot = Slot::Fixed {
    adkd: Adkd::InavCed,
    object: AuthObject::CrossAuth,
};
const F04S: Slot = Slot::Fixed {
    adkd: Adkd::InavTiming,
    object: AuthObject::SelfAuth,
};
const F12S: Slot = Slot::Fixed {
    adkd: Adkd::SlowMac,
    object: AuthObject::SelfAuth,
};
const F12E: Slot = Slot::Fixed {
    adkd: Adkd::SlowMac,
    object: AuthObject::CrossAuth,
};
const FLX: Slot = Slot::Flex;

struct Entry {
    id: u8,
    nt: u8,
    // The first slot of each sequence is omitted, since it is always 00S and
    // corresponds to tag0, which is never looked up.
    //
    // Inexistent slots at the end of a sequence are filled with FLX.
    sequence: [[Slot; MAX_NT - 1]; MSG],
}

static MACLT: [Entry; 12] = [
    Entry {
        id: 27,
        nt: 6,
        sequence: [
            [F00E, F00E, F00E, F12S, F00E, FLX, FLX, FLX, FLX],
            [F00E, F00E, F04S, F12S, F00E, FLX, FLX, FLX, FLX],
        ],
    },
    Entry {
        id: 28,
        nt: 10,
        sequence: [
            [F00E, F00E, F00E, F00S, F00E, F00E, F12S, F00E, F00E],
            [F00E, F00E, F00S, F00E, F00E, F04S, F12S, F00E, F00E],
        ],
    },
    Entry {
        id: 31,
        nt: 5,
        sequence: [
            [F00E, F00E, F12S, F00E, FLX, FLX, FLX, FLX, FLX],
            [F00E, F00E, F12S, F04S, FLX, FLX, FLX, FLX, FLX],
        ],
    },
    Entry {
        id: 33,
        nt: 6,
        sequence: [
            [F00E, F04S, F00E, F12S, F00E, FLX, FLX, FLX, FLX],
            [F00E, F00E, F12S, F00E, F12E, FLX, FLX, FLX, FLX],
        ],
    },
    Entry {
        id: 34,
        nt: 6,
        sequence: [
            [FLX, F04S, FLX, F12S, F00E, FLX, FLX, FLX, FLX],
            [FLX, F00E, F12S, F00E, F12E, FLX, FLX, FLX, FLX],
        ],
    },
    Entry {
        id: 35,
        nt: 6,
        sequence: [
            [FLX, F04S, FLX, F12S, FLX, FLX, FLX, FLX, FLX],
            [FLX, FLX, F12S, FLX, FLX, FLX, FLX, FLX, FLX],
        ],
    },
    Entry {
        id: 36,
        nt: 5,
        sequence: [
            [FLX, F04S, FLX, F12S, FLX, FLX, FLX, FLX, FLX],
            [FLX, F00E, F12S, F12E, FLX, FLX, FLX, FLX, FLX],
        ],
    },
    Entry {
        id: 37,
        nt: 5,
        sequence: [
            [F00E, F04S, F00E, F12S, FLX, FLX, FLX, FLX, FLX],
            [F00E, F00E, F12S, F12E, FLX, FLX, FLX, FLX, FLX],
        ],
    },
    Entry {
        id: 38,
        nt: 5,
        sequence: [
            [FLX, F04S, FLX, F12S, FLX, FLX, FLX, FLX, FLX],
            [FLX, FLX, F12S, FLX, FLX, FLX, FLX, FLX, FLX],
        ],
    },
    Entry {
        id: 39,
        nt: 4,
        sequence: [
            [FLX, F04S, FLX, FLX, FLX, FLX, FLX, FLX, FLX],
            [FLX, F00E, F12S, FLX, FLX, FLX, FLX, FLX, FLX],
        ],
    },
    Entry {
        id: 40,
        nt: 4,
        sequence: [
            [F00E, F04S, F12S, FLX, FLX, FLX, FLX, FLX, FLX],
            [F00E, F00E, F12E, FLX, FLX, FLX, FLX, FLX, FLX],
        ],
    },
    Entry {
        id: 41,
        nt: 4,
        sequence: [
            [FLX, F04S, FLX, FLX, FLX, FLX, FLX, FLX, FLX],
            [FLX, FLX, F12S, FLX, FLX, FLX, FLX, FLX, FLX],
        ],
    },
];

/// MAC Look-up Table slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Slot {
    /// A fixed slot, such as '00S', '04S', '12S', '00E', or '12E'.
    Fixed {
        /// ADKD of the fixed slot.
        adkd: Adkd,
        /// Authentication object of the fixed slot ('S' or 'E').
        object: AuthObject,
    },
    /// A flexible slot ('FLX' in the MAC Look-up Table).
    Flex,
}

/// Object authenticated by a MAC Look-up Table slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AuthObject {
    /// Self-authentication ('S' in the MAC Look-up Table entry).
    SelfAuth,
    /// Galileo Cross-authentication ('E' in the MAC Look-up Table entry).
    CrossAuth,
}

/// Errors produced by the MAC Look-up Table checks.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MacLtError {
    /// The MACLT value does not appear as an ID in the MAC Look-up Table.
    InvalidMaclt,
    /// The number of tags in the MACK does not match the table entry.
    WrongTagCount,
    /// A tag's ADKD does not match the slot in the table entry.
    WrongAdkd {
        /// Index of the first offending tag.
        tag_index: usize,
    },
    /// A tag's PRND is inconsistent with the self/cross authentication object
    /// of the slot in the table entry.
    WrongAuthObject {
        /// Index of the first offending tag.
        tag_index: usize,
    },
}

impl fmt::Display for MacLtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacLtError::InvalidMaclt => "invalid MAC look-up table ID".fmt(f),
            MacLtError::WrongTagCount => "wrong number of tags in MACK".fmt(f),
            MacLtError::WrongAdkd { tag_index } => {
                write!(f, "ADKD of tag {tag_index} does not match look-up table")
            }
            MacLtError::WrongAuthObject { tag_index } => {
                write!(f, "PRND of tag {tag_index} does not match look-up table")
            }
        }
    }
}

impl std::error::Error for MacLtError {}

fn find_entry(maclt: u8) -> Result<&'static Entry, MacLtError> {
    MACLT
        .iter()
        .find(|x| x.id == maclt)
        .ok_or(MacLtError::InvalidMaclt)
}

/// Looks up a slot in the MAC Look-up Table.
///
/// The `msg` parameter selects one of the two sequences of the entry (zero or
/// one, according to the sub-frame epoch), and `num_tag` is the index of the
/// tag in the MACK message (tag0 has no slot, so `num_tag` starts at 1).
///
/// # Panics
///
/// Panics if `msg` is not zero or one, or if `num_tag` is zero.
pub fn get_slot(maclt: u8, msg: usize, num_tag: usize) -> Result<Slot, MacLtError> {
    assert!(msg < MSG);
    assert!(num_tag >= 1);
    let entry = find_entry(maclt)?;
    if num_tag >= entry.nt.into() {
        return Err(MacLtError::WrongTagCount);
    }
    Ok(entry.sequence[msg][num_tag - 1])
}

/// Returns an iterator over the tag indices of the FLX slots.
///
/// These are the tags whose info sections enter the MACSEQ computation.
///
/// # Panics
///
/// Panics if `msg` is not zero or one.
pub fn flx_indices(maclt: u8, msg: usize) -> Result<impl Iterator<Item = usize>, MacLtError> {
    assert!(msg < MSG);
    let entry = find_entry(maclt)?;
    Ok(entry.sequence[msg]
        .iter()
        .take(usize::from(entry.nt) - 1)
        .enumerate()
        .filter_map(|(j, &x)| if x == FLX { Some(j + 1) } else { None }))
}

/// Checks the tag sequence of a MACK message against the MAC Look-up Table.
///
/// The `prna` parameter is the SVN of the satellite that transmitted the MACK
/// message, used to decide whether each tag is self- or cross-authenticating.
/// Flexible slots accept any tag.
///
/// # Panics
///
/// Panics if `msg` is not zero or one.
pub fn check_tag_sequence(
    maclt: u8,
    msg: usize,
    mack: &Mack<'_>,
    prna: Svn,
) -> Result<(), MacLtError> {
    assert!(msg < MSG);
    let entry = find_entry(maclt)?;
    if mack.num_tags() != usize::from(entry.nt) {
        return Err(MacLtError::WrongTagCount);
    }
    for j in 1..mack.num_tags() {
        let Slot::Fixed { adkd, object } = entry.sequence[msg][j - 1] else {
            continue;
        };
        let tag = mack.tag_and_info(j);
        if tag.adkd() != adkd {
            return Err(MacLtError::WrongAdkd { tag_index: j });
        }
        let self_auth = match tag.prnd() {
            Prnd::GalileoSvid(svid) => svid == u8::from(prna),
            // Timing parameters are constellation data, transmitted by every
            // satellite, so a constellation PRND counts as self.
            Prnd::GalileoConstellation => adkd == Adkd::InavTiming,
            Prnd::Reserved => false,
        };
        let expected_self = object == AuthObject::SelfAuth;
        if self_auth != expected_self {
            return Err(MacLtError::WrongAuthObject { tag_index: j });
        }
    }
    Ok(())
}
