//! Galileo System Time.
//!
//! Galileo System Time is expressed as a week number and a time of week in
//! seconds. The GST epoch is 1999-08-22 00:00:00 UTC. No leap second
//! correction is applied anywhere in this module; consumers that need UTC
//! apply the offset themselves.

use crate::types::BitSlice;
use bitvec::prelude::*;

/// Week number.
pub type Wn = u16;
/// Time of week in seconds.
pub type Tow = u32;
/// Time of week in hours.
pub type Towh = u8;

const SECS_IN_WEEK: Tow = 24 * 3600 * 7;
const SECS_PER_SUBFRAME: Tow = 30;

/// Galileo System Time.
///
/// A point in time expressed as `(wn, tow)`. The type guarantees
/// `tow < 604800` and is cheap to copy. All arithmetic is pure.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Gst {
    wn: Wn,
    tow: Tow,
}

impl Gst {
    /// Creates a new GST from a week number and a time of week in seconds.
    ///
    /// # Panics
    ///
    /// Panics if `tow` is not less than 604800.
    pub fn new(wn: Wn, tow: Tow) -> Self {
        assert!(tow < SECS_IN_WEEK);
        Gst { wn, tow }
    }

    /// Gives the week number.
    pub fn wn(&self) -> Wn {
        self.wn
    }

    /// Gives the time of week in seconds.
    pub fn tow(&self) -> Tow {
        self.tow
    }

    /// Adds (or subtracts, if negative) a number of seconds, handling week
    /// roll-overs.
    pub fn add_seconds(&self, seconds: i32) -> Self {
        let secs_in_week = i32::try_from(SECS_IN_WEEK).unwrap();
        let weeks = seconds / secs_in_week;
        let seconds = seconds - weeks * secs_in_week;
        let mut tow = i32::try_from(self.tow).unwrap() + seconds;
        let mut wn = i32::from(self.wn) + weeks;
        if tow < 0 {
            wn -= 1;
            tow += secs_in_week;
        } else if tow >= secs_in_week {
            wn += 1;
            tow -= secs_in_week;
        }
        assert!((0..secs_in_week).contains(&tow));
        Gst {
            wn: wn.try_into().unwrap(),
            tow: tow.try_into().unwrap(),
        }
    }

    /// Adds (or subtracts, if negative) a number of 30-second sub-frames.
    pub fn add_subframes(&self, subframes: i32) -> Self {
        self.add_seconds(subframes * i32::try_from(SECS_PER_SUBFRAME).unwrap())
    }

    /// Gives the GST at the start of the sub-frame containing `self`.
    ///
    /// This rounds the time of week down to the nearest multiple of 30.
    pub fn subframe(&self) -> Self {
        Gst {
            wn: self.wn,
            tow: self.tow / SECS_PER_SUBFRAME * SECS_PER_SUBFRAME,
        }
    }

    /// Returns true if `self` lies exactly on a sub-frame boundary.
    pub fn is_subframe(&self) -> bool {
        self.tow % SECS_PER_SUBFRAME == 0
    }

    /// Gives the number of seconds elapsed since the Galileo epoch
    /// (1999-08-22 00:00:00 UTC), as `wn * 604800 + tow`.
    pub fn timestamp(&self) -> u64 {
        u64::from(self.wn) * u64::from(SECS_IN_WEEK) + u64::from(self.tow)
    }

    /// Writes the 32-bit wire encoding `WN (12 bits) || TOW (20 bits)` used
    /// in MAC and one-way function inputs.
    pub fn write_bits(&self, dest: &mut BitSlice) {
        dest[..12].store_be(self.wn);
        dest[12..32].store_be(self.tow);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let gst = Gst::new(1176, 120930);
        assert_eq!(gst.add_seconds(30), Gst::new(1176, 120960));
        assert_eq!(gst.add_seconds(-30), Gst::new(1176, 120900));
        assert_eq!(gst.add_subframes(-2), Gst::new(1176, 120870));
    }

    #[test]
    fn week_rollover() {
        let gst = Gst::new(1176, 604770);
        assert_eq!(gst.add_seconds(60), Gst::new(1177, 30));
        let gst = Gst::new(1176, 0);
        assert_eq!(gst.add_seconds(-30), Gst::new(1175, 604770));
    }

    #[test]
    fn subframe_rounding() {
        let gst = Gst::new(1176, 120947);
        assert_eq!(gst.subframe(), Gst::new(1176, 120930));
        assert!(!gst.is_subframe());
        assert!(gst.subframe().is_subframe());
    }

    #[test]
    fn timestamp() {
        assert_eq!(Gst::new(0, 123).timestamp(), 123);
        assert_eq!(Gst::new(1176, 120930).timestamp(), 1176 * 604800 + 120930);
    }

    #[test]
    fn wire_encoding() {
        let gst = Gst::new(0x498, 0x12345);
        let mut buf = [0u8; 4];
        gst.write_bits(&mut BitSlice::from_slice_mut(&mut buf)[..32]);
        assert_eq!(buf, [0x49, 0x81, 0x23, 0x45]);
    }
}
