//! Galileo SVN.

use crate::types::NUM_SVNS;
use core::fmt;

/// Galileo satellite number.
///
/// A number between 1 and 36, checked at construction. SVNs are written as
/// Exx (E24, for instance), which is what the `Display` implementation
/// produces.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Svn(u8);

impl Svn {
    /// Iterates over all the SVNs from E01 to E36 in increasing order.
    pub fn iter() -> impl Iterator<Item = Svn> {
        (1..=u8::try_from(NUM_SVNS).unwrap()).map(Svn)
    }

    /// Gives the zero-based index of this SVN, for array addressing.
    pub fn index(&self) -> usize {
        usize::from(self.0) - 1
    }
}

/// SVN construction error.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum SvnError {
    /// The value is outside the range 1-36.
    OutOfRange,
}

impl fmt::Display for SvnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SvnError::OutOfRange => "SVN outside the range 1-36".fmt(f),
        }
    }
}

impl std::error::Error for SvnError {}

macro_rules! impl_conv {
    ($($t:ty),*) => {
        $(
            impl From<Svn> for $t {
                fn from(svn: Svn) -> $t {
                    svn.0.into()
                }
            }

            impl TryFrom<$t> for Svn {
                type Error = SvnError;
                fn try_from(value: $t) -> Result<Svn, SvnError> {
                    match u8::try_from(value) {
                        Ok(v) if (1..=NUM_SVNS as u8).contains(&v) => Ok(Svn(v)),
                        _ => Err(SvnError::OutOfRange),
                    }
                }
            }
        )*
    };
}

impl_conv!(u16, u32, u64, usize, i32);

impl From<Svn> for u8 {
    fn from(svn: Svn) -> u8 {
        svn.0
    }
}

impl TryFrom<u8> for Svn {
    type Error = SvnError;
    fn try_from(value: u8) -> Result<Svn, SvnError> {
        if (1..=NUM_SVNS as u8).contains(&value) {
            Ok(Svn(value))
        } else {
            Err(SvnError::OutOfRange)
        }
    }
}

impl fmt::Display for Svn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:02}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn range() {
        assert!(Svn::try_from(0u8).is_err());
        assert!(Svn::try_from(1u8).is_ok());
        assert!(Svn::try_from(36u8).is_ok());
        assert!(Svn::try_from(37u8).is_err());
        assert!(Svn::try_from(255u8).is_err());
    }

    #[test]
    fn format() {
        assert_eq!(format!("{}", Svn::try_from(3u8).unwrap()), "E03");
        assert_eq!(format!("{}", Svn::try_from(24u8).unwrap()), "E24");
    }

    #[test]
    fn iterator() {
        let svns: Vec<Svn> = Svn::iter().collect();
        assert_eq!(svns.len(), NUM_SVNS);
        assert_eq!(svns[0].index(), 0);
        assert_eq!(u8::from(svns[35]), 36);
    }
}
