//! Validation status.
//!
//! Types in this module mark, at the type level, whether an object such as a
//! TESLA key or a public key has gone through its cryptographic checks.
//! Objects are created with a [`NotValidated`] parameter and transformed into
//! [`Validated`] objects only by the functions that perform the checks, so
//! that a key which has not been traced back to the ECDSA public key cannot
//! be used where an authentic key is required.

/// Validated status.
///
/// The object holding this has successfully gone through all the required
/// cryptographic validations.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Validated {}

/// Not validated status.
///
/// The object holding this has not yet gone through all the required
/// cryptographic validations.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct NotValidated {}
