//! osnma-rx is a receiver core for the Galileo Open Service Navigation
//! Message Authentication (OSNMA) protocol. It ingests raw I/NAV pages,
//! assembles them into 30-second sub-frames per satellite, extracts the
//! OSNMA material interleaved in the navigation stream, verifies the signed
//! DSM-KROOT against an ECDSA public key (optionally pinned through a Merkle
//! tree), follows the TESLA one-way key chain with its delayed key
//! disclosure, and checks the MAC tags against the navigation data they
//! authenticate, producing one authentication verdict per tag.
//!
//! The central type is [`Osnma`], which owns all the receiver state and
//! publishes [`events::Event`]s to registered subscribers. The `osnma-cli`
//! binary wires it to a byte source (file, stdin, serial device or TCP) in
//! SBF or ASCII framing.

pub mod bitfields;
pub mod dsm;
pub mod events;
pub mod gst;
pub mod maclt;
pub mod merkle_tree;
pub mod navdata;
pub mod osnma;
pub mod page;
pub mod pubkey;
pub mod reader;
pub mod sbf;
pub mod source;
pub mod subframe;
pub mod svn;
pub mod tags;
pub mod tesla;
pub mod types;
pub mod validation;

pub use gst::{Gst, Tow, Towh, Wn};
pub use osnma::Osnma;
pub use svn::Svn;
pub use validation::{NotValidated, Validated};
