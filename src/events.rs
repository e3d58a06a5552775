//! Authentication events and subscribers.
//!
//! The engine reports everything it decides through [`Event`] values
//! published to registered subscribers. Subscribers receive event payloads
//! by value and hold no references back into the engine; a failing
//! subscriber is logged and skipped, never interrupting processing.

use crate::{Tow, Wn};
use core::fmt;
use std::error::Error;

/// Terminal outcome of a tag authentication attempt.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum AuthOutcome {
    /// The recomputed tag matches the received tag.
    Ok,
    /// The key is authentic and the navigation data is present, but the tags
    /// differ.
    InvalidTag,
    /// The resolving TESLA key did not become authentic within the waiting
    /// window.
    MissingKey,
    /// The navigation data the tag refers to was never received.
    UnknownData,
}

impl fmt::Display for AuthOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthOutcome::Ok => "OK".fmt(f),
            AuthOutcome::InvalidTag => "INVALID_TAG".fmt(f),
            AuthOutcome::MissingKey => "MISSING_KEY".fmt(f),
            AuthOutcome::UnknownData => "UNKNOWN_DATA".fmt(f),
        }
    }
}

/// An event produced by the OSNMA engine.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Event {
    /// A tag authentication attempt reached its terminal outcome.
    AuthAttempt {
        /// Satellite whose data was authenticated (255 for constellation
        /// data).
        prnd: u8,
        /// Satellite that transmitted the tag.
        prna: u8,
        /// Week number of the tag sub-frame.
        wn: Wn,
        /// Time of week of the tag sub-frame.
        tow: Tow,
        /// ADKD of the tag.
        adkd: u8,
        /// Outcome of the attempt.
        outcome: AuthOutcome,
    },
    /// A page failed its CRC check.
    PageCrcFail {
        /// Week number of the page.
        wn: Wn,
        /// Time of week of the page.
        tow: Tow,
        /// Satellite that transmitted the page.
        svid: u8,
    },
    /// Half-pages could not be paired.
    PairingFail {
        /// Week number of the offending half-page.
        wn: Wn,
        /// Time of week of the offending half-page.
        tow: Tow,
        /// Satellite that transmitted the half-page.
        svid: u8,
    },
    /// A sub-frame epoch ended with missing pages and was not delivered.
    SubframeGap {
        /// Week number of the sub-frame epoch.
        wn: Wn,
        /// Time of week of the sub-frame epoch.
        tow: Tow,
        /// Affected satellite.
        svid: u8,
    },
    /// The tag sequence of a MACK message does not follow the MAC look-up
    /// table.
    TagSequenceFail {
        /// Week number of the MACK sub-frame.
        wn: Wn,
        /// Time of week of the MACK sub-frame.
        tow: Tow,
        /// Satellite that transmitted the MACK.
        svid: u8,
    },
    /// The MACSEQ field of a MACK message failed verification.
    MacseqFail {
        /// Week number of the MACK sub-frame.
        wn: Wn,
        /// Time of week of the MACK sub-frame.
        tow: Tow,
        /// Satellite that transmitted the MACK.
        svid: u8,
    },
    /// A DSM-KROOT was verified and its chain installed.
    KrootVerified {
        /// Chain ID of the installed chain.
        chain_id: u8,
    },
    /// A complete DSM-KROOT failed verification.
    KrootSignatureFail,
    /// A disclosed TESLA key failed the one-way chain walk.
    KeyChainFail {
        /// Week number of the sub-frame disclosing the key.
        wn: Wn,
        /// Time of week of the sub-frame disclosing the key.
        tow: Tow,
        /// Satellite that disclosed the key.
        svid: u8,
    },
    /// A DSM-PKR failed the Merkle proof check.
    MerkleProofFail,
    /// A DSM reassembly buffer was discarded due to inconsistent blocks.
    DsmDiscarded {
        /// DSM ID of the discarded buffer.
        dsm_id: u8,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::AuthAttempt {
                prnd,
                prna,
                wn,
                tow,
                adkd,
                outcome,
            } => write!(
                f,
                "AuthAttempt(PRND={prnd}, PRNA={prna}, wn={wn}, tow={tow}, \
                 adkd={adkd}, outcome={outcome})"
            ),
            Event::PageCrcFail { wn, tow, svid } => {
                write!(f, "Page CRC failed. WN: {wn}, TOW: {tow}, SVID: {svid}")
            }
            Event::PairingFail { wn, tow, svid } => {
                write!(f, "Page pairing failed. WN: {wn}, TOW: {tow}, SVID: {svid}")
            }
            Event::SubframeGap { wn, tow, svid } => {
                write!(f, "Sub-frame gap. WN: {wn}, TOW: {tow}, SVID: {svid}")
            }
            Event::TagSequenceFail { wn, tow, svid } => write!(
                f,
                "Tag sequence verification failed. WN: {wn}, TOW: {tow}, SVID: {svid}"
            ),
            Event::MacseqFail { wn, tow, svid } => write!(
                f,
                "MACSEQ verification failed. WN: {wn}, TOW: {tow}, SVID: {svid}"
            ),
            Event::KrootVerified { chain_id } => {
                write!(f, "KROOT verified. Chain ID: {chain_id}")
            }
            Event::KrootSignatureFail => "KROOT_SIGNATURE_FAIL".fmt(f),
            Event::KeyChainFail { wn, tow, svid } => {
                write!(f, "KEY_CHAIN_FAIL. WN: {wn}, TOW: {tow}, SVID: {svid}")
            }
            Event::MerkleProofFail => "MERKLE_PROOF_FAIL".fmt(f),
            Event::DsmDiscarded { dsm_id } => {
                write!(f, "DSM buffer discarded. DSM ID: {dsm_id}")
            }
        }
    }
}

/// A consumer of engine events.
///
/// Implementations must not panic; errors are reported through the return
/// value, logged by the publisher and otherwise ignored.
pub trait Subscriber {
    /// Handles one event.
    fn on_event(&mut self, event: &Event) -> Result<(), Box<dyn Error>>;
}

/// The engine-owned list of subscribers.
#[derive(Default)]
pub struct SubscriberSystem {
    subscribers: Vec<Box<dyn Subscriber>>,
}

impl SubscriberSystem {
    /// Creates an empty subscriber list.
    pub fn new() -> SubscriberSystem {
        SubscriberSystem::default()
    }

    /// Registers a subscriber.
    pub fn register(&mut self, subscriber: Box<dyn Subscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Publishes an event to every subscriber.
    ///
    /// A subscriber failure is logged and does not prevent delivery to the
    /// remaining subscribers.
    pub fn publish(&mut self, event: &Event) {
        for subscriber in &mut self.subscribers {
            if let Err(e) = subscriber.on_event(event) {
                log::warn!("subscriber failed to handle event {event}: {e}");
            }
        }
    }
}

impl fmt::Debug for SubscriberSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberSystem")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Subscriber that prints every event to stdout, one per line.
#[derive(Debug, Default)]
pub struct PrintSubscriber {}

impl PrintSubscriber {
    /// Creates a new printing subscriber.
    pub fn new() -> PrintSubscriber {
        PrintSubscriber {}
    }
}

impl Subscriber for PrintSubscriber {
    fn on_event(&mut self, event: &Event) -> Result<(), Box<dyn Error>> {
        println!("{event}");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn canonical_formats() {
        let event = Event::AuthAttempt {
            prnd: 11,
            prna: 12,
            wn: 1176,
            tow: 600,
            adkd: 0,
            outcome: AuthOutcome::Ok,
        };
        assert_eq!(
            format!("{event}"),
            "AuthAttempt(PRND=11, PRNA=12, wn=1176, tow=600, adkd=0, outcome=OK)"
        );
        let event = Event::PageCrcFail {
            wn: 1176,
            tow: 602,
            svid: 11,
        };
        assert_eq!(format!("{event}"), "Page CRC failed. WN: 1176, TOW: 602, SVID: 11");
    }

    struct Failing;
    struct Counting(std::rc::Rc<std::cell::Cell<usize>>);

    impl Subscriber for Failing {
        fn on_event(&mut self, _: &Event) -> Result<(), Box<dyn Error>> {
            Err("always fails".into())
        }
    }

    impl Subscriber for Counting {
        fn on_event(&mut self, _: &Event) -> Result<(), Box<dyn Error>> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn failure_does_not_interrupt() {
        let count = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut system = SubscriberSystem::new();
        system.register(Box::new(Failing));
        system.register(Box::new(Counting(count.clone())));
        system.publish(&Event::KrootSignatureFail);
        assert_eq!(count.get(), 1);
    }
}
