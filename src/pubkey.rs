//! ECDSA public keys.
//!
//! OSNMA public keys are ECDSA P-256 or P-521 keys. A key is trusted either
//! because it was loaded directly from a PEM file supplied by the user, or
//! because it arrived in a DSM-PKR whose Merkle proof reconstructs the
//! pinned tree root.

use crate::bitfields::{DsmKroot, DsmPkr, EcdsaFunction, NewPublicKeyType, NmaHeader};
use crate::validation::{NotValidated, Validated};
use core::fmt;
use signature::Verifier;
use spki::DecodePublicKey;

#[derive(Clone)]
enum EcdsaKey {
    P256(p256::ecdsa::VerifyingKey),
    P521(Box<p521::ecdsa::VerifyingKey>),
}

// `p521::ecdsa::VerifyingKey` implements neither `Debug` nor `PartialEq`
// (unlike `p256::ecdsa::VerifyingKey`), so these are derived by hand from
// its encoded point.
impl fmt::Debug for EcdsaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcdsaKey::P256(key) => f.debug_tuple("P256").field(key).finish(),
            EcdsaKey::P521(key) => f
                .debug_tuple("P521")
                .field(&key.to_encoded_point(false))
                .finish(),
        }
    }
}

impl PartialEq for EcdsaKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (EcdsaKey::P256(a), EcdsaKey::P256(b)) => a == b,
            (EcdsaKey::P521(a), EcdsaKey::P521(b)) => {
                a.to_encoded_point(false) == b.to_encoded_point(false)
            }
            _ => false,
        }
    }
}

impl Eq for EcdsaKey {}

/// An OSNMA ECDSA public key with its key ID.
///
/// The validation type parameter marks whether the key is trusted. Keys
/// loaded from a DSM-PKR start as [`NotValidated`] and become [`Validated`]
/// through a Merkle proof check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey<V> {
    key: EcdsaKey,
    pkid: Option<u8>,
    _validated: V,
}

/// Errors produced when loading a public key.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PubkeyError {
    /// The PEM contents do not hold a P-256 or P-521 ECDSA public key.
    InvalidPem,
    /// The DSM-PKR does not carry an ECDSA key (reserved NPKT, or an OSNMA
    /// alert message).
    NotAKey,
    /// The key point encoding in the DSM-PKR is invalid.
    InvalidPoint,
}

impl fmt::Display for PubkeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PubkeyError::InvalidPem => "not a P-256 or P-521 ECDSA public key PEM".fmt(f),
            PubkeyError::NotAKey => "DSM-PKR does not carry an ECDSA key".fmt(f),
            PubkeyError::InvalidPoint => "invalid ECDSA point encoding".fmt(f),
        }
    }
}

impl std::error::Error for PubkeyError {}

/// Decodes a P-521 ECDSA verifying key from a PEM-encoded SPKI document.
///
/// `p521::ecdsa::VerifyingKey` does not implement `spki::DecodePublicKey`
/// (unlike `p256::ecdsa::VerifyingKey`), so the SPKI document is decoded by
/// hand and the raw SEC1 point handed to `from_sec1_bytes`.
fn p521_verifying_key_from_pem(pem: &str) -> Result<p521::ecdsa::VerifyingKey, PubkeyError> {
    let (_, doc) = spki::Document::from_pem(pem).map_err(|_| PubkeyError::InvalidPem)?;
    let info: spki::SubjectPublicKeyInfoOwned =
        doc.decode_msg().map_err(|_| PubkeyError::InvalidPem)?;
    let point = info.subject_public_key.raw_bytes();
    p521::ecdsa::VerifyingKey::from_sec1_bytes(point).map_err(|_| PubkeyError::InvalidPem)
}

impl PublicKey<Validated> {
    /// Loads a trusted key from a PEM-encoded SPKI document.
    ///
    /// P-256 is attempted first, then P-521. A key ID may be supplied to
    /// enforce PKID matching against DSM-KROOT messages; without one, any
    /// PKID is accepted.
    pub fn from_pem(pem: &str, pkid: Option<u8>) -> Result<PublicKey<Validated>, PubkeyError> {
        let key = if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_pem(pem) {
            EcdsaKey::P256(key)
        } else if let Ok(key) = p521_verifying_key_from_pem(pem) {
            EcdsaKey::P521(Box::new(key))
        } else {
            return Err(PubkeyError::InvalidPem);
        };
        Ok(PublicKey {
            key,
            pkid,
            _validated: Validated {},
        })
    }

    /// Wraps an already trusted P-256 verifying key.
    pub fn from_p256(key: p256::ecdsa::VerifyingKey, pkid: Option<u8>) -> PublicKey<Validated> {
        PublicKey {
            key: EcdsaKey::P256(key),
            pkid,
            _validated: Validated {},
        }
    }

    /// Gives the key ID, when one is enforced.
    pub fn public_key_id(&self) -> Option<u8> {
        self.pkid
    }

    /// Verifies the ECDSA signature of a DSM-KROOT message.
    ///
    /// The signature covers the NMA header and the DSM-KROOT contents up to
    /// and including the KROOT field.
    pub fn verify_dsm_kroot(&self, nma_header: NmaHeader, dsm_kroot: &DsmKroot<'_>) -> bool {
        let message = dsm_kroot.signature_message(nma_header);
        let Some(ds) = dsm_kroot.digital_signature() else {
            return false;
        };
        match (&self.key, dsm_kroot.ecdsa_function()) {
            (EcdsaKey::P256(key), Some(EcdsaFunction::P256Sha256)) => {
                let Ok(signature) = p256::ecdsa::Signature::from_slice(ds) else {
                    return false;
                };
                key.verify(&message, &signature).is_ok()
            }
            (EcdsaKey::P521(key), Some(EcdsaFunction::P521Sha512)) => {
                let Ok(signature) = p521::ecdsa::Signature::from_slice(ds) else {
                    return false;
                };
                key.verify(&message, &signature).is_ok()
            }
            _ => {
                log::error!("DSM-KROOT signature does not match the public key curve");
                false
            }
        }
    }
}

impl PublicKey<NotValidated> {
    /// Reads the candidate key carried in a DSM-PKR message.
    ///
    /// The key is not trusted until the DSM-PKR passes the Merkle proof
    /// check, after which [`PublicKey::force_valid`] can be applied.
    pub fn from_dsm_pkr(dsm_pkr: &DsmPkr<'_>) -> Result<PublicKey<NotValidated>, PubkeyError> {
        let NewPublicKeyType::EcdsaKey(function) = dsm_pkr.new_public_key_type() else {
            return Err(PubkeyError::NotAKey);
        };
        let point = dsm_pkr.new_public_key().ok_or(PubkeyError::NotAKey)?;
        let key = match function {
            EcdsaFunction::P256Sha256 => EcdsaKey::P256(
                p256::ecdsa::VerifyingKey::from_sec1_bytes(point)
                    .map_err(|_| PubkeyError::InvalidPoint)?,
            ),
            EcdsaFunction::P521Sha512 => EcdsaKey::P521(Box::new(
                p521::ecdsa::VerifyingKey::from_sec1_bytes(point)
                    .map_err(|_| PubkeyError::InvalidPoint)?,
            )),
        };
        Ok(PublicKey {
            key,
            pkid: Some(dsm_pkr.new_public_key_id()),
            _validated: NotValidated {},
        })
    }

    /// Marks the key as trusted.
    ///
    /// This must only be called after the DSM-PKR carrying the key has
    /// passed the Merkle proof check.
    pub fn force_valid(self) -> PublicKey<Validated> {
        PublicKey {
            key: self.key,
            pkid: self.pkid,
            _validated: Validated {},
        }
    }
}
