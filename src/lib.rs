//! Fiscal-seal smart-card signing library.
//!
//! Produces PKCS#7 (CMS) SignedData envelopes and signed S/MIME
//! messages with an RSA key held on an ISO 7816 smart card, and
//! exposes the card's fiscal-seal counter/MAC operations used for
//! ticket-emission accounting.
//!
//! The typical flow: connect a slot, verify the PIN, sign. The
//! production reader driver lives behind the `pcsc-backend` feature;
//! any [`ReaderDriver`] implementation works in its place.
//!
//! ```no_run
//! use sigillo_signer::{sign_pkcs7_file, CardManager, CardPin, ReaderDriver, SlotIndex};
//!
//! # fn demo(driver: Box<dyn ReaderDriver>) -> Result<(), sigillo_signer::CardError> {
//! let manager = CardManager::new(driver);
//! let slot = SlotIndex::new(0)?;
//! manager.initialize(slot)?;
//!
//! let pin = CardPin::new("12345")?;
//! sign_pkcs7_file(&manager, slot, &pin, "receipt.xml".as_ref(), "receipt.xml.p7m".as_ref())?;
//!
//! manager.finalize(slot)?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod domain;
pub mod infra;
pub mod services;

use std::path::Path;

#[cfg(feature = "pcsc-backend")]
pub use adapters::PcscDriver;
pub use adapters::{CardConnection, ReaderDriver, TransportError};
pub use domain::crypto::{digest, md5, sha1, HashMechanism};
pub use domain::mime::{parse_attachment_list, AttachmentEncoding, MimeMessageBuilder};
pub use domain::pkcs7::{CardSigner, Pkcs7Builder};
pub use domain::types::{CardPin, KeyId, PinId, SlotIndex};
pub use infra::config::{ConfigManager, SigningConfiguration};
pub use infra::error::{CardError, CardResult, StatusWord};
pub use services::{CardManager, Pkcs7SignService, Seal, SmimeRequest, SmimeService};

/// Sign the contents of `input` into a P7M envelope at `output`.
///
/// The slot must already be initialized; the PIN is verified as part
/// of the flow. No output file is left behind on failure.
pub fn sign_pkcs7_file(
    manager: &CardManager,
    slot: SlotIndex,
    pin: &CardPin,
    input: &Path,
    output: &Path,
) -> CardResult<()> {
    Pkcs7SignService::new(manager).sign_file(slot, pin, input, output)
}

/// Build, sign and write a complete S/MIME message.
///
/// The inner message (body plus base64 attachments) is signed as a
/// whole; the resulting P7M travels as `application/x-pkcs7-mime`.
pub fn sign_smime_file(
    manager: &CardManager,
    slot: SlotIndex,
    pin: &CardPin,
    request: &SmimeRequest,
    output: &Path,
) -> CardResult<()> {
    SmimeService::new(manager).sign_to_file(slot, pin, request, output)
}
