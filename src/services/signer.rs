//! Card-driven PKCS#7 signing service.
//!
//! Orchestrates the full flow of the file-level entry point: PIN
//! verification, key discovery, certificate retrieval and the
//! envelope build, all against one [`CardManager`] slot.

use std::path::Path;

use crate::domain::constants::{FID_APP_DOMAIN, FID_PKI_APP, RSA_SIGNATURE_LEN};
use crate::domain::pkcs7::{CardSigner, Pkcs7Builder};
use crate::domain::types::{CardPin, KeyId, PinId, SlotIndex};
use crate::infra::error::{CardError, CardResult};
use crate::services::session::CardManager;

/// A [`CardSigner`] bound to one slot and key of a session.
pub struct SlotSigner<'a> {
    manager: &'a CardManager,
    slot: SlotIndex,
    key_id: KeyId,
}

impl<'a> SlotSigner<'a> {
    #[must_use]
    pub fn new(manager: &'a CardManager, slot: SlotIndex, key_id: KeyId) -> Self {
        Self {
            manager,
            slot,
            key_id,
        }
    }
}

impl CardSigner for SlotSigner<'_> {
    fn sign_padded(
        &self,
        padded: &[u8; RSA_SIGNATURE_LEN],
    ) -> CardResult<[u8; RSA_SIGNATURE_LEN]> {
        self.manager.sign(self.slot, self.key_id, padded)
    }
}

/// PKCS#7 signing against a connected card session.
pub struct Pkcs7SignService<'a> {
    manager: &'a CardManager,
}

impl<'a> Pkcs7SignService<'a> {
    #[must_use]
    pub fn new(manager: &'a CardManager) -> Self {
        Self { manager }
    }

    /// Sign `payload` into an attached SignedData envelope.
    ///
    /// Verifies the holder PIN, discovers the signing key and its
    /// certificate, then drives the card through MSE/PSO for the
    /// signature. The whole exchange runs inside one transaction so
    /// another session cannot interleave.
    pub fn sign_bytes(
        &self,
        slot: SlotIndex,
        pin: &CardPin,
        payload: &[u8],
    ) -> CardResult<Vec<u8>> {
        log::info!("pkcs7 sign: slot {slot}, {} payload bytes", payload.len());
        self.manager.with_transaction(slot, |manager| {
            manager.select(slot, FID_APP_DOMAIN)?;
            manager.select(slot, FID_PKI_APP)?;
            manager.verify_pin(slot, PinId::USER, pin)?;

            let key_id = manager.get_key_id(slot)?;
            let certificate = manager.get_certificate(slot)?;
            log::debug!(
                "pkcs7 sign: key {key_id}, certificate of {} bytes",
                certificate.len()
            );

            let signer = SlotSigner::new(manager, slot, key_id);
            Pkcs7Builder::new(payload, &certificate).build(&signer)
        })
    }

    /// Sign the contents of `input` and write the P7M blob to
    /// `output`. No output file is left behind on failure.
    pub fn sign_file(
        &self,
        slot: SlotIndex,
        pin: &CardPin,
        input: &Path,
        output: &Path,
    ) -> CardResult<()> {
        let payload = std::fs::read(input)
            .map_err(|e| CardError::Io(format!("failed to read {}: {e}", input.display())))?;

        let envelope = self.sign_bytes(slot, pin, &payload)?;

        if let Err(e) = std::fs::write(output, &envelope) {
            let _ = std::fs::remove_file(output);
            return Err(CardError::Io(format!(
                "failed to write {}: {e}",
                output.display()
            )));
        }
        log::info!("pkcs7 sign: wrote {} bytes to {}", envelope.len(), output.display());
        Ok(())
    }
}
