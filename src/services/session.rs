//! Card session management.
//!
//! Owns the per-slot connection table, the nested transaction
//! counters and the single APDU transport primitive with its
//! reset-recovery retry. Higher layers (fiscal seal, PKCS#7 signing)
//! compose the file-level operations defined here.

use std::sync::Mutex;

use crate::adapters::{CardConnection, ReaderDriver, TransportError};
use crate::domain::constants::{
    APDU_CHANGE_REFERENCE_DATA, APDU_MSE_RESTORE, APDU_MSE_SET, APDU_PSO_SIGN, APDU_READ_BINARY,
    APDU_READ_RECORD, APDU_RESET_RETRY_COUNTER, APDU_SELECT, APDU_VERIFY_PIN, EXCHANGE_BUFFER,
    FID_APP_DOMAIN, FID_EF_CA_CERT, FID_EF_GDO, FID_EF_KEY_INFO, FID_EF_SIAE_CERT, FID_MF,
    FID_PKI_APP, MAX_READERS, PIN_REFERENCE_PUK, PIN_REFERENCE_USER, RSA_SIGNATURE_LEN,
};
use crate::domain::types::{CardPin, KeyId, PinId, SlotIndex};
use crate::infra::error::{CardError, CardResult, StatusWord};

/// Payload and status word of one APDU exchange.
#[derive(Debug)]
pub struct ApduResponse {
    pub data: Vec<u8>,
    pub sw: StatusWord,
}

struct Slot {
    reader_name: String,
    connection: Box<dyn CardConnection>,
    /// Nested transaction depth; the card lock is held while > 0.
    transactions: u32,
}

/// Process-wide card session state: the reader driver, one entry per
/// slot, and the default-slot pointer set on the first connect.
pub struct CardManager {
    driver: Box<dyn ReaderDriver>,
    slots: Vec<Mutex<Option<Slot>>>,
    default_slot: Mutex<Option<SlotIndex>>,
}

impl CardManager {
    #[must_use]
    pub fn new(driver: Box<dyn ReaderDriver>) -> Self {
        Self {
            driver,
            slots: (0..MAX_READERS).map(|_| Mutex::new(None)).collect(),
            default_slot: Mutex::new(None),
        }
    }

    fn slot_guard(&self, slot: SlotIndex) -> std::sync::MutexGuard<'_, Option<Slot>> {
        self.slots[slot.index()]
            .lock()
            .expect("slot lock poisoned")
    }

    /// The slot of the first successful [`CardManager::initialize`].
    #[must_use]
    pub fn default_slot(&self) -> Option<SlotIndex> {
        *self.default_slot.lock().expect("default slot lock poisoned")
    }

    /// Connect the reader at `slot` in shared mode, requesting T=1.
    ///
    /// # Errors
    ///
    /// `AlreadyInitialized` if the slot is connected, `NoCard` when
    /// the reader is absent or empty, `ContextError` on driver-level
    /// failure.
    pub fn initialize(&self, slot: SlotIndex) -> CardResult<()> {
        log::info!("initialize: slot {slot}");
        let mut guard = self.slot_guard(slot);
        if guard.is_some() {
            return Err(CardError::AlreadyInitialized);
        }

        let readers = self.driver.list_readers().map_err(map_transport)?;
        let reader_name = readers
            .into_iter()
            .nth(slot.index())
            .ok_or(CardError::NoCard)?;

        let connection = self.driver.connect(&reader_name).map_err(map_transport)?;
        *guard = Some(Slot {
            reader_name,
            connection,
            transactions: 0,
        });
        drop(guard);

        let mut default = self.default_slot.lock().expect("default slot lock poisoned");
        if default.is_none() {
            *default = Some(slot);
        }
        Ok(())
    }

    /// Disconnect `slot`, resetting the card. Outstanding transactions
    /// are balanced before the disconnect; when the last slot closes,
    /// the driver context is released.
    ///
    /// # Errors
    ///
    /// `NotInitialized` when the slot was never connected.
    pub fn finalize(&self, slot: SlotIndex) -> CardResult<()> {
        let mut taken = {
            let mut guard = self.slot_guard(slot);
            guard.take().ok_or(CardError::NotInitialized)?
        };
        log::info!("finalize: slot {slot} ({})", taken.reader_name);

        while taken.transactions > 0 {
            let _ = taken.connection.end_transaction();
            taken.transactions -= 1;
        }
        taken.connection.disconnect();
        drop(taken);

        let any_open = self
            .slots
            .iter()
            .any(|s| s.lock().expect("slot lock poisoned").is_some());
        if !any_open {
            self.driver.release();
        }
        Ok(())
    }

    /// Whether reader `n` currently holds a card. Never mutates
    /// session state.
    pub fn is_card_in(&self, n: usize) -> CardResult<bool> {
        let readers = self.driver.list_readers().map_err(map_transport)?;
        match readers.get(n) {
            Some(name) => self.driver.card_present(name).map_err(map_transport),
            None => Ok(false),
        }
    }

    /// Acquire the exclusive card lock on the 0 -> 1 depth transition.
    pub fn begin_transaction(&self, slot: SlotIndex) -> CardResult<()> {
        let mut guard = self.slot_guard(slot);
        let entry = guard.as_mut().ok_or(CardError::NotInitialized)?;
        if entry.transactions == 0 {
            entry.connection.begin_transaction().map_err(map_transport)?;
        }
        entry.transactions += 1;
        log::trace!("begin_transaction: slot {slot} depth {}", entry.transactions);
        Ok(())
    }

    /// Release the card lock on the 1 -> 0 transition. An unbalanced
    /// end is tolerated; the counter saturates at zero.
    pub fn end_transaction(&self, slot: SlotIndex) -> CardResult<()> {
        let mut guard = self.slot_guard(slot);
        let entry = guard.as_mut().ok_or(CardError::NotInitialized)?;
        if entry.transactions > 0 {
            entry.transactions -= 1;
            if entry.transactions == 0 {
                entry.connection.end_transaction().map_err(map_transport)?;
            }
        }
        log::trace!("end_transaction: slot {slot} depth {}", entry.transactions);
        Ok(())
    }

    /// Current transaction depth, mainly for diagnostics and tests.
    pub fn transaction_depth(&self, slot: SlotIndex) -> CardResult<u32> {
        let guard = self.slot_guard(slot);
        Ok(guard.as_ref().ok_or(CardError::NotInitialized)?.transactions)
    }

    /// Run `f` inside one balanced transaction on `slot`.
    pub fn with_transaction<T>(
        &self,
        slot: SlotIndex,
        f: impl FnOnce(&Self) -> CardResult<T>,
    ) -> CardResult<T> {
        self.begin_transaction(slot)?;
        let result = f(self);
        let _ = self.end_transaction(slot);
        result
    }

    /// The single transport primitive: send one APDU, return payload
    /// and status word.
    ///
    /// `header` packs CLA INS P1 P2 big-endian; `data` becomes the Lc
    /// field when non-empty; `le` is appended for every instruction
    /// except SELECT, defaulting to 0 ("up to 256").
    ///
    /// A "card reset" from the driver triggers one transparent
    /// reconnect (re-acquiring the card lock when a transaction is
    /// outstanding) and a retry of the same APDU; a second reset is a
    /// hard `NoCard`. Transport errors that resolve to `NoCard` empty
    /// the slot.
    pub fn send_apdu(
        &self,
        slot: SlotIndex,
        header: u32,
        data: &[u8],
        le: Option<u8>,
    ) -> CardResult<ApduResponse> {
        if data.len() > 255 {
            return Err(CardError::InvalidInput(format!(
                "APDU data of {} bytes exceeds the short Lc limit",
                data.len()
            )));
        }

        let mut apdu = Vec::with_capacity(6 + data.len());
        apdu.extend_from_slice(&header.to_be_bytes());
        if !data.is_empty() {
            apdu.push(data.len() as u8);
            apdu.extend_from_slice(data);
        }
        // SELECT (INS A4) goes out without a trailing Le octet.
        if apdu[1] != 0xA4 {
            apdu.push(le.unwrap_or(0));
        }

        let mut guard = self.slot_guard(slot);
        if guard.is_none() {
            return Err(CardError::NotInitialized);
        }

        log::trace!("send_apdu: slot {slot} header {header:08X} lc {}", data.len());
        let mut reset_retries = 1;
        let response = loop {
            let entry = guard.as_mut().expect("slot checked above");
            match entry.connection.transmit(&apdu) {
                Ok(response) => break response,
                Err(TransportError::Reset) if reset_retries > 0 => {
                    reset_retries -= 1;
                    log::warn!("send_apdu: card reset on slot {slot}, reconnecting");
                    if let Err(e) = entry.connection.reconnect() {
                        let fatal = match e {
                            TransportError::Context(m) => CardError::ContextError(m),
                            _ => CardError::NoCard,
                        };
                        if matches!(fatal, CardError::NoCard) {
                            *guard = None;
                        }
                        return Err(fatal);
                    }
                    if entry.transactions > 0 {
                        if let Err(e) = entry.connection.begin_transaction() {
                            let err = map_transport(e);
                            if matches!(err, CardError::NoCard) {
                                *guard = None;
                            }
                            return Err(err);
                        }
                    }
                }
                Err(TransportError::Reset | TransportError::NoCard) => {
                    // Connected -> Empty on a transport loss.
                    *guard = None;
                    return Err(CardError::NoCard);
                }
                Err(TransportError::Context(m)) => return Err(CardError::ContextError(m)),
                Err(TransportError::Failed(m)) => return Err(CardError::Generic(m)),
            }
        };

        if response.len() < 2 {
            return Err(CardError::Generic(format!(
                "short card response: {} bytes",
                response.len()
            )));
        }
        let sw = StatusWord(
            (u16::from(response[response.len() - 2]) << 8)
                | u16::from(response[response.len() - 1]),
        );
        log::trace!("send_apdu: slot {slot} -> {sw:?}");
        Ok(ApduResponse {
            data: response[..response.len() - 2].to_vec(),
            sw,
        })
    }

    /// SELECT a file by identifier.
    pub fn select(&self, slot: SlotIndex, fid: u16) -> CardResult<()> {
        self.with_transaction(slot, |this| {
            let response = this.send_apdu(slot, APDU_SELECT, &fid.to_be_bytes(), None)?;
            if !response.sw.is_ok() {
                return Err(CardError::Status(response.sw));
            }
            Ok(())
        })
    }

    /// READ BINARY of `len` bytes starting at `offset`, chunked at the
    /// exchange size.
    ///
    /// # Errors
    ///
    /// When the file ends before `len` bytes, the bytes read so far
    /// come back inside [`CardError::ShortRead`].
    pub fn read_binary(&self, slot: SlotIndex, offset: u16, len: usize) -> CardResult<Vec<u8>> {
        if len == 0 {
            return Err(CardError::Generic("zero-length read".to_string()));
        }
        self.with_transaction(slot, |this| {
            let mut collected = Vec::with_capacity(len);
            let mut position = offset;
            let mut remaining = len;

            while remaining > 0 {
                let chunk = remaining.min(EXCHANGE_BUFFER);
                let response = this.send_apdu(
                    slot,
                    APDU_READ_BINARY | u32::from(position),
                    &[],
                    Some(chunk as u8),
                )?;
                if !response.sw.is_ok() && response.sw != StatusWord::WRONG_LENGTH {
                    return Err(CardError::Status(response.sw));
                }
                let got = response.data.len().min(chunk);
                collected.extend_from_slice(&response.data[..got]);
                if got < chunk {
                    return Err(CardError::ShortRead { data: collected });
                }
                remaining -= chunk;
                position = position.wrapping_add(chunk as u16);
            }
            Ok(collected)
        })
    }

    /// READ RECORD `record` (one-based), expecting up to `le` bytes.
    pub fn read_record(&self, slot: SlotIndex, record: u8, le: u8) -> CardResult<Vec<u8>> {
        self.with_transaction(slot, |this| {
            let header = APDU_READ_RECORD | (u32::from(record) << 8) | 0x04;
            let response = this.send_apdu(slot, header, &[], Some(le))?;
            if !response.sw.is_ok() {
                return Err(CardError::Status(response.sw));
            }
            Ok(response.data)
        })
    }

    /// VERIFY the holder PIN.
    ///
    /// A `67 00` answer (wrong length) is retried with the PIN padded
    /// to the card's fixed 8-byte block. On `63 00` a zero-length
    /// VERIFY is issued and its status word - carrying the remaining
    /// tries in the low nibble - is returned as the error.
    pub fn verify_pin(&self, slot: SlotIndex, id: PinId, pin: &CardPin) -> CardResult<()> {
        let _ = id; // only the user PIN exists; PinId validated it
        self.with_transaction(slot, |this| {
            let header = APDU_VERIFY_PIN | PIN_REFERENCE_USER;
            let mut response = this.send_apdu(slot, header, pin.as_bytes(), None)?;

            if response.sw == StatusWord::WRONG_LC {
                response = this.send_apdu(slot, header, &pin.as_block(), None)?;
            }
            if response.sw == StatusWord::AUTH_FAILED {
                let tries = this.send_apdu(slot, header, &[], None)?;
                return Err(CardError::Status(tries.sw));
            }
            if !response.sw.is_ok() {
                return Err(CardError::Status(response.sw));
            }
            log::info!("verify_pin: slot {slot} ok");
            Ok(())
        })
    }

    /// CHANGE REFERENCE DATA: old and new PIN in one 16-byte block.
    pub fn change_pin(
        &self,
        slot: SlotIndex,
        id: PinId,
        old_pin: &CardPin,
        new_pin: &CardPin,
    ) -> CardResult<()> {
        let _ = id;
        self.with_transaction(slot, |this| {
            let mut block = [0u8; 16];
            block[..8].copy_from_slice(&old_pin.as_block());
            block[8..].copy_from_slice(&new_pin.as_block());
            let response = this.send_apdu(
                slot,
                APDU_CHANGE_REFERENCE_DATA | PIN_REFERENCE_USER,
                &block,
                None,
            )?;
            if response.sw == StatusWord::AUTH_FAILED {
                let tries =
                    this.send_apdu(slot, APDU_VERIFY_PIN | PIN_REFERENCE_USER, &[], None)?;
                return Err(CardError::Status(tries.sw));
            }
            if !response.sw.is_ok() {
                return Err(CardError::Status(response.sw));
            }
            Ok(())
        })
    }

    /// RESET RETRY COUNTER: PUK and replacement PIN in one 16-byte
    /// block. The remaining-tries query goes to the PUK reference.
    pub fn unblock_pin(
        &self,
        slot: SlotIndex,
        id: PinId,
        puk: &CardPin,
        new_pin: &CardPin,
    ) -> CardResult<()> {
        let _ = id;
        self.with_transaction(slot, |this| {
            let mut block = [0u8; 16];
            block[..8].copy_from_slice(&puk.as_block());
            block[8..].copy_from_slice(&new_pin.as_block());
            let response = this.send_apdu(
                slot,
                APDU_RESET_RETRY_COUNTER | PIN_REFERENCE_USER,
                &block,
                Some(0),
            )?;
            if response.sw == StatusWord::AUTH_FAILED {
                let tries =
                    this.send_apdu(slot, APDU_VERIFY_PIN | PIN_REFERENCE_PUK, &[], None)?;
                return Err(CardError::Status(tries.sw));
            }
            if !response.sw.is_ok() {
                return Err(CardError::Status(response.sw));
            }
            Ok(())
        })
    }

    /// Card serial number: 8 bytes at offset 18 of EF GDO.
    pub fn get_sn(&self, slot: SlotIndex) -> CardResult<[u8; 8]> {
        self.with_transaction(slot, |this| {
            this.select(slot, FID_MF)
                .map_err(|_| CardError::Status(StatusWord::FILE_NOT_FOUND))?;
            this.select(slot, FID_EF_GDO)
                .map_err(|_| CardError::Status(StatusWord::FILE_NOT_FOUND))?;
            let gdo = this.read_binary(slot, 0, 26)?;
            let mut serial = [0u8; 8];
            serial.copy_from_slice(&gdo[18..26]);
            Ok(serial)
        })
    }

    /// Discover the signing key: scan the key-info EF records for the
    /// first one flagged active; its id is `0x80 + record`.
    pub fn get_key_id(&self, slot: SlotIndex) -> CardResult<KeyId> {
        self.with_transaction(slot, |this| {
            this.select(slot, FID_APP_DOMAIN)?;
            this.select(slot, FID_PKI_APP)?;
            this.select(slot, FID_EF_KEY_INFO)?;
            let mut record = 1u8;
            while let Ok(data) = this.read_record(slot, record, 1) {
                if data.first() == Some(&1) {
                    return KeyId::new(0x80 + record);
                }
                record = record
                    .checked_add(1)
                    .ok_or_else(|| CardError::Generic("key-info EF overflow".to_string()))?;
            }
            Err(CardError::Generic("no signing key on card".to_string()))
        })
    }

    /// Read a length-prefixed certificate EF: a 2-byte little-endian
    /// size followed by the DER body.
    fn read_certificate_ef(&self, slot: SlotIndex, fid: u16) -> CardResult<Vec<u8>> {
        self.select(slot, fid)
            .map_err(|_| CardError::Generic(format!("certificate EF {fid:04X} not found")))?;
        let prefix = self.read_binary(slot, 0, 2)?;
        let length = usize::from(u16::from_le_bytes([prefix[0], prefix[1]]));
        if length == 0 {
            return Err(CardError::Generic(format!(
                "certificate EF {fid:04X} is empty"
            )));
        }
        self.read_binary(slot, 2, length)
    }

    /// The signer certificate for the discovered key.
    pub fn get_certificate(&self, slot: SlotIndex) -> CardResult<Vec<u8>> {
        self.with_transaction(slot, |this| {
            let key_id = this.get_key_id(slot)?;
            this.read_certificate_ef(slot, key_id.certificate_fid())
        })
    }

    /// The CA certificate stored on the card.
    pub fn get_ca_certificate(&self, slot: SlotIndex) -> CardResult<Vec<u8>> {
        self.with_transaction(slot, |this| {
            this.select(slot, FID_MF)?;
            this.select(slot, FID_APP_DOMAIN)?;
            this.select(slot, FID_PKI_APP)?;
            this.read_certificate_ef(slot, FID_EF_CA_CERT)
        })
    }

    /// The SIAE certificate stored on the card.
    pub fn get_siae_certificate(&self, slot: SlotIndex) -> CardResult<Vec<u8>> {
        self.with_transaction(slot, |this| {
            this.select(slot, FID_MF)?;
            this.select(slot, FID_APP_DOMAIN)?;
            this.select(slot, FID_PKI_APP)?;
            this.read_certificate_ef(slot, FID_EF_SIAE_CERT)
        })
    }

    /// On-card RSA signature over an already padded 128-byte block:
    /// MSE RESTORE, MSE SET with the key reference, then PSO SIGN.
    pub fn sign(
        &self,
        slot: SlotIndex,
        key_id: KeyId,
        padded: &[u8; RSA_SIGNATURE_LEN],
    ) -> CardResult<[u8; RSA_SIGNATURE_LEN]> {
        self.with_transaction(slot, |this| {
            this.select(slot, FID_MF)
                .map_err(|_| CardError::Status(StatusWord::FILE_NOT_FOUND))?;
            this.select(slot, FID_APP_DOMAIN)
                .map_err(|_| CardError::Status(StatusWord::FILE_NOT_FOUND))?;
            this.select(slot, FID_PKI_APP)
                .map_err(|_| CardError::Status(StatusWord::FILE_NOT_FOUND))?;

            // Restore the default security environment; not every card
            // profile implements it, so the status is not checked.
            let _ = this.send_apdu(slot, APDU_MSE_RESTORE, &[], None)?;

            let mse = [0x83, 0x01, key_id.as_u8()];
            let response = this.send_apdu(slot, APDU_MSE_SET, &mse, None)?;
            if !response.sw.is_ok() {
                return Err(CardError::Status(response.sw));
            }

            let mut payload = Vec::with_capacity(1 + RSA_SIGNATURE_LEN);
            payload.push(0x00);
            payload.extend_from_slice(padded);
            let response =
                this.send_apdu(slot, APDU_PSO_SIGN, &payload, Some(RSA_SIGNATURE_LEN as u8))?;
            if !response.sw.is_ok() {
                return Err(CardError::Status(response.sw));
            }
            if response.data.len() < RSA_SIGNATURE_LEN {
                return Err(CardError::Generic(format!(
                    "short signature: {} bytes",
                    response.data.len()
                )));
            }
            let mut signature = [0u8; RSA_SIGNATURE_LEN];
            signature.copy_from_slice(&response.data[..RSA_SIGNATURE_LEN]);
            log::info!("sign: slot {slot} key {key_id} ok");
            Ok(signature)
        })
    }
}

fn map_transport(error: TransportError) -> CardError {
    match error {
        TransportError::Reset | TransportError::NoCard => CardError::NoCard,
        TransportError::Context(m) => CardError::ContextError(m),
        TransportError::Failed(m) => CardError::Generic(m),
    }
}
