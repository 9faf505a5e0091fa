//! Fiscal-seal operations.
//!
//! The card keeps a monotonic emission counter and computes an
//! 8-byte MAC ("sigillo") over a challenge built from the card
//! serial, a timestamp and the ticket price. Counter reads on either
//! side of a seal computation are only consistent when the caller
//! wraps them in one enclosing transaction, which these methods do.

use crate::domain::constants::{
    APDU_COMPUTE_SEAL, APDU_READ_COUNTER, FID_APP_DOMAIN, FID_EF_BALANCE, FID_EF_COUNTER, FID_MF,
    FID_SEAL_DOMAIN,
};
use crate::domain::types::SlotIndex;
use crate::infra::error::{CardError, CardResult, StatusWord};
use crate::services::session::CardManager;

/// Result of a seal computation: the post-increment counter and the
/// card-computed MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seal {
    pub counter: u32,
    pub mac: [u8; 8],
}

/// The 22-byte challenge: `00 01 | SN(8) | DATETIME(8) | price(4 BE)`.
fn seal_challenge(date_time: &[u8; 8], price: u32, serial: &[u8; 8]) -> [u8; 22] {
    let mut challenge = [0u8; 22];
    challenge[0] = 0x00;
    challenge[1] = 0x01;
    challenge[2..10].copy_from_slice(serial);
    challenge[10..18].copy_from_slice(date_time);
    challenge[18..22].copy_from_slice(&price.to_be_bytes());
    challenge
}

impl CardManager {
    /// Walk to the counter domain and select `counter_fid`.
    fn select_counter_file(&self, slot: SlotIndex, counter_fid: u16) -> CardResult<()> {
        for fid in [FID_MF, FID_APP_DOMAIN, FID_SEAL_DOMAIN, counter_fid] {
            self.select(slot, fid)
                .map_err(|_| CardError::Status(StatusWord::FILE_NOT_FOUND))?;
        }
        Ok(())
    }

    fn read_counter_file(&self, slot: SlotIndex, counter_fid: u16) -> CardResult<u32> {
        self.with_transaction(slot, |this| {
            this.select_counter_file(slot, counter_fid)?;
            let response = this.send_apdu(slot, APDU_READ_COUNTER, &[], Some(4))?;
            if !response.sw.is_ok() {
                return Err(CardError::Status(response.sw));
            }
            let bytes: [u8; 4] = response.data.get(..4).and_then(|b| b.try_into().ok()).ok_or(
                CardError::Status(StatusWord::WRONG_LENGTH),
            )?;
            Ok(u32::from_be_bytes(bytes))
        })
    }

    /// Current value of the emission counter.
    pub fn read_counter(&self, slot: SlotIndex) -> CardResult<u32> {
        let value = self.read_counter_file(slot, FID_EF_COUNTER)?;
        log::debug!("read_counter: slot {slot} -> {value}");
        Ok(value)
    }

    /// Current value of the balance counter.
    pub fn read_balance(&self, slot: SlotIndex) -> CardResult<u32> {
        let value = self.read_counter_file(slot, FID_EF_BALANCE)?;
        log::debug!("read_balance: slot {slot} -> {value}");
        Ok(value)
    }

    /// Compute the fiscal seal over `date_time` (8 bytes, caller
    /// formatted), `price` and the card serial `serial`.
    ///
    /// The card answers with 12 bytes: the big-endian counter followed
    /// by the 8-byte MAC.
    pub fn compute_seal(
        &self,
        slot: SlotIndex,
        date_time: &[u8; 8],
        price: u32,
        serial: &[u8; 8],
    ) -> CardResult<Seal> {
        self.with_transaction(slot, |this| {
            this.select_counter_file(slot, FID_EF_COUNTER)?;
            this.compute_seal_fast(slot, date_time, price, serial)
        })
    }

    /// Compute the seal after fetching the card serial from EF GDO.
    pub fn compute_seal_ex(
        &self,
        slot: SlotIndex,
        date_time: &[u8; 8],
        price: u32,
    ) -> CardResult<Seal> {
        self.with_transaction(slot, |this| {
            let serial = this.get_sn(slot)?;
            this.compute_seal(slot, date_time, price, &serial)
        })
    }

    /// Compute the seal without the file-selection walk. Valid only
    /// when a prior call on this slot already positioned the counter
    /// EF as the current file.
    pub fn compute_seal_fast(
        &self,
        slot: SlotIndex,
        date_time: &[u8; 8],
        price: u32,
        serial: &[u8; 8],
    ) -> CardResult<Seal> {
        self.with_transaction(slot, |this| {
            let challenge = seal_challenge(date_time, price, serial);
            let response = this.send_apdu(slot, APDU_COMPUTE_SEAL, &challenge, Some(12))?;
            if !response.sw.is_ok() {
                return Err(CardError::Status(response.sw));
            }
            if response.data.len() < 12 {
                return Err(CardError::Status(StatusWord::WRONG_LENGTH));
            }
            let counter = u32::from_be_bytes(
                response.data[..4].try_into().expect("4-byte slice"),
            );
            let mut mac = [0u8; 8];
            mac.copy_from_slice(&response.data[4..12]);
            log::info!("compute_seal: slot {slot} counter {counter}");
            Ok(Seal { counter, mac })
        })
    }
}
