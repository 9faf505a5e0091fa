//! Type-safe wrappers using the new-type pattern
//!
//! This module provides validated wrappers for slot indices, PIN
//! material and key identifiers so that the session layer cannot be
//! handed out-of-range values.

use std::fmt;
use std::str::FromStr;

use crate::domain::constants::MAX_READERS;
use crate::infra::error::{CardError, CardResult};

/// Zero-based reader slot index, bounded by [`MAX_READERS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotIndex(usize);

impl SlotIndex {
    /// Create a new `SlotIndex` after range validation
    pub fn new(slot: usize) -> CardResult<Self> {
        if slot >= MAX_READERS {
            return Err(CardError::InvalidInput(format!(
                "slot {slot} out of range (maximum {})",
                MAX_READERS - 1
            )));
        }
        Ok(SlotIndex(slot))
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Card holder PIN (or PUK) as presented to VERIFY / CHANGE / UNBLOCK.
///
/// The card accepts up to 8 bytes; shorter values are zero-padded by
/// the session layer when the card demands a fixed-length block.
#[derive(Clone)]
pub struct CardPin(String);

impl CardPin {
    /// Create a new `CardPin` after validation
    pub fn new(pin: impl AsRef<str>) -> CardResult<Self> {
        let pin = pin.as_ref();
        if pin.is_empty() {
            return Err(CardError::InvalidInput("PIN must not be empty".to_string()));
        }
        if pin.len() > 8 {
            return Err(CardError::InvalidInput(format!(
                "PIN too long: {} characters (maximum 8)",
                pin.len()
            )));
        }
        if !pin.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CardError::InvalidInput(
                "PIN must contain only alphanumeric characters".to_string(),
            ));
        }
        Ok(CardPin(pin.to_string()))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The PIN zero-padded (or truncated) to the card's 8-byte block.
    #[must_use]
    pub fn as_block(&self) -> [u8; 8] {
        let mut block = [0u8; 8];
        let src = self.0.as_bytes();
        let n = src.len().min(8);
        block[..n].copy_from_slice(&src[..n]);
        block
    }
}

impl FromStr for CardPin {
    type Err = CardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// Debug/Display never reveal the PIN value.
impl fmt::Debug for CardPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CardPin([REDACTED])")
    }
}

impl fmt::Display for CardPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[PIN REDACTED]")
    }
}

/// PIN reference as used by the card (the user PIN is id 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinId(u8);

impl PinId {
    pub const USER: PinId = PinId(1);

    /// Create a new `PinId`; only the user PIN is accepted today.
    pub fn new(id: u8) -> CardResult<Self> {
        if id != 1 {
            return Err(CardError::InvalidInput(format!("unsupported PIN id {id}")));
        }
        Ok(PinId(id))
    }

    #[must_use]
    pub fn as_u8(self) -> u8 {
        self.0
    }
}

/// On-card key identifier as used by MSE SET (`83 01 kid`).
///
/// Key ids discovered from the key-info EF are `0x80 + record`; zero
/// is the "no signing key found" sentinel and is rejected here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyId(u8);

impl KeyId {
    pub fn new(id: u8) -> CardResult<Self> {
        if id == 0 {
            return Err(CardError::InvalidInput(
                "key id 0 means no signing key".to_string(),
            ));
        }
        Ok(KeyId(id))
    }

    #[must_use]
    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// Certificate EF for this key: `(0x1A + k - 1) << 8 | 0x02`
    /// where `k` is the key id with the 0x80 discovery bias removed.
    #[must_use]
    pub fn certificate_fid(self) -> u16 {
        let k = u16::from(self.0 & 0x7F);
        ((0x1A + k - 1) << 8) | 0x02
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_index_bounds() {
        assert!(SlotIndex::new(0).is_ok());
        assert!(SlotIndex::new(MAX_READERS - 1).is_ok());
        assert!(SlotIndex::new(MAX_READERS).is_err());
    }

    #[test]
    fn test_pin_validation() {
        assert!(CardPin::new("12345").is_ok());
        assert!(CardPin::new("12345678").is_ok());
        assert!(CardPin::new("").is_err());
        assert!(CardPin::new("123456789").is_err());
        assert!(CardPin::new("12 34").is_err());
    }

    #[test]
    fn test_pin_block_padding() {
        let pin = CardPin::new("1234").unwrap();
        assert_eq!(pin.as_block(), [b'1', b'2', b'3', b'4', 0, 0, 0, 0]);
    }

    #[test]
    fn test_pin_never_displayed() {
        let pin = CardPin::new("8421").unwrap();
        assert!(!format!("{pin}").contains("8421"));
        assert!(!format!("{pin:?}").contains("8421"));
    }

    #[test]
    fn test_key_id_certificate_fid() {
        // First key (record 1) discovered as 0x81 -> certificate at 1A02.
        assert_eq!(KeyId::new(0x81).unwrap().certificate_fid(), 0x1A02);
        // Third key -> 1C02.
        assert_eq!(KeyId::new(0x83).unwrap().certificate_fid(), 0x1C02);
        assert!(KeyId::new(0).is_err());
    }
}
