//! PKCS#1 v1.5 signature-block padding for the on-card RSA key.

use crate::domain::constants::RSA_SIGNATURE_LEN;
use crate::infra::error::{CardError, CardResult};

/// DigestInfo prefix for SHA-1:
/// `SEQUENCE { SEQUENCE { sha1-OID, NULL }, OCTET STRING (20) }`.
const SHA1_DIGEST_INFO_PREFIX: [u8; 15] = [
    0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2B, 0x0E, 0x03, 0x02, 0x1A, 0x05, 0x00, 0x04, 0x14,
];

/// Length of a complete SHA-1 DigestInfo block.
pub const SHA1_DIGEST_INFO_LEN: usize = 35;

/// Wrap a SHA-1 digest in its DigestInfo structure.
#[must_use]
pub fn sha1_digest_info(digest: &[u8; 20]) -> [u8; SHA1_DIGEST_INFO_LEN] {
    let mut info = [0u8; SHA1_DIGEST_INFO_LEN];
    info[..15].copy_from_slice(&SHA1_DIGEST_INFO_PREFIX);
    info[15..].copy_from_slice(digest);
    info
}

/// EMSA-PKCS1-v1_5 padding to the card's 128-byte signature input:
/// `00 01 FF..FF 00 || data`.
///
/// # Errors
///
/// Fails when `data` leaves no room for the minimum padding.
pub fn pkcs1_v15_pad(data: &[u8]) -> CardResult<[u8; RSA_SIGNATURE_LEN]> {
    // 3 framing bytes plus at least 8 FF octets.
    if data.len() + 11 > RSA_SIGNATURE_LEN {
        return Err(CardError::InvalidInput(format!(
            "{} bytes do not fit a {RSA_SIGNATURE_LEN}-byte signature block",
            data.len()
        )));
    }
    let mut block = [0xFFu8; RSA_SIGNATURE_LEN];
    block[0] = 0x00;
    block[1] = 0x01;
    let data_start = RSA_SIGNATURE_LEN - data.len();
    block[data_start - 1] = 0x00;
    block[data_start..].copy_from_slice(data);
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::crypto::sha1;

    #[test]
    fn test_digest_info_layout() {
        let info = sha1_digest_info(&sha1(b"Hello"));
        assert_eq!(info.len(), 35);
        assert_eq!(&info[..15], &SHA1_DIGEST_INFO_PREFIX);
        assert_eq!(&info[15..], &sha1(b"Hello"));
    }

    #[test]
    fn test_padding_layout() {
        let info = sha1_digest_info(&sha1(b"x"));
        let padded = pkcs1_v15_pad(&info).unwrap();
        assert_eq!(padded.len(), 128);
        assert_eq!(padded[0], 0x00);
        assert_eq!(padded[1], 0x01);
        // 128 - 35 - 3 = 90 filler octets.
        assert!(padded[2..92].iter().all(|&b| b == 0xFF));
        assert_eq!(padded[92], 0x00);
        assert_eq!(&padded[93..], &info);
    }

    #[test]
    fn test_padding_rejects_oversized_input() {
        assert!(pkcs1_v15_pad(&[0u8; 118]).is_err());
        assert!(pkcs1_v15_pad(&[0u8; 117]).is_ok());
    }
}
