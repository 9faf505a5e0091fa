//! Centralized constants for the card file system, the APDU catalogue
//! and the OIDs emitted into PKCS#7 structures.
//! Keep this intentionally small; only broadly reused literals should live here.

// === Session layer ===

/// Largest number of reader slots tracked by a session manager.
pub const MAX_READERS: usize = 16;

/// READ BINARY chunk size. PC/SC allows up to 249 bytes per exchange
/// but not every reader honours that, so stay at 128.
pub const EXCHANGE_BUFFER: usize = 128;

/// RSA modulus size of the on-card signing key, in bytes.
pub const RSA_SIGNATURE_LEN: usize = 128;

// === File identifiers ===

/// Master file.
pub const FID_MF: u16 = 0x3F00;

/// SIAE application domain DF directly under the MF.
pub const FID_APP_DOMAIN: u16 = 0x0000;

/// PKI application DF (keys and certificates).
pub const FID_PKI_APP: u16 = 0x1111;

/// Fiscal counter DF.
pub const FID_SEAL_DOMAIN: u16 = 0x1112;

/// Emission counter EF.
pub const FID_EF_COUNTER: u16 = 0x1000;

/// Balance counter EF.
pub const FID_EF_BALANCE: u16 = 0x1001;

/// Global data object EF; holds the 8-byte card serial at offset 18.
pub const FID_EF_GDO: u16 = 0x2F02;

/// Key-info EF; one record per key, first byte flags the signing key.
pub const FID_EF_KEY_INFO: u16 = 0x5F02;

/// CA certificate EF under the PKI application.
pub const FID_EF_CA_CERT: u16 = 0x4101;

/// SIAE certificate EF under the PKI application.
pub const FID_EF_SIAE_CERT: u16 = 0x4102;

// === APDU headers (CLA INS P1 P2 packed big-endian) ===

pub const APDU_SELECT: u32 = 0x00A4_0000;
pub const APDU_READ_BINARY: u32 = 0x00B0_0000;
pub const APDU_READ_RECORD: u32 = 0x00B2_0000;
pub const APDU_VERIFY_PIN: u32 = 0x0020_0000;
pub const APDU_CHANGE_REFERENCE_DATA: u32 = 0x0024_0000;
pub const APDU_RESET_RETRY_COUNTER: u32 = 0x002C_0000;
pub const APDU_READ_COUNTER: u32 = 0x0032_0001;
pub const APDU_COMPUTE_SEAL: u32 = 0x0032_8312;
pub const APDU_MSE_RESTORE: u32 = 0x0022_F301;
pub const APDU_MSE_SET: u32 = 0x0022_F1B8;
pub const APDU_PSO_SIGN: u32 = 0x002A_8086;

/// P2 selecting the user PIN reference on VERIFY / CHANGE / UNBLOCK.
pub const PIN_REFERENCE_USER: u32 = 0x0081;

/// P2 selecting the PUK reference when querying remaining tries.
pub const PIN_REFERENCE_PUK: u32 = 0x0082;

// === Object identifiers (dotted form, encoded by the DER layer) ===

pub const OID_PKCS7_DATA: &str = "1.2.840.113549.1.7.1";
pub const OID_PKCS7_SIGNED_DATA: &str = "1.2.840.113549.1.7.2";
pub const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
pub const OID_SHA1_WITH_RSA: &str = "1.2.840.113549.1.1.5";
pub const OID_SHA1: &str = "1.3.14.3.2.26";
pub const OID_CONTENT_TYPE: &str = "1.2.840.113549.1.9.3";
pub const OID_MESSAGE_DIGEST: &str = "1.2.840.113549.1.9.4";
pub const OID_SIGNING_TIME: &str = "1.2.840.113549.1.9.5";
pub const OID_SMIME_CAPABILITIES: &str = "1.2.840.113549.1.9.15";
pub const OID_DES_EDE3_CBC: &str = "1.2.840.113549.3.7";
pub const OID_DES_CBC: &str = "1.3.14.3.2.7";
