//! Cryptographic domain helpers.
//!
//! Hashing is delegated to the RustCrypto implementations; this module
//! adds the fixed-size PKCS#1 v1.5 padding used by the on-card RSA key
//! and the issuer/serial extraction needed for `SignerInfo`.

mod cert;
mod hash;
mod padding;

pub use cert::{issuer_and_serial, IssuerAndSerial};
#[cfg(test)]
pub(crate) use cert::test_support;
pub use hash::{digest, md5, sha1, HashMechanism};
pub use padding::{pkcs1_v15_pad, sha1_digest_info, SHA1_DIGEST_INFO_LEN};
