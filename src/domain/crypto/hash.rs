//! Hash adapter over the RustCrypto digest implementations.

use md5::{Digest, Md5};
use sha1::Sha1;

/// Hash mechanisms exposed by the generic entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMechanism {
    Sha1,
    Md5,
}

impl HashMechanism {
    #[must_use]
    pub fn digest_size(self) -> usize {
        match self {
            HashMechanism::Sha1 => 20,
            HashMechanism::Md5 => 16,
        }
    }
}

/// Hash `data` with the requested mechanism.
#[must_use]
pub fn digest(mechanism: HashMechanism, data: &[u8]) -> Vec<u8> {
    match mechanism {
        HashMechanism::Sha1 => sha1(data).to_vec(),
        HashMechanism::Md5 => md5(data).to_vec(),
    }
}

/// SHA-1 over a byte slice.
#[must_use]
pub fn sha1(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// MD5 over a byte slice.
#[must_use]
pub fn md5(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}
