//! In-memory stub card for end-to-end tests.
//!
//! Emulates just enough of the card file system and command set to
//! drive the signing and fiscal-seal flows: SELECT, READ BINARY,
//! READ RECORD, VERIFY, MSE, PSO SIGN, READ COUNTER and COMPUTE SEAL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sigillo_signer::domain::asn1::DerNode;
use sigillo_signer::{sha1, CardConnection, ReaderDriver, TransportError};

/// PIN accepted by the stub card.
pub const STUB_PIN: &str = "12345";

/// Serial number stored in EF GDO.
pub const STUB_SERIAL: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

/// Signature returned by PSO SIGN.
pub const STUB_SIGNATURE: [u8; 128] = [0xC3; 128];

/// A structurally valid certificate with a known issuer and serial.
pub fn stub_certificate() -> Vec<u8> {
    let name = |cn: &str| {
        DerNode::sequence(vec![DerNode::set(vec![DerNode::sequence(vec![
            DerNode::oid("2.5.4.3").unwrap(),
            DerNode::octet_string(cn.as_bytes()),
        ])])])
    };
    let algorithm = DerNode::sequence(vec![
        DerNode::oid("1.2.840.113549.1.1.5").unwrap(),
        DerNode::Null,
    ]);
    let validity = DerNode::sequence(vec![
        DerNode::utc_time(2020, 1, 1, 0, 0, 0).unwrap(),
        DerNode::utc_time(2030, 1, 1, 0, 0, 0).unwrap(),
    ]);
    let spki = DerNode::sequence(vec![
        DerNode::sequence(vec![
            DerNode::oid("1.2.840.113549.1.1.1").unwrap(),
            DerNode::Null,
        ]),
        DerNode::raw(&[0x03, 0x03, 0x00, 0x30, 0x00]),
    ]);
    let tbs = DerNode::sequence(vec![
        DerNode::explicit(0, DerNode::integer(2)),
        DerNode::integer(0x0BAD_CAFE),
        algorithm.clone(),
        name("Stub Fiscal CA"),
        validity,
        name("Stub Cardholder"),
        spki,
    ]);
    DerNode::sequence(vec![
        tbs,
        algorithm,
        DerNode::raw(&[0x03, 0x02, 0x00, 0xFF]),
    ])
    .encode()
}

/// Card state shared by every connection the stub driver hands out.
pub struct StubCard {
    files: HashMap<u16, Vec<u8>>,
    records: HashMap<u16, Vec<Vec<u8>>>,
    selected: u16,
    pub counter: u32,
    pub balance: u32,
    pub pin_verified: bool,
    mse_key: Option<u8>,
}

impl StubCard {
    pub fn new() -> Self {
        let mut files = HashMap::new();

        // EF GDO: serial at offset 18.
        let mut gdo = vec![0u8; 26];
        gdo[18..].copy_from_slice(&STUB_SERIAL);
        files.insert(0x2F02, gdo);

        // Certificate EF for key record 1 (key id 0x81): 2-byte
        // little-endian length prefix, then the DER body.
        let cert = stub_certificate();
        let mut cert_ef = vec![(cert.len() & 0xFF) as u8, (cert.len() >> 8) as u8];
        cert_ef.extend_from_slice(&cert);
        files.insert(0x1A02, cert_ef);

        let mut records = HashMap::new();
        // Key-info EF: record 1 flags the signing key.
        records.insert(0x5F02, vec![vec![1u8]]);

        Self {
            files,
            records,
            selected: 0x3F00,
            counter: 41,
            balance: 9000,
            pin_verified: false,
            mse_key: None,
        }
    }

    fn known_fid(&self, fid: u16) -> bool {
        matches!(fid, 0x3F00 | 0x0000 | 0x1111 | 0x1112 | 0x1000 | 0x1001)
            || self.files.contains_key(&fid)
            || self.records.contains_key(&fid)
    }

    fn handle(&mut self, apdu: &[u8]) -> Vec<u8> {
        let ins = apdu[1];
        let p1 = apdu[2];
        let p2 = apdu[3];

        match (ins, p1, p2) {
            (0xA4, _, _) => {
                let fid = (u16::from(apdu[5]) << 8) | u16::from(apdu[6]);
                if self.known_fid(fid) {
                    self.selected = fid;
                    vec![0x90, 0x00]
                } else {
                    vec![0x6A, 0x82]
                }
            }
            (0xB0, _, _) => {
                let offset = ((p1 as usize) << 8) | p2 as usize;
                let le = *apdu.last().unwrap() as usize;
                let le = if le == 0 { 256 } else { le };
                let Some(content) = self.files.get(&self.selected) else {
                    return vec![0x6A, 0x82];
                };
                if offset >= content.len() {
                    return vec![0x62, 0x82];
                }
                let available = &content[offset..];
                if available.len() < le {
                    let mut out = available.to_vec();
                    out.extend_from_slice(&[0x62, 0x82]);
                    out
                } else {
                    let mut out = available[..le].to_vec();
                    out.extend_from_slice(&[0x90, 0x00]);
                    out
                }
            }
            (0xB2, record, 0x04) => {
                let Some(records) = self.records.get(&self.selected) else {
                    return vec![0x6A, 0x82];
                };
                match records.get(record as usize - 1) {
                    Some(data) => {
                        let mut out = data.clone();
                        out.extend_from_slice(&[0x90, 0x00]);
                        out
                    }
                    None => vec![0x6A, 0x83],
                }
            }
            (0x20, _, 0x81) => {
                // Lc = 0 means "how many tries are left".
                if apdu.len() <= 5 {
                    return vec![0x63, 0xC2];
                }
                let pin = &apdu[5..apdu.len() - 1];
                let mut padded = [0u8; 8];
                padded[..STUB_PIN.len()].copy_from_slice(STUB_PIN.as_bytes());
                if pin == STUB_PIN.as_bytes() || pin == padded {
                    self.pin_verified = true;
                    vec![0x90, 0x00]
                } else {
                    vec![0x63, 0x00]
                }
            }
            (0x22, 0xF3, 0x01) => vec![0x90, 0x00],
            (0x22, 0xF1, 0xB8) => {
                if apdu[5] == 0x83 && apdu[6] == 0x01 {
                    self.mse_key = Some(apdu[7]);
                    vec![0x90, 0x00]
                } else {
                    vec![0x6A, 0x80]
                }
            }
            (0x2A, 0x80, 0x86) => {
                if !self.pin_verified {
                    return vec![0x69, 0x82];
                }
                if self.mse_key.is_none() {
                    return vec![0x69, 0x85];
                }
                // Data is 00 || padded block; check the PKCS#1 frame.
                let data = &apdu[5..apdu.len() - 1];
                if data.len() != 129 || data[1] != 0x00 || data[2] != 0x01 {
                    return vec![0x6A, 0x80];
                }
                let mut out = STUB_SIGNATURE.to_vec();
                out.extend_from_slice(&[0x90, 0x00]);
                out
            }
            (0x32, 0x00, 0x01) => {
                let value = match self.selected {
                    0x1000 => self.counter,
                    0x1001 => self.balance,
                    _ => return vec![0x69, 0x86],
                };
                let mut out = value.to_be_bytes().to_vec();
                out.extend_from_slice(&[0x90, 0x00]);
                out
            }
            (0x32, 0x83, 0x12) => {
                let challenge = &apdu[5..apdu.len() - 1];
                if challenge.len() != 22 || self.selected != 0x1000 {
                    return vec![0x6A, 0x80];
                }
                self.counter += 1;
                let mac = sha1(challenge);
                let mut out = self.counter.to_be_bytes().to_vec();
                out.extend_from_slice(&mac[..8]);
                out.extend_from_slice(&[0x90, 0x00]);
                out
            }
            _ => vec![0x6D, 0x00],
        }
    }
}

impl Default for StubCard {
    fn default() -> Self {
        Self::new()
    }
}

/// Driver over one shared [`StubCard`].
#[derive(Clone)]
pub struct StubDriver {
    pub card: Arc<Mutex<StubCard>>,
}

impl StubDriver {
    pub fn new() -> Self {
        Self {
            card: Arc::new(Mutex::new(StubCard::new())),
        }
    }
}

impl Default for StubDriver {
    fn default() -> Self {
        Self::new()
    }
}

struct StubConnection {
    card: Arc<Mutex<StubCard>>,
}

impl ReaderDriver for StubDriver {
    fn list_readers(&self) -> Result<Vec<String>, TransportError> {
        Ok(vec!["Stub Reader 00".to_string()])
    }

    fn connect(&self, _reader: &str) -> Result<Box<dyn CardConnection>, TransportError> {
        Ok(Box::new(StubConnection {
            card: Arc::clone(&self.card),
        }))
    }

    fn card_present(&self, _reader: &str) -> Result<bool, TransportError> {
        Ok(true)
    }
}

impl CardConnection for StubConnection {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        Ok(self.card.lock().unwrap().handle(apdu))
    }

    fn begin_transaction(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn end_transaction(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn disconnect(&mut self) {}
}
