//! End-to-end flows over the stub card: PKCS#7 signing, S/MIME
//! production and the fiscal-seal operations.

mod common;

use common::{stub_certificate, StubDriver, STUB_PIN, STUB_SERIAL, STUB_SIGNATURE};
use sigillo_signer::domain::asn1::parse::{parse_level, tag, DerItem};
use sigillo_signer::domain::mime::base64::Base64Codec;
use sigillo_signer::{
    sha1, sign_pkcs7_file, sign_smime_file, CardError, CardManager, CardPin, Pkcs7SignService,
    PinId, SlotIndex, SmimeRequest,
};

fn connected_manager() -> (CardManager, StubDriver) {
    let driver = StubDriver::new();
    let manager = CardManager::new(Box::new(driver.clone()));
    manager.initialize(SlotIndex::new(0).unwrap()).unwrap();
    (manager, driver)
}

fn slot0() -> SlotIndex {
    SlotIndex::new(0).unwrap()
}

fn pin() -> CardPin {
    CardPin::new(STUB_PIN).unwrap()
}

/// Parse one level and expect exactly `n` items.
fn expect_items(der: &[u8], n: usize) -> Vec<DerItem> {
    let items = parse_level(der).unwrap();
    assert_eq!(items.len(), n, "expected {n} TLVs");
    items
}

#[test]
fn pkcs7_envelope_over_stub_card() {
    let (manager, _driver) = connected_manager();
    let p7m = Pkcs7SignService::new(&manager)
        .sign_bytes(slot0(), &pin(), b"Hello")
        .unwrap();

    // ContentInfo ::= SEQUENCE { contentType, [0] EXPLICIT content }
    let outer = expect_items(&p7m, 1);
    assert_eq!(outer[0].tag, tag::SEQUENCE);
    let ci = outer[0].value(&p7m);
    let ci_fields = expect_items(ci, 2);
    assert_eq!(
        ci_fields[0].full(ci),
        [0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02],
        "contentType must be id-signedData"
    );

    let content = ci_fields[1].value(ci);
    let sd = expect_items(content, 1);
    let sd_body = sd[0].value(content);
    let sd_fields = expect_items(sd_body, 5);

    // version 1
    assert_eq!(sd_fields[0].full(sd_body), [0x02, 0x01, 0x01]);

    // The signed certificate travels verbatim.
    assert_eq!(sd_fields[3].tag, tag::CONTEXT_0);
    assert_eq!(sd_fields[3].value(sd_body), stub_certificate().as_slice());

    // The payload is attached inside encapContentInfo.
    let eci = sd_fields[2].value(sd_body);
    let eci_fields = expect_items(eci, 2);
    let econtent = eci_fields[1].value(eci);
    let octets = expect_items(econtent, 1);
    assert_eq!(octets[0].value(econtent), b"Hello");

    // Exactly one SignerInfo.
    let signer_infos = expect_items(sd_fields[4].value(sd_body), 1);
    let si = signer_infos[0].value(sd_fields[4].value(sd_body));
    let si_fields = expect_items(si, 6);
    assert_eq!(si_fields[0].full(si), [0x02, 0x01, 0x01]);
    assert_eq!(si_fields[3].tag, tag::CONTEXT_0);

    // messageDigest attribute == SHA1("Hello").
    let attrs_bytes = si_fields[3].value(si);
    let attrs = parse_level(attrs_bytes).unwrap();
    assert_eq!(attrs.len(), 4);
    let expected_digest = sha1(b"Hello");
    assert_eq!(
        hex::encode_upper(expected_digest),
        "F7FF9E8B7BB2E09B70935A5D785E0CC5D9D0ABF0"
    );
    let digest_attr = attrs
        .iter()
        .find(|attr| {
            let fields = parse_level(attr.value(attrs_bytes)).unwrap();
            fields[0].value(attr.value(attrs_bytes)).ends_with(&[0x09, 0x04])
        })
        .expect("messageDigest attribute present");
    let attr_body = digest_attr.value(attrs_bytes);
    let attr_fields = expect_items(attr_body, 2);
    let value_set = attr_fields[1].value(attr_body);
    let digest_octets = expect_items(value_set, 1);
    assert_eq!(digest_octets[0].value(value_set), expected_digest);

    // The raw card signature fills the final OCTET STRING.
    assert_eq!(si_fields[5].value(si), STUB_SIGNATURE);
}

#[test]
fn pkcs7_file_entry_point() {
    let (manager, _driver) = connected_manager();
    let dir = tempfile::TempDir::new().unwrap();
    let input = dir.path().join("receipt.txt");
    let output = dir.path().join("receipt.txt.p7m");
    std::fs::write(&input, b"ticket data").unwrap();

    sign_pkcs7_file(&manager, slot0(), &pin(), &input, &output).unwrap();

    let p7m = std::fs::read(&output).unwrap();
    assert!(p7m.windows(11).any(|w| w == b"ticket data"));
    expect_items(&p7m, 1);
}

#[test]
fn pkcs7_wrong_pin_reports_tries_and_no_output() {
    let (manager, _driver) = connected_manager();
    let dir = tempfile::TempDir::new().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.p7m");
    std::fs::write(&input, b"x").unwrap();

    let bad_pin = CardPin::new("99999").unwrap();
    let err = sign_pkcs7_file(&manager, slot0(), &bad_pin, &input, &output).unwrap_err();
    match err {
        CardError::Status(sw) => assert_eq!(sw.retries_left(), Some(2)),
        other => panic!("expected status word, got {other:?}"),
    }
    assert!(!output.exists());
}

#[test]
fn smime_message_over_stub_card() {
    let (manager, _driver) = connected_manager();
    let dir = tempfile::TempDir::new().unwrap();
    let attachment = dir.path().join("receipt.bin");
    std::fs::write(&attachment, b"binary receipt contents").unwrap();
    let output = dir.path().join("signed.eml");

    let request = SmimeRequest {
        from: "pos@example.com".to_string(),
        to: "archive@example.com".to_string(),
        subject: "Daily receipts".to_string(),
        extra_headers: None,
        body: "Hello Fiscal".to_string(),
        attachments: Some(format!("receipt.bin|{}", attachment.display())),
    };
    sign_smime_file(&manager, slot0(), &pin(), &request, &output).unwrap();

    let message = std::fs::read_to_string(&output).unwrap();
    let (headers, body) = message
        .split_once("\r\n\r\n")
        .expect("blank line terminates headers");

    assert!(headers.starts_with("From:pos@example.com\r\n"));
    assert!(headers.contains("To:archive@example.com\r\n"));
    assert!(headers.contains("Subject:Daily receipts\r\n"));
    assert!(headers.contains("Content-Type: application/x-pkcs7-mime;"));
    assert!(headers.contains("\tsmime-type=signed-data;"));
    assert!(headers.contains("\tname=\"smime.p7m\""));
    assert!(headers.contains("Content-Transfer-Encoding: base64"));
    assert!(headers.contains("filename=\"smime.p7m\""));

    // The transported body is the base64 of a parseable SignedData
    // whose inner message carries the text body and the attachment.
    let p7m = Base64Codec::default().decode(body.as_bytes()).unwrap();
    expect_items(&p7m, 1);
    let inner_needle = b"Content-Type: multipart/mixed;";
    assert!(p7m
        .windows(inner_needle.len())
        .any(|w| w == inner_needle.as_slice()));
    let encoded_attachment = Base64Codec::new(76).encode(b"binary receipt contents");
    assert!(p7m
        .windows(encoded_attachment.len())
        .any(|w| w == encoded_attachment.as_slice()));
}

#[test]
fn fiscal_seal_counter_flow() {
    let (manager, driver) = connected_manager();
    let slot = slot0();
    let date_time = *b"\x20\x24\x06\x01\x12\x30\x00\x00";

    manager.begin_transaction(slot).unwrap();

    assert_eq!(manager.read_counter(slot).unwrap(), 41);
    assert_eq!(manager.read_balance(slot).unwrap(), 9000);

    let seal = manager.compute_seal_ex(slot, &date_time, 1250).unwrap();
    assert_eq!(seal.counter, 42);

    // MAC over the documented challenge layout.
    let mut challenge = Vec::new();
    challenge.extend_from_slice(&[0x00, 0x01]);
    challenge.extend_from_slice(&STUB_SERIAL);
    challenge.extend_from_slice(&date_time);
    challenge.extend_from_slice(&1250u32.to_be_bytes());
    assert_eq!(seal.mac, sha1(&challenge)[..8]);

    // The counter read after the seal observes the increment.
    assert_eq!(manager.read_counter(slot).unwrap(), 42);

    // The fast path works while the counter EF is still current.
    let fast = manager
        .compute_seal_fast(slot, &date_time, 800, &STUB_SERIAL)
        .unwrap();
    assert_eq!(fast.counter, 43);

    manager.end_transaction(slot).unwrap();
    assert_eq!(driver.card.lock().unwrap().counter, 43);
}

#[test]
fn session_queries_over_stub() {
    let (manager, _driver) = connected_manager();
    let slot = slot0();

    assert!(manager.is_card_in(0).unwrap());
    assert!(!manager.is_card_in(5).unwrap());

    assert_eq!(manager.get_sn(slot).unwrap(), STUB_SERIAL);
    assert_eq!(manager.get_key_id(slot).unwrap().as_u8(), 0x81);
    assert_eq!(manager.get_certificate(slot).unwrap(), stub_certificate());

    manager
        .verify_pin(slot, PinId::USER, &pin())
        .unwrap();
}
