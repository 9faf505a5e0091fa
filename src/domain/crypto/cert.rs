//! Issuer and serial number extraction from an X.509 certificate.
//!
//! The card stores the signer's certificate as a DER blob; `SignerInfo`
//! needs the issuer name (verbatim, header included) and the serial
//! number content octets out of the `TBSCertificate`. Both the legacy
//! v1 layout and the `[0] EXPLICIT version` layout are handled.

use crate::domain::asn1::parse::{parse_level, tag};
use crate::infra::error::{CardError, CardResult};

/// Issuer name (full TLV) and serial number (content octets) of a
/// certificate, as spliced into `IssuerAndSerialNumber`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerAndSerial {
    pub issuer: Vec<u8>,
    pub serial: Vec<u8>,
}

/// Locate issuer and serial inside a DER certificate.
///
/// # Errors
///
/// Returns an ASN.1 error when the blob does not have the expected
/// `Certificate ::= SEQUENCE { tbs, sigAlg, signature }` shape.
pub fn issuer_and_serial(cert_der: &[u8]) -> CardResult<IssuerAndSerial> {
    let outer = parse_level(cert_der)?;
    if outer.is_empty() || outer[0].tag != tag::SEQUENCE {
        return Err(CardError::Asn1(
            "certificate is not a SEQUENCE".to_string(),
        ));
    }

    let cert_body = outer[0].value(cert_der);
    let parts = parse_level(cert_body)?;
    if parts.len() < 3
        || parts[0].tag != tag::SEQUENCE
        || parts[1].tag != tag::SEQUENCE
        || parts[2].tag != tag::BIT_STRING
    {
        return Err(CardError::Asn1(
            "certificate body lacks tbs/algorithm/signature".to_string(),
        ));
    }

    let tbs = parts[0].value(cert_body);
    let fields = parse_level(tbs)?;

    // With [0] EXPLICIT version: version, serial, sigAlg, issuer,
    // validity, subject, spki. Without: serial leads.
    if fields.len() > 6
        && fields[0].tag == tag::CONTEXT_0
        && fields[1].tag == tag::INTEGER
        && fields[2].tag == tag::SEQUENCE
        && fields[3].tag == tag::SEQUENCE
        && fields[4].tag == tag::SEQUENCE
        && fields[5].tag == tag::SEQUENCE
        && fields[6].tag == tag::SEQUENCE
    {
        Ok(IssuerAndSerial {
            issuer: fields[3].full(tbs).to_vec(),
            serial: fields[1].value(tbs).to_vec(),
        })
    } else if fields.len() > 5
        && fields[0].tag == tag::INTEGER
        && fields[1].tag == tag::SEQUENCE
        && fields[2].tag == tag::SEQUENCE
        && fields[3].tag == tag::SEQUENCE
        && fields[4].tag == tag::SEQUENCE
        && fields[5].tag == tag::SEQUENCE
    {
        Ok(IssuerAndSerial {
            issuer: fields[2].full(tbs).to_vec(),
            serial: fields[0].value(tbs).to_vec(),
        })
    } else {
        Err(CardError::Asn1(
            "unrecognised TBSCertificate layout".to_string(),
        ))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::synthetic_certificate;
    use super::*;
    use crate::domain::asn1::DerNode;

    #[test]
    fn test_extracts_from_v3_layout() {
        let cert = synthetic_certificate(0x1234);
        let ias = issuer_and_serial(&cert).unwrap();
        assert_eq!(ias.serial, vec![0x12, 0x34]);
        // Issuer is a complete SEQUENCE TLV.
        assert_eq!(ias.issuer[0], tag::SEQUENCE);
        let items = parse_level(&ias.issuer).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_extracts_from_v1_layout() {
        // Same shape minus the [0] version wrapper.
        let name = DerNode::sequence(vec![DerNode::set(vec![])]);
        let algorithm = DerNode::sequence(vec![
            DerNode::oid("1.2.840.113549.1.1.5").unwrap(),
            DerNode::Null,
        ]);
        let tbs = DerNode::sequence(vec![
            DerNode::integer(7),
            algorithm.clone(),
            name.clone(),
            DerNode::sequence(vec![]),
            name,
            DerNode::sequence(vec![]),
        ]);
        let cert = DerNode::sequence(vec![
            tbs,
            algorithm,
            DerNode::raw(&[0x03, 0x02, 0x00, 0xFF]),
        ])
        .encode();

        let ias = issuer_and_serial(&cert).unwrap();
        assert_eq!(ias.serial, vec![0x07]);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(issuer_and_serial(&[0x04, 0x02, 0x01, 0x02]).is_err());
        assert!(issuer_and_serial(&[0x30, 0x00]).is_err());
        assert!(issuer_and_serial(&[]).is_err());
    }
}
