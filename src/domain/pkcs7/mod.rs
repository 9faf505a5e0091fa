//! PKCS#7 `SignedData` assembly.
//!
//! Builds the complete `ContentInfo` envelope around an attached
//! payload: SHA-1 digests, authenticated attributes, the card-computed
//! PKCS#1 v1.5 signature and the signer's certificate. The signature
//! itself is obtained through [`CardSigner`], so the builder is
//! testable against a stub and the session layer stays out of the
//! encoding path.

pub mod attributes;

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::domain::asn1::DerNode;
use crate::domain::constants::{
    OID_PKCS7_DATA, OID_PKCS7_SIGNED_DATA, OID_RSA_ENCRYPTION, OID_SHA1, RSA_SIGNATURE_LEN,
};
use crate::domain::crypto::{issuer_and_serial, pkcs1_v15_pad, sha1, sha1_digest_info};
use crate::infra::error::{CardError, CardResult};

/// Source of raw RSA signatures over a padded 128-byte block.
///
/// Implemented by the card session (MSE RESTORE / MSE SET / PSO SIGN)
/// and by test stubs.
pub trait CardSigner {
    /// Sign an EMSA-PKCS1-v1_5 padded block with the selected key.
    fn sign_padded(&self, padded: &[u8; RSA_SIGNATURE_LEN])
        -> CardResult<[u8; RSA_SIGNATURE_LEN]>;
}

/// Builder for an attached-payload `SignedData` envelope.
pub struct Pkcs7Builder<'a> {
    payload: &'a [u8],
    certificate_der: &'a [u8],
    signing_time: Option<DateTime<Utc>>,
}

impl<'a> Pkcs7Builder<'a> {
    #[must_use]
    pub fn new(payload: &'a [u8], certificate_der: &'a [u8]) -> Self {
        Self {
            payload,
            certificate_der,
            signing_time: None,
        }
    }

    /// Pin the signingTime attribute instead of sampling the clock.
    #[must_use]
    pub fn with_signing_time(mut self, time: DateTime<Utc>) -> Self {
        self.signing_time = Some(time);
        self
    }

    /// Assemble and emit the `ContentInfo` DER blob.
    ///
    /// # Errors
    ///
    /// Card failures propagate verbatim from `signer`; a certificate
    /// that cannot be parsed or an out-of-range signing time is an
    /// ASN.1 error.
    pub fn build(&self, signer: &dyn CardSigner) -> CardResult<Vec<u8>> {
        log::debug!("building SignedData over {} payload bytes", self.payload.len());

        let payload_digest = sha1(self.payload);

        let now = self.signing_time.unwrap_or_else(Utc::now);
        let signing_time = DerNode::utc_time(
            u16::try_from(now.year())
                .map_err(|_| CardError::Asn1(format!("signing year {} out of range", now.year())))?,
            now.month() as u8,
            now.day() as u8,
            now.hour() as u8,
            now.minute() as u8,
            now.second() as u8,
        )?;

        let signed_attrs = attributes::signed_attributes(&payload_digest, signing_time)?;

        // The signature covers the attribute SET under its own SET
        // header, not under the [0] IMPLICIT re-tag it gets inside
        // SignerInfo.
        let attrs_der = signed_attrs.encode();
        let attrs_digest = sha1(&attrs_der);
        let padded = pkcs1_v15_pad(&sha1_digest_info(&attrs_digest))?;

        log::debug!("requesting card signature over signed attributes");
        let signature = signer.sign_padded(&padded)?;

        let ias = issuer_and_serial(self.certificate_der)?;

        let digest_algorithm =
            DerNode::sequence(vec![DerNode::oid(OID_SHA1)?, DerNode::Null]);

        let signer_info = DerNode::sequence(vec![
            DerNode::integer(1),
            DerNode::sequence(vec![
                DerNode::raw(&ias.issuer),
                DerNode::integer_bytes(&ias.serial),
            ]),
            digest_algorithm.clone(),
            DerNode::implicit(0, signed_attrs),
            DerNode::sequence(vec![DerNode::oid(OID_RSA_ENCRYPTION)?, DerNode::Null]),
            DerNode::octet_string(&signature),
        ]);

        let signed_data = DerNode::sequence(vec![
            DerNode::integer(1),
            DerNode::set(vec![digest_algorithm]),
            DerNode::sequence(vec![
                DerNode::oid(OID_PKCS7_DATA)?,
                DerNode::explicit(0, DerNode::octet_string(self.payload)),
            ]),
            DerNode::implicit(0, DerNode::set(vec![DerNode::raw(self.certificate_der)])),
            DerNode::set(vec![signer_info]),
        ]);

        let content_info = DerNode::sequence(vec![
            DerNode::oid(OID_PKCS7_SIGNED_DATA)?,
            DerNode::explicit(0, signed_data),
        ]);

        let der = content_info.encode();
        log::info!("emitted SignedData envelope of {} bytes", der.len());
        Ok(der)
    }
}
