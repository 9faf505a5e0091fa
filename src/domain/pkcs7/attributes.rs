//! Signed-attribute set construction.
//!
//! The four authenticated attributes are assembled in the canonical
//! order the receiver expects: contentType, signingTime,
//! messageDigest, sMIMECapabilities.

use crate::domain::asn1::DerNode;
use crate::domain::constants::{
    OID_CONTENT_TYPE, OID_DES_CBC, OID_DES_EDE3_CBC, OID_MESSAGE_DIGEST, OID_PKCS7_DATA,
    OID_SHA1_WITH_RSA, OID_SIGNING_TIME, OID_SMIME_CAPABILITIES,
};
use crate::infra::error::CardResult;

/// `Attribute ::= SEQUENCE { attrType OID, attrValues SET }`
fn attribute(oid: &str, values: Vec<DerNode>) -> CardResult<DerNode> {
    Ok(DerNode::sequence(vec![
        DerNode::oid(oid)?,
        DerNode::set(values),
    ]))
}

/// Build the authenticated attribute SET for one signer.
///
/// `message_digest` is the SHA-1 of the payload; `signing_time` is the
/// already-validated UTCTime node for the current instant.
pub fn signed_attributes(
    message_digest: &[u8; 20],
    signing_time: DerNode,
) -> CardResult<DerNode> {
    let content_type = attribute(OID_CONTENT_TYPE, vec![DerNode::oid(OID_PKCS7_DATA)?])?;
    let signing_time = attribute(OID_SIGNING_TIME, vec![signing_time])?;
    let message_digest = attribute(
        OID_MESSAGE_DIGEST,
        vec![DerNode::octet_string(message_digest)],
    )?;

    // Capabilities advertised to the mail recipient: 3DES, DES and
    // sha1WithRSA, each as a one-element AlgorithmIdentifier SEQUENCE.
    let capabilities = DerNode::sequence(vec![
        DerNode::sequence(vec![DerNode::oid(OID_DES_EDE3_CBC)?]),
        DerNode::sequence(vec![DerNode::oid(OID_DES_CBC)?]),
        DerNode::sequence(vec![DerNode::oid(OID_SHA1_WITH_RSA)?]),
    ]);
    let smime_capabilities = attribute(OID_SMIME_CAPABILITIES, vec![capabilities])?;

    Ok(DerNode::set(vec![
        content_type,
        signing_time,
        message_digest,
        smime_capabilities,
    ]))
}
