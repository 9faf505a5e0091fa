//! Composable ASN.1 value tree with DER emission.
//!
//! A [`DerNode`] owns its children outright, so a whole PKCS#7 envelope
//! is a single value with no lifetime plumbing. Every node knows its
//! encoded length up front; [`DerNode::write_into`] appends exactly
//! that many bytes.
//!
//! Tag numbers below 31 encode as a single identifier octet; larger
//! numbers use the high-tag form with base-128 continuation octets.
//! Lengths use the short form below 128 and the minimal long form
//! (up to four length octets) above.

pub mod parse;

use crate::infra::error::{CardError, CardResult};

const CLASS_UNIVERSAL: u8 = 0x00;
const CLASS_CONTEXT: u8 = 0x80;
const CONSTRUCTED: u8 = 0x20;

const TAG_BOOLEAN: u32 = 1;
const TAG_INTEGER: u32 = 2;
const TAG_OCTET_STRING: u32 = 4;
const TAG_NULL: u32 = 5;
const TAG_OBJECT_IDENTIFIER: u32 = 6;
const TAG_SEQUENCE: u32 = 16;
const TAG_SET: u32 = 17;
const TAG_UTC_TIME: u32 = 23;

/// One ASN.1 value, ready for DER emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerNode {
    Boolean(bool),
    /// Content octets, already in minimal two's complement form.
    Integer(Vec<u8>),
    OctetString(Vec<u8>),
    Null,
    /// Content octets of an OBJECT IDENTIFIER.
    Oid(Vec<u8>),
    /// `YYMMDDhhmmssZ`.
    UtcTime([u8; 13]),
    Sequence(Vec<DerNode>),
    Set(Vec<DerNode>),
    /// `[tag] EXPLICIT`: a constructed context-specific wrapper whose
    /// content is the inner node's complete encoding.
    Explicit { tag: u32, inner: Box<DerNode> },
    /// `[tag] IMPLICIT`: the inner node's identifier octet is replaced
    /// by the context-specific tag; constructedness and content are
    /// kept untouched.
    Implicit { tag: u32, inner: Box<DerNode> },
    /// Pre-encoded bytes spliced in verbatim (already a complete TLV,
    /// or a run of sibling TLVs).
    Raw(Vec<u8>),
}

impl DerNode {
    /// INTEGER from a signed value, minimal two's complement content.
    #[must_use]
    pub fn integer(value: i64) -> DerNode {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < 7 {
            let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
                || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        DerNode::Integer(bytes[start..].to_vec())
    }

    /// INTEGER from raw content octets, emitted verbatim.
    #[must_use]
    pub fn integer_bytes(content: &[u8]) -> DerNode {
        DerNode::Integer(content.to_vec())
    }

    #[must_use]
    pub fn octet_string(content: &[u8]) -> DerNode {
        DerNode::OctetString(content.to_vec())
    }

    /// OBJECT IDENTIFIER from dotted notation ("1.2.840.113549.1.1.1").
    ///
    /// The first two arcs fuse into `40*a + b`; each arc is emitted
    /// base-128 with continuation bits. Empty arcs are rejected.
    pub fn oid(dotted: &str) -> CardResult<DerNode> {
        let mut arcs = Vec::new();
        for part in dotted.split('.') {
            if part.is_empty() {
                return Err(CardError::Asn1(format!("malformed OID \"{dotted}\"")));
            }
            let arc: u32 = part
                .parse()
                .map_err(|_| CardError::Asn1(format!("malformed OID \"{dotted}\"")))?;
            arcs.push(arc);
        }
        if arcs.is_empty() {
            return Err(CardError::Asn1("empty OID".to_string()));
        }
        let mut content = Vec::new();
        if arcs.len() > 1 {
            put_base128(&mut content, arcs[0] * 40 + arcs[1]);
            for &arc in &arcs[2..] {
                put_base128(&mut content, arc);
            }
        } else {
            put_base128(&mut content, arcs[0]);
        }
        Ok(DerNode::Oid(content))
    }

    /// UTCTime from calendar components, emitted as `YYMMDDhhmmssZ`.
    ///
    /// Components are validated outright; the two-digit year follows
    /// the usual convention (YY < 50 means 20YY).
    pub fn utc_time(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> CardResult<DerNode> {
        if !(1950..=2049).contains(&year)
            || !(1..=12).contains(&month)
            || !(1..=31).contains(&day)
            || hour > 23
            || minute > 59
            || second > 59
        {
            return Err(CardError::Asn1(format!(
                "UTCTime out of range: {year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
            )));
        }
        let mut data = [0u8; 13];
        let text = format!(
            "{:02}{month:02}{day:02}{hour:02}{minute:02}{second:02}Z",
            year % 100
        );
        data.copy_from_slice(text.as_bytes());
        Ok(DerNode::UtcTime(data))
    }

    #[must_use]
    pub fn sequence(children: Vec<DerNode>) -> DerNode {
        DerNode::Sequence(children)
    }

    #[must_use]
    pub fn set(children: Vec<DerNode>) -> DerNode {
        DerNode::Set(children)
    }

    #[must_use]
    pub fn explicit(tag: u32, inner: DerNode) -> DerNode {
        DerNode::Explicit {
            tag,
            inner: Box::new(inner),
        }
    }

    #[must_use]
    pub fn implicit(tag: u32, inner: DerNode) -> DerNode {
        DerNode::Implicit {
            tag,
            inner: Box::new(inner),
        }
    }

    #[must_use]
    pub fn raw(bytes: &[u8]) -> DerNode {
        DerNode::Raw(bytes.to_vec())
    }

    /// Length of the content octets alone, without identifier and
    /// length octets.
    #[must_use]
    pub fn content_len(&self) -> usize {
        match self {
            DerNode::Boolean(_) => 1,
            DerNode::Integer(c) | DerNode::OctetString(c) | DerNode::Oid(c) | DerNode::Raw(c) => {
                c.len()
            }
            DerNode::Null => 0,
            DerNode::UtcTime(_) => 13,
            DerNode::Sequence(children) | DerNode::Set(children) => {
                children.iter().map(DerNode::encoded_len).sum()
            }
            DerNode::Explicit { inner, .. } => inner.encoded_len(),
            DerNode::Implicit { inner, .. } => inner.content_len(),
        }
    }

    /// Total encoded length: identifier + length octets + content.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            DerNode::Raw(bytes) => bytes.len(),
            DerNode::Implicit { tag, inner } => {
                let content = inner.content_len();
                header_len(*tag, content) + content
            }
            DerNode::Explicit { tag, inner } => {
                let content = inner.encoded_len();
                header_len(*tag, content) + content
            }
            _ => {
                let content = self.content_len();
                header_len(self.universal_tag(), content) + content
            }
        }
    }

    fn universal_tag(&self) -> u32 {
        match self {
            DerNode::Boolean(_) => TAG_BOOLEAN,
            DerNode::Integer(_) => TAG_INTEGER,
            DerNode::OctetString(_) => TAG_OCTET_STRING,
            DerNode::Null => TAG_NULL,
            DerNode::Oid(_) => TAG_OBJECT_IDENTIFIER,
            DerNode::UtcTime(_) => TAG_UTC_TIME,
            DerNode::Sequence(_) => TAG_SEQUENCE,
            DerNode::Set(_) => TAG_SET,
            // Raw/tagged nodes never reach here.
            DerNode::Explicit { .. } | DerNode::Implicit { .. } | DerNode::Raw(_) => unreachable!(),
        }
    }

    fn constructed(&self) -> bool {
        match self {
            DerNode::Sequence(_) | DerNode::Set(_) | DerNode::Explicit { .. } | DerNode::Raw(_) => {
                true
            }
            DerNode::Implicit { inner, .. } => inner.constructed(),
            _ => false,
        }
    }

    /// Append the complete DER encoding of this node.
    pub fn write_into(&self, out: &mut Vec<u8>) {
        match self {
            DerNode::Raw(bytes) => out.extend_from_slice(bytes),
            DerNode::Implicit { tag, inner } => {
                write_header(
                    out,
                    CLASS_CONTEXT,
                    inner.constructed(),
                    *tag,
                    inner.content_len(),
                );
                inner.write_content(out);
            }
            DerNode::Explicit { tag, inner } => {
                write_header(out, CLASS_CONTEXT, true, *tag, inner.encoded_len());
                inner.write_into(out);
            }
            _ => {
                write_header(
                    out,
                    CLASS_UNIVERSAL,
                    self.constructed(),
                    self.universal_tag(),
                    self.content_len(),
                );
                self.write_content(out);
            }
        }
    }

    /// The complete DER encoding as an owned buffer.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write_into(&mut out);
        debug_assert_eq!(out.len(), self.encoded_len());
        out
    }

    fn write_content(&self, out: &mut Vec<u8>) {
        match self {
            DerNode::Boolean(v) => out.push(if *v { 0xFF } else { 0x00 }),
            DerNode::Integer(c) | DerNode::OctetString(c) | DerNode::Oid(c) | DerNode::Raw(c) => {
                out.extend_from_slice(c);
            }
            DerNode::Null => {}
            DerNode::UtcTime(c) => out.extend_from_slice(c),
            DerNode::Sequence(children) => {
                for child in children {
                    child.write_into(out);
                }
            }
            DerNode::Set(children) => {
                // DER demands SET OF elements in ascending encoded order.
                let mut encoded: Vec<Vec<u8>> = children.iter().map(DerNode::encode).collect();
                encoded.sort_unstable();
                for e in &encoded {
                    out.extend_from_slice(e);
                }
            }
            DerNode::Explicit { inner, .. } => inner.write_into(out),
            DerNode::Implicit { inner, .. } => inner.write_content(out),
        }
    }
}

/// Identifier + length octet count for a given tag and content length.
fn header_len(tag: u32, content_len: usize) -> usize {
    let tag_len = if tag < 31 { 1 } else { 1 + base128_len(tag) };
    let len_len = if content_len < 128 {
        1
    } else {
        1 + be_length_octets(content_len)
    };
    tag_len + len_len
}

fn write_header(out: &mut Vec<u8>, class: u8, constructed: bool, tag: u32, content_len: usize) {
    let cons = if constructed { CONSTRUCTED } else { 0 };
    if tag < 31 {
        out.push(class | cons | tag as u8);
    } else {
        out.push(class | cons | 0x1F);
        put_base128(out, tag);
    }
    if content_len < 128 {
        out.push(content_len as u8);
    } else {
        let n = be_length_octets(content_len);
        out.push(0x80 | n as u8);
        for i in (0..n).rev() {
            out.push((content_len >> (8 * i)) as u8);
        }
    }
}

/// Minimal big-endian octet count for a long-form length (1..=4).
fn be_length_octets(len: usize) -> usize {
    if len > 0xFF_FFFF {
        4
    } else if len > 0xFFFF {
        3
    } else if len > 0xFF {
        2
    } else {
        1
    }
}

fn base128_len(value: u32) -> usize {
    let mut n = 1;
    let mut v = value >> 7;
    while v != 0 {
        n += 1;
        v >>= 7;
    }
    n
}

/// Base-128 with the high bit set on all but the last octet.
fn put_base128(out: &mut Vec<u8>, value: u32) {
    let n = base128_len(value);
    for i in (1..n).rev() {
        out.push(0x80 | ((value >> (7 * i)) & 0x7F) as u8);
    }
    out.push((value & 0x7F) as u8);
}
