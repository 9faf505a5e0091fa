//! Minimal DER tag/length/value walker.
//!
//! Parses one nesting level of a DER blob into a vector of items;
//! recursion is driven by the caller re-invoking [`parse_level`] on a
//! child's value bytes. This is deliberately not a general BER parser:
//! indefinite lengths, high tag numbers and length-of-length beyond
//! four octets are rejected.

use crate::infra::error::{CardError, CardResult};

/// Well-known identifier octets used when walking certificates.
pub mod tag {
    pub const INTEGER: u8 = 0x02;
    pub const BIT_STRING: u8 = 0x03;
    pub const SEQUENCE: u8 = 0x30;
    pub const SET: u8 = 0x31;
    /// `[0]` context-specific, constructed.
    pub const CONTEXT_0: u8 = 0xA0;
}

/// A parsed view of one TLV: offsets are relative to the slice that
/// was handed to [`parse_level`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerItem {
    /// Identifier octet.
    pub tag: u8,
    /// Offset of the content octets.
    pub value_offset: usize,
    /// Length of the content octets.
    pub value_len: usize,
    /// Offset of the whole TLV, header included.
    pub full_offset: usize,
    /// Length of the whole TLV, header included.
    pub full_len: usize,
}

impl DerItem {
    /// Content octets of this item.
    #[must_use]
    pub fn value<'a>(&self, der: &'a [u8]) -> &'a [u8] {
        &der[self.value_offset..self.value_offset + self.value_len]
    }

    /// The complete TLV including identifier and length octets.
    #[must_use]
    pub fn full<'a>(&self, der: &'a [u8]) -> &'a [u8] {
        &der[self.full_offset..self.full_offset + self.full_len]
    }
}

/// Parse all sibling TLVs at one level of `der`.
///
/// # Errors
///
/// Fails on truncated input, indefinite lengths (`0x80`), high tag
/// numbers (>= 31) and length-of-length beyond four octets.
pub fn parse_level(der: &[u8]) -> CardResult<Vec<DerItem>> {
    let mut items = Vec::new();
    let mut pos = 0;

    while pos < der.len() {
        let full_offset = pos;
        let tag = der[pos];
        if tag & 0x1F == 0x1F {
            return Err(CardError::Asn1(format!(
                "high tag number at offset {pos} not supported"
            )));
        }
        pos += 1;

        let first = *der
            .get(pos)
            .ok_or_else(|| CardError::Asn1("truncated length".to_string()))?;
        pos += 1;

        let value_len = if first == 0x80 {
            return Err(CardError::Asn1(format!(
                "indefinite length at offset {}",
                pos - 1
            )));
        } else if first & 0x80 != 0 {
            let n = (first & 0x7F) as usize;
            if n > 4 {
                return Err(CardError::Asn1(format!("length of length {n} too large")));
            }
            if pos + n > der.len() {
                return Err(CardError::Asn1("truncated length".to_string()));
            }
            let mut len = 0usize;
            for _ in 0..n {
                len = (len << 8) | der[pos] as usize;
                pos += 1;
            }
            len
        } else {
            first as usize
        };

        if pos + value_len > der.len() {
            return Err(CardError::Asn1(format!(
                "value of {value_len} bytes runs past the end of the input"
            )));
        }

        items.push(DerItem {
            tag,
            value_offset: pos,
            value_len,
            full_offset,
            full_len: pos + value_len - full_offset,
        });
        pos += value_len;
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asn1::DerNode;

    #[test]
    fn test_parse_siblings() {
        let der = [0x02, 0x01, 0x05, 0x04, 0x02, 0xAA, 0xBB];
        let items = parse_level(&der).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].tag, tag::INTEGER);
        assert_eq!(items[0].value(&der), &[0x05]);
        assert_eq!(items[0].full(&der), &[0x02, 0x01, 0x05]);
        assert_eq!(items[1].tag, 0x04);
        assert_eq!(items[1].value(&der), &[0xAA, 0xBB]);
    }

    #[test]
    fn test_parse_long_form_length() {
        let node = DerNode::octet_string(&[0x55; 300]);
        let der = node.encode();
        let items = parse_level(&der).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].value_len, 300);
        assert_eq!(items[0].full_len, der.len());
    }

    #[test]
    fn test_parse_rejects_indefinite_length() {
        assert!(parse_level(&[0x30, 0x80, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_parse_rejects_high_tag() {
        assert!(parse_level(&[0x9F, 0x28, 0x01, 0x01]).is_err());
    }

    #[test]
    fn test_parse_rejects_overrun() {
        assert!(parse_level(&[0x04, 0x05, 0x01]).is_err());
        assert!(parse_level(&[0x04]).is_err());
    }

    #[test]
    fn test_parse_rejects_wide_length_of_length() {
        assert!(parse_level(&[0x04, 0x85, 0, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn test_roundtrip_constructed_tree() {
        // parse(emit(N)) must reproduce the structure of N.
        let node = DerNode::sequence(vec![
            DerNode::integer(1),
            DerNode::sequence(vec![
                DerNode::oid("1.3.14.3.2.26").unwrap(),
                DerNode::Null,
            ]),
            DerNode::octet_string(&[1, 2, 3]),
        ]);
        let der = node.encode();
        let outer = parse_level(&der).unwrap();
        assert_eq!(outer.len(), 1);
        assert_eq!(outer[0].tag, tag::SEQUENCE);

        let inner = parse_level(outer[0].value(&der)).unwrap();
        assert_eq!(inner.len(), 3);
        assert_eq!(inner[0].tag, tag::INTEGER);
        assert_eq!(inner[1].tag, tag::SEQUENCE);
        assert_eq!(inner[2].tag, 0x04);

        let algo = parse_level(inner[1].value(outer[0].value(&der))).unwrap();
        assert_eq!(algo.len(), 2);
        assert_eq!(algo[0].tag, 0x06);
        assert_eq!(algo[1].tag, 0x05);
    }
}
