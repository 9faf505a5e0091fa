//! RFC 2045 quoted-printable encoding for mail-safe text bodies.

use crate::infra::error::{CardError, CardResult};

/// Soft line breaks keep encoded lines within 72 columns; a break is
/// inserted once a line reaches this many characters.
const WRAP_COLUMN: usize = 70;

fn needs_escape(c: u8) -> bool {
    // Everything outside printable ASCII, plus the punctuation that
    // mail gateways are known to mangle: ' ( ) + , - . / : = ?
    c < 32 || c > 126 || (39..=41).contains(&c) || (43..=47).contains(&c) || c == 58 || c == 61 || c == 63
}

/// Encode `input` as quoted-printable with soft line breaks.
///
/// A space that ends the stream is protected as `=20` so trailing
/// whitespace survives transport.
#[must_use]
pub fn encode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len() / 2);
    let mut column = 0;

    for (i, &c) in input.iter().enumerate() {
        if c == b' ' && (i + 1 == input.len() || column >= WRAP_COLUMN) {
            out.extend_from_slice(b"=20");
            column += 3;
        } else if needs_escape(c) {
            out.extend_from_slice(format!("={c:02X}").as_bytes());
            column += 3;
        } else {
            out.push(c);
            column += 1;
        }
        if column >= WRAP_COLUMN {
            out.extend_from_slice(b"=\r\n");
            column = 0;
        }
    }
    out
}

/// Decode quoted-printable: `=HH` escapes, `=CRLF` soft breaks,
/// everything else verbatim.
///
/// # Errors
///
/// Fails on an `=` not followed by two hex digits or a CRLF.
pub fn decode(input: &[u8]) -> CardResult<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let c = input[i];
        if c != b'=' {
            out.push(c);
            i += 1;
            continue;
        }
        if input[i + 1..].starts_with(b"\r\n") {
            i += 3; // soft line break
            continue;
        }
        let hex = input
            .get(i + 1..i + 3)
            .ok_or_else(|| CardError::Mime("truncated quoted-printable escape".to_string()))?;
        let value = u8::from_str_radix(
            std::str::from_utf8(hex)
                .map_err(|_| CardError::Mime("malformed quoted-printable escape".to_string()))?,
            16,
        )
        .map_err(|_| CardError::Mime("malformed quoted-printable escape".to_string()))?;
        out.push(value);
        i += 3;
    }
    Ok(out)
}
