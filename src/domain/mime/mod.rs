//! RFC 822 / MIME message assembly.
//!
//! Builds the line-oriented header block and the (optionally
//! multipart) body that the S/MIME service signs and ships. Header
//! names are emitted without a space before the value (`From:addr`),
//! which is the wire format the legacy receivers expect.

pub mod base64;
pub mod quoted_printable;

use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Datelike, Local, Timelike};
use rand::Rng;

use crate::infra::error::{CardError, CardResult};
use self::base64::{Base64Codec, ATTACHMENT_LINE_LENGTH};

const CRLF: &str = "\r\n";

const BOUNDARY_PREFIX: &str = "----=_NextPart_8F84C6CA";

const SHORT_DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

const SHORT_MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Transfer encoding applied to attachment parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachmentEncoding {
    /// text/plain, no transfer encoding.
    None,
    /// text/plain, quoted-printable.
    QuotedPrintable,
    /// application/octet-stream, base64.
    #[default]
    Base64,
}

impl std::str::FromStr for AttachmentEncoding {
    type Err = CardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(AttachmentEncoding::None),
            "quoted-printable" => Ok(AttachmentEncoding::QuotedPrintable),
            "base64" => Ok(AttachmentEncoding::Base64),
            other => Err(CardError::InvalidInput(format!(
                "unknown attachment encoding \"{other}\""
            ))),
        }
    }
}

/// One attachment entry: the display name and the file to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub path: PathBuf,
}

/// Parse the semicolon-delimited attachment list.
///
/// Each entry is `path` or `name|path`; without an explicit name the
/// path itself is used as the display name. Empty entries (including
/// a trailing semicolon) are skipped.
#[must_use]
pub fn parse_attachment_list(list: &str) -> Vec<Attachment> {
    list.split(';')
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('|') {
            Some((name, path)) if !name.is_empty() => Attachment {
                name: name.to_string(),
                path: PathBuf::from(path),
            },
            _ => Attachment {
                name: entry.to_string(),
                path: PathBuf::from(entry),
            },
        })
        .collect()
}

/// Format the RFC 822 `Date:` value: `Wdy, DD Mon YYYY HH:MM:SS +0100`.
#[must_use]
pub fn rfc822_date(date: &DateTime<Local>) -> String {
    format!(
        "{}, {} {} {:04} {:02}:{:02}:{:02} +0100",
        SHORT_DAYS[date.weekday().num_days_from_sunday() as usize],
        date.day(),
        SHORT_MONTHS[date.month0() as usize],
        date.year(),
        date.hour(),
        date.minute(),
        date.second()
    )
}

/// Builder for a complete mail message.
#[derive(Debug, Clone, Default)]
pub struct MimeMessageBuilder {
    from: Option<String>,
    to: Option<String>,
    subject: Option<String>,
    extra_headers: Option<String>,
    body: Vec<u8>,
    attachments: Vec<Attachment>,
    attachment_encoding: AttachmentEncoding,
    date: Option<DateTime<Local>>,
    boundary: Option<String>,
}

impl MimeMessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_addr(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    #[must_use]
    pub fn to_addr(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Additional raw header lines, without the trailing CRLF.
    #[must_use]
    pub fn extra_headers(mut self, headers: impl Into<String>) -> Self {
        self.extra_headers = Some(headers.into());
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    #[must_use]
    pub fn attachment_encoding(mut self, encoding: AttachmentEncoding) -> Self {
        self.attachment_encoding = encoding;
        self
    }

    /// Pin the `Date:` header instead of sampling the clock.
    #[must_use]
    pub fn with_date(mut self, date: DateTime<Local>) -> Self {
        self.date = Some(date);
        self
    }

    /// Pin the multipart boundary instead of randomising it.
    #[must_use]
    pub fn with_boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Assemble the message.
    ///
    /// # Errors
    ///
    /// Fails when an attachment file cannot be read.
    pub fn build(&self) -> CardResult<Vec<u8>> {
        let date = self.date.unwrap_or_else(Local::now);

        let mut header = String::new();
        if let Some(from) = &self.from {
            let _ = write!(header, "From:{from}{CRLF}");
        }
        if let Some(to) = &self.to {
            let _ = write!(header, "To:{to}{CRLF}");
        }
        if let Some(subject) = &self.subject {
            let _ = write!(header, "Subject:{subject}{CRLF}");
        }
        let _ = write!(header, "Date:{}{CRLF}", rfc822_date(&date));
        if let Some(extra) = &self.extra_headers {
            if !extra.is_empty() {
                let _ = write!(header, "{extra}{CRLF}");
            }
        }

        let mut body: Vec<u8> = Vec::new();

        if self.attachments.is_empty() && !self.body.is_empty() {
            // Single-part message: the body goes out untouched.
            body.extend_from_slice(&self.body);
            body.extend_from_slice(CRLF.as_bytes());
        } else {
            let boundary = self
                .boundary
                .clone()
                .unwrap_or_else(Self::random_boundary);
            let _ = write!(header, "MIME-Version: 1.0{CRLF}");
            let _ = write!(
                header,
                "Content-Type: multipart/mixed;{CRLF}\tboundary=\"{boundary}\"{CRLF}"
            );

            body.extend_from_slice(
                format!("This is a multi-part message in MIME format.{CRLF}{CRLF}").as_bytes(),
            );

            if !self.body.is_empty() {
                let encoded = quoted_printable::encode(&self.body);
                body.extend_from_slice(format!("--{boundary}{CRLF}").as_bytes());
                body.extend_from_slice(
                    format!("Content-Type: text/plain;{CRLF}\tcharset=\"Windows-1252\"{CRLF}")
                        .as_bytes(),
                );
                body.extend_from_slice(
                    format!("Content-Transfer-Encoding: quoted-printable{CRLF}{CRLF}").as_bytes(),
                );
                body.extend_from_slice(&encoded);
                body.extend_from_slice(CRLF.as_bytes());
            }

            for attachment in &self.attachments {
                self.write_attachment(&mut body, &boundary, attachment)?;
            }

            body.extend_from_slice(format!("{CRLF}--{boundary}--{CRLF}").as_bytes());
        }

        header.push_str(CRLF); // blank line terminates the header block

        let mut message = header.into_bytes();
        message.extend_from_slice(&body);
        Ok(message)
    }

    fn write_attachment(
        &self,
        body: &mut Vec<u8>,
        boundary: &str,
        attachment: &Attachment,
    ) -> CardResult<()> {
        let contents = std::fs::read(&attachment.path).map_err(|e| {
            CardError::Io(format!(
                "failed to read attachment {}: {e}",
                attachment.path.display()
            ))
        })?;
        log::debug!(
            "attaching {} ({} bytes) as \"{}\"",
            attachment.path.display(),
            contents.len(),
            attachment.name
        );
        let name = &attachment.name;

        body.extend_from_slice(format!("{CRLF}--{boundary}{CRLF}").as_bytes());
        match self.attachment_encoding {
            AttachmentEncoding::None => {
                body.extend_from_slice(format!("Content-Type: text/plain;{CRLF}").as_bytes());
                body.extend_from_slice(
                    format!("Content-Disposition: attachment;{CRLF}\tfilename=\"{name}\"{CRLF}{CRLF}")
                        .as_bytes(),
                );
                body.extend_from_slice(&contents);
            }
            AttachmentEncoding::QuotedPrintable => {
                body.extend_from_slice(
                    format!("Content-Type: text/plain;{CRLF}\tname=\"{name}\"{CRLF}").as_bytes(),
                );
                body.extend_from_slice(
                    format!("Content-Transfer-Encoding: quoted-printable{CRLF}").as_bytes(),
                );
                body.extend_from_slice(
                    format!("Content-Disposition: attachment;{CRLF}\tfilename=\"{name}\"{CRLF}{CRLF}")
                        .as_bytes(),
                );
                body.extend_from_slice(&quoted_printable::encode(&contents));
            }
            AttachmentEncoding::Base64 => {
                body.extend_from_slice(
                    format!("Content-Type: application/octet-stream;{CRLF}\tname=\"{name}\"{CRLF}")
                        .as_bytes(),
                );
                body.extend_from_slice(
                    format!("Content-Transfer-Encoding: base64{CRLF}").as_bytes(),
                );
                body.extend_from_slice(
                    format!("Content-Disposition: attachment;{CRLF}\tfilename=\"{name}\"{CRLF}{CRLF}")
                        .as_bytes(),
                );
                body.extend_from_slice(&Base64Codec::new(ATTACHMENT_LINE_LENGTH).encode(&contents));
            }
        }
        Ok(())
    }

    /// Boundary of the form `----=_NextPart_XXXXXXXX` plus two random
    /// decimal digits.
    fn random_boundary() -> String {
        let mut rng = rand::thread_rng();
        format!(
            "{BOUNDARY_PREFIX}{}{}",
            rng.gen_range(0..10),
            rng.gen_range(0..10)
        )
    }
}
