//! Signed S/MIME assembly.
//!
//! Materialises the inner multipart message (attachments base64
//! encoded), signs its raw bytes into a P7M envelope, and wraps the
//! base64 of that envelope into the outer mail with the
//! `application/x-pkcs7-mime` headers. The output file only appears
//! on success.

use std::path::Path;

use crate::domain::mime::base64::Base64Codec;
use crate::domain::mime::{parse_attachment_list, AttachmentEncoding, MimeMessageBuilder};
use crate::domain::types::{CardPin, SlotIndex};
use crate::infra::error::{CardError, CardResult};
use crate::services::session::CardManager;
use crate::services::signer::Pkcs7SignService;

const CRLF: &str = "\r\n";

/// Addressing and content of one outgoing message.
#[derive(Debug, Clone, Default)]
pub struct SmimeRequest {
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Additional raw header lines for the outer message.
    pub extra_headers: Option<String>,
    pub body: String,
    /// Semicolon-delimited attachment list (`[name|]path[;...]`).
    pub attachments: Option<String>,
}

/// Signed-mail production against a connected card session.
pub struct SmimeService<'a> {
    manager: &'a CardManager,
}

impl<'a> SmimeService<'a> {
    #[must_use]
    pub fn new(manager: &'a CardManager) -> Self {
        Self { manager }
    }

    /// Build, sign and write the S/MIME message to `output`.
    pub fn sign_to_file(
        &self,
        slot: SlotIndex,
        pin: &CardPin,
        request: &SmimeRequest,
        output: &Path,
    ) -> CardResult<()> {
        let message = self.sign_to_bytes(slot, pin, request)?;
        if let Err(e) = std::fs::write(output, &message) {
            let _ = std::fs::remove_file(output);
            return Err(CardError::Io(format!(
                "failed to write {}: {e}",
                output.display()
            )));
        }
        log::info!(
            "smime sign: wrote {} bytes to {}",
            message.len(),
            output.display()
        );
        Ok(())
    }

    /// Build and sign the S/MIME message in memory.
    pub fn sign_to_bytes(
        &self,
        slot: SlotIndex,
        pin: &CardPin,
        request: &SmimeRequest,
    ) -> CardResult<Vec<u8>> {
        log::info!("smime sign: slot {slot}, to {}", request.to);

        // Inner message: everything the signature must cover, with
        // attachments carried as base64.
        let attachments = request
            .attachments
            .as_deref()
            .map(parse_attachment_list)
            .unwrap_or_default();
        let inner = MimeMessageBuilder::new()
            .from_addr(&request.from)
            .to_addr(&request.to)
            .subject(&request.subject)
            .body(request.body.as_bytes().to_vec())
            .attachments(attachments)
            .attachment_encoding(AttachmentEncoding::Base64)
            .build()?;

        let envelope = Pkcs7SignService::new(self.manager).sign_bytes(slot, pin, &inner)?;

        let transfer_body = Base64Codec::default().encode(&envelope);

        let mut outer_headers = format!(
            "MIME-Version: 1.0{CRLF}\
             Content-Type: application/x-pkcs7-mime;{CRLF}\
             \tsmime-type=signed-data;{CRLF}\
             \tname=\"smime.p7m\"{CRLF}\
             Content-Transfer-Encoding: base64{CRLF}\
             Content-Disposition: attachment;{CRLF}\
             \tfilename=\"smime.p7m\""
        );
        if let Some(extra) = request.extra_headers.as_deref() {
            if !extra.is_empty() {
                outer_headers.push_str(CRLF);
                outer_headers.push_str(extra);
            }
        }

        MimeMessageBuilder::new()
            .from_addr(&request.from)
            .to_addr(&request.to)
            .subject(&request.subject)
            .extra_headers(outer_headers)
            .body(transfer_body)
            .build()
    }
}
