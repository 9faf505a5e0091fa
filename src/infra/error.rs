//! Error types for card and signing operations.
//! A single error enum spans the card transport, the ISO 7816 protocol
//! layer and the encoding pipeline; every variant maps onto the 16-bit
//! code space exposed at the legacy API boundary.

use std::fmt;

use thiserror::Error;

/// Result type for card and signing operations
pub type CardResult<T> = Result<T, CardError>;

/// An ISO 7816 status word (SW1 || SW2) as returned by the card.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct StatusWord(pub u16);

impl StatusWord {
    pub const OK: StatusWord = StatusWord(0x9000);
    pub const WRONG_LENGTH: StatusWord = StatusWord(0x6282);
    pub const AUTH_FAILED: StatusWord = StatusWord(0x6300);
    pub const WRONG_LC: StatusWord = StatusWord(0x6700);
    pub const FILE_NOT_FOUND: StatusWord = StatusWord(0x6A82);

    #[must_use]
    pub fn is_ok(self) -> bool {
        self.0 == 0x9000
    }

    /// Remaining verification tries, when the card reports them.
    ///
    /// A zero-length VERIFY answers `63 0x` (or `63 Cx`) with the retry
    /// counter in the low nibble.
    #[must_use]
    pub fn retries_left(self) -> Option<u8> {
        if self.0 & 0xFF00 == 0x6300 {
            Some((self.0 & 0x000F) as u8)
        } else {
            None
        }
    }
}

impl fmt::Debug for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SW={:04X}", self.0)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// Errors surfaced by card sessions, the signing pipeline and the
/// MIME assembly layer.
#[derive(Error, Debug, miette::Diagnostic)]
pub enum CardError {
    #[error("resource manager context error: {0}")]
    ContextError(String),

    #[error("slot is not initialized")]
    NotInitialized,

    #[error("slot is already initialized")]
    AlreadyInitialized,

    #[error("no card in reader")]
    NoCard,

    #[error("unknown card")]
    UnknownCard,

    #[error("card returned status {0}")]
    Status(StatusWord),

    /// A READ BINARY that ran past the end of the file. Carries the
    /// bytes that were read before the card reported `62 82`.
    #[error("file shorter than requested: {} bytes read", data.len())]
    ShortRead { data: Vec<u8> },

    #[error("ASN.1 encoding/decoding error: {0}")]
    Asn1(String),

    #[error("MIME assembly error: {0}")]
    Mime(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("generic error: {0}")]
    Generic(String),
}

impl CardError {
    /// The 16-bit code exposed at the legacy API boundary.
    ///
    /// Library conditions use the low code points, ISO 7816 status
    /// words pass through verbatim, and everything else collapses to
    /// `0xFFFF`. Success (`0x0000`) is never an error code here.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            CardError::ContextError(_) => 0x0001,
            CardError::NotInitialized => 0x0002,
            CardError::AlreadyInitialized => 0x0003,
            CardError::NoCard => 0x0004,
            CardError::UnknownCard => 0x0005,
            CardError::Status(sw) => sw.0,
            CardError::ShortRead { .. } => 0x6282,
            CardError::Asn1(_)
            | CardError::Mime(_)
            | CardError::Io(_)
            | CardError::InvalidInput(_)
            | CardError::Configuration(_)
            | CardError::Generic(_) => 0xFFFF,
        }
    }
}

impl From<std::io::Error> for CardError {
    fn from(error: std::io::Error) -> Self {
        CardError::Io(error.to_string())
    }
}
