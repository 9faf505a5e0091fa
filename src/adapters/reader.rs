//! Reader driver abstraction.
//!
//! A PC/SC-shaped interface: a [`ReaderDriver`] owns the resource
//! manager context and hands out [`CardConnection`]s, one per card.
//! The session layer is written entirely against these traits so a
//! stub card can stand in for the hardware under test.

use std::fmt;

/// Transport-level failures, before any ISO 7816 interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The card was reset by another session; the connection can be
    /// re-established with [`CardConnection::reconnect`].
    Reset,
    /// Card removed, reader unavailable or not ready.
    NoCard,
    /// Resource-manager level failure.
    Context(String),
    /// Anything else the driver reports.
    Failed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Reset => write!(f, "card was reset"),
            TransportError::NoCard => write!(f, "no card available"),
            TransportError::Context(msg) => write!(f, "context error: {msg}"),
            TransportError::Failed(msg) => write!(f, "transport failure: {msg}"),
        }
    }
}

/// Access to the reader enumeration and card connection services of
/// the platform driver.
pub trait ReaderDriver: Send + Sync {
    /// Names of the attached readers, in enumeration order.
    fn list_readers(&self) -> Result<Vec<String>, TransportError>;

    /// Connect to the card in the named reader (shared mode, T=1).
    fn connect(&self, reader_name: &str) -> Result<Box<dyn CardConnection>, TransportError>;

    /// Whether a card is present in the named reader. Never mutates
    /// connection state.
    fn card_present(&self, reader_name: &str) -> Result<bool, TransportError>;

    /// Drop the resource-manager context. Called when the last slot
    /// closes; a subsequent [`ReaderDriver::connect`] re-acquires it.
    fn release(&self) {}
}

/// An open channel to one card.
pub trait CardConnection: Send {
    /// Transmit a raw APDU and return the complete response,
    /// status word included.
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Acquire the exclusive card lock.
    fn begin_transaction(&mut self) -> Result<(), TransportError>;

    /// Release the exclusive card lock, leaving the card powered.
    fn end_transaction(&mut self) -> Result<(), TransportError>;

    /// Re-establish the channel after a reset, leaving the card as-is.
    fn reconnect(&mut self) -> Result<(), TransportError>;

    /// Close the channel, resetting the card.
    fn disconnect(&mut self);
}
