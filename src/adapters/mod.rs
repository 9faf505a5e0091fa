//! Adapter layer for the reader hardware.
//!
//! The session manager talks to readers through the [`reader`] traits;
//! [`pcsc`] provides the production implementation on top of the
//! system smart-card resource manager. Tests substitute stub drivers.

#[cfg(feature = "pcsc-backend")]
pub mod pcsc;
pub mod reader;

#[cfg(feature = "pcsc-backend")]
pub use pcsc::PcscDriver;
pub use reader::{CardConnection, ReaderDriver, TransportError};
