//! PC/SC-backed reader driver.
//!
//! Wraps the system resource manager behind the [`ReaderDriver`]
//! traits. The context is established lazily on first use and dropped
//! again when the session layer releases the last slot.

use std::ffi::CString;
use std::sync::Mutex;

use pcsc::{Context, Disposition, Protocols, ReaderState, Scope, ShareMode, State};

use super::reader::{CardConnection, ReaderDriver, TransportError};

/// Response buffer size: 256 data bytes plus the status word.
const RESPONSE_BUFFER: usize = 258;

fn map_pcsc_error(error: pcsc::Error) -> TransportError {
    match error {
        pcsc::Error::ResetCard => TransportError::Reset,
        pcsc::Error::NoSmartcard
        | pcsc::Error::RemovedCard
        | pcsc::Error::ReaderUnavailable
        | pcsc::Error::NotReady => TransportError::NoCard,
        pcsc::Error::NoService | pcsc::Error::ServiceStopped | pcsc::Error::InvalidHandle => {
            TransportError::Context(error.to_string())
        }
        other => TransportError::Failed(other.to_string()),
    }
}

/// Driver over the platform PC/SC stack.
pub struct PcscDriver {
    context: Mutex<Option<Context>>,
}

impl PcscDriver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            context: Mutex::new(None),
        }
    }

    fn with_context<T>(
        &self,
        f: impl FnOnce(&Context) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let mut guard = self.context.lock().expect("pcsc context lock poisoned");
        if guard.is_none() {
            log::debug!("establishing PC/SC context");
            let context = Context::establish(Scope::User)
                .map_err(|e| TransportError::Context(e.to_string()))?;
            *guard = Some(context);
        }
        f(guard.as_ref().expect("context just established"))
    }
}

impl Default for PcscDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderDriver for PcscDriver {
    fn list_readers(&self) -> Result<Vec<String>, TransportError> {
        self.with_context(|context| {
            let readers = context.list_readers_owned().map_err(map_pcsc_error)?;
            Ok(readers
                .into_iter()
                .map(|name| name.to_string_lossy().into_owned())
                .collect())
        })
    }

    fn connect(&self, reader_name: &str) -> Result<Box<dyn CardConnection>, TransportError> {
        let reader = CString::new(reader_name)
            .map_err(|_| TransportError::Failed(format!("bad reader name {reader_name:?}")))?;
        self.with_context(|context| {
            let card = context
                .connect(&reader, ShareMode::Shared, Protocols::T1)
                .map_err(map_pcsc_error)?;
            log::info!("connected to card in reader {reader_name}");
            Ok(Box::new(PcscConnection {
                txn: None,
                card: Some(Box::new(card)),
            }) as Box<dyn CardConnection>)
        })
    }

    fn card_present(&self, reader_name: &str) -> Result<bool, TransportError> {
        let reader = CString::new(reader_name)
            .map_err(|_| TransportError::Failed(format!("bad reader name {reader_name:?}")))?;
        self.with_context(|context| {
            let mut states = [ReaderState::new(reader, State::UNAWARE)];
            context
                .get_status_change(Some(std::time::Duration::ZERO), &mut states)
                .map_err(map_pcsc_error)?;
            Ok(states[0].event_state().contains(State::PRESENT))
        })
    }

    fn release(&self) {
        let mut guard = self.context.lock().expect("pcsc context lock poisoned");
        if guard.take().is_some() {
            log::debug!("released PC/SC context");
        }
    }
}

/// One PC/SC card channel.
///
/// The transaction guard borrows the boxed card. `txn` is declared
/// first so it drops before `card`, and it is always cleared before
/// the card is mutably borrowed, moved or dropped.
struct PcscConnection {
    txn: Option<pcsc::Transaction<'static>>,
    card: Option<Box<pcsc::Card>>,
}

impl CardConnection for PcscConnection {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut buffer = [0u8; RESPONSE_BUFFER];
        let response = match (&self.txn, &self.card) {
            // A live transaction guard derefs to the card.
            (Some(txn), _) => txn.transmit(apdu, &mut buffer),
            (None, Some(card)) => card.transmit(apdu, &mut buffer),
            (None, None) => return Err(TransportError::NoCard),
        }
        .map_err(map_pcsc_error)?;
        Ok(response.to_vec())
    }

    fn begin_transaction(&mut self) -> Result<(), TransportError> {
        if self.txn.is_some() {
            return Ok(());
        }
        let card = self.card.as_mut().ok_or(TransportError::NoCard)?;
        // SAFETY: the guard borrows the heap-allocated card, which is
        // not moved or mutably borrowed while `txn` is set, and `txn`
        // drops first.
        let card: &'static mut pcsc::Card =
            unsafe { &mut *(card.as_mut() as *mut pcsc::Card) };
        self.txn = Some(card.transaction().map_err(map_pcsc_error)?);
        Ok(())
    }

    fn end_transaction(&mut self) -> Result<(), TransportError> {
        // Dropping the guard ends the transaction, leaving the card.
        self.txn = None;
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        self.txn = None;
        let card = self.card.as_mut().ok_or(TransportError::NoCard)?;
        card.reconnect(ShareMode::Shared, Protocols::T1, Disposition::LeaveCard)
            .map_err(map_pcsc_error)?;
        log::debug!("reconnected card channel after reset");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.txn = None;
        if let Some(card) = self.card.take() {
            let _ = card.disconnect(Disposition::ResetCard);
        }
    }
}

impl Drop for PcscConnection {
    fn drop(&mut self) {
        self.txn = None;
        if let Some(card) = self.card.take() {
            let _ = card.disconnect(Disposition::ResetCard);
        }
    }
}
