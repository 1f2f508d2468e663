//! Host services the weather session depends on.
//!
//! A watch build wires these to the real message bus, Bluetooth probe, clock
//! and persistent storage. [`memory::MemoryPlatform`] backs tests and the CLI.

use chrono::{DateTime, Utc};

pub mod file;
pub mod memory;

/// Largest value a single storage key may hold.
pub const PERSIST_DATA_MAX_LENGTH: usize = 256;

/// Handle returned by [`MessageBus::subscribe_inbox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u32);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("outbox is busy with another message")]
    Busy,

    #[error("phone is not connected")]
    NotConnected,

    #[error("failed to build message: {0}")]
    Codec(#[from] crate::message::CodecError),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("value of {len} bytes exceeds the {max} byte storage limit")]
    TooLarge { len: usize, max: usize },

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Inbox/outbox channel to the companion app.
pub trait MessageBus {
    fn request_inbox_size(&mut self, size: usize);

    fn request_outbox_size(&mut self, size: usize);

    /// Starts delivery of inbound messages to the session.
    fn subscribe_inbox(&mut self) -> SubscriptionId;

    fn unsubscribe(&mut self, id: SubscriptionId);

    /// Hands an encoded dictionary to the outbox.
    fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError>;
}

/// Short-range wireless link to the phone.
pub trait Connectivity {
    fn is_connected(&self) -> bool;
}

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Small blobs keyed by integer, surviving app restarts.
pub trait Storage {
    fn exists(&self, key: u32) -> bool;

    fn read(&self, key: u32) -> Result<Option<Vec<u8>>, StorageError>;

    fn write(&mut self, key: u32, data: &[u8]) -> Result<(), StorageError>;
}

/// Everything a [`crate::WeatherSession`] needs from its host.
pub trait Platform: MessageBus + Connectivity + Clock + Storage {}

impl<T: MessageBus + Connectivity + Clock + Storage> Platform for T {}

pub(crate) fn check_storage_len(data: &[u8]) -> Result<(), StorageError> {
    if data.len() > PERSIST_DATA_MAX_LENGTH {
        return Err(StorageError::TooLarge {
            len: data.len(),
            max: PERSIST_DATA_MAX_LENGTH,
        });
    }
    Ok(())
}

/// Wall clock of the machine running the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
