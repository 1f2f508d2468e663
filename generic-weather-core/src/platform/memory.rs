use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::{
    Clock, Connectivity, MessageBus, Storage, StorageError, SubscriptionId, SystemClock,
    TransportError, check_storage_len,
};

/// In-process stand-in for the watch host.
///
/// Sent payloads are recorded in order, connectivity and send failures can
/// be toggled, and the clock is either fixed or the system clock. Storage is
/// in memory unless swapped with [`MemoryPlatform::with_storage`].
#[derive(Debug, Default)]
pub struct MemoryPlatform<S = MemoryStorage> {
    connected: bool,
    fail_next_send: Option<TransportError>,
    sent: Vec<Vec<u8>>,
    inbox_size: Option<usize>,
    outbox_size: Option<usize>,
    next_subscription: u32,
    active: Vec<SubscriptionId>,
    fixed_now: Option<DateTime<Utc>>,
    storage: S,
}

impl MemoryPlatform {
    /// Platform with the phone link up.
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Default::default()
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }
}

impl<S> MemoryPlatform<S> {
    /// Same platform state, persisting into `storage` instead.
    pub fn with_storage<T>(self, storage: T) -> MemoryPlatform<T> {
        MemoryPlatform {
            connected: self.connected,
            fail_next_send: self.fail_next_send,
            sent: self.sent,
            inbox_size: self.inbox_size,
            outbox_size: self.outbox_size,
            next_subscription: self.next_subscription,
            active: self.active,
            fixed_now: self.fixed_now,
            storage,
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Makes the next [`MessageBus::send`] fail with `err`.
    pub fn fail_next_send(&mut self, err: TransportError) {
        self.fail_next_send = Some(err);
    }

    pub fn with_fixed_time(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.sent)
    }

    pub fn inbox_size(&self) -> Option<usize> {
        self.inbox_size
    }

    pub fn outbox_size(&self) -> Option<usize> {
        self.outbox_size
    }

    pub fn active_subscriptions(&self) -> &[SubscriptionId] {
        &self.active
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }
}

impl<S> MessageBus for MemoryPlatform<S> {
    fn request_inbox_size(&mut self, size: usize) {
        self.inbox_size = Some(self.inbox_size.map_or(size, |cur| cur.max(size)));
    }

    fn request_outbox_size(&mut self, size: usize) {
        self.outbox_size = Some(self.outbox_size.map_or(size, |cur| cur.max(size)));
    }

    fn subscribe_inbox(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.active.push(id);
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.active.retain(|active| *active != id);
    }

    fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        if let Some(err) = self.fail_next_send.take() {
            return Err(err);
        }
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.sent.push(payload);
        Ok(())
    }
}

impl<S> Connectivity for MemoryPlatform<S> {
    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl<S> Clock for MemoryPlatform<S> {
    fn now(&self) -> DateTime<Utc> {
        self.fixed_now.unwrap_or_else(|| SystemClock.now())
    }
}

impl<S: Storage> Storage for MemoryPlatform<S> {
    fn exists(&self, key: u32) -> bool {
        self.storage.exists(key)
    }

    fn read(&self, key: u32) -> Result<Option<Vec<u8>>, StorageError> {
        self.storage.read(key)
    }

    fn write(&mut self, key: u32, data: &[u8]) -> Result<(), StorageError> {
        self.storage.write(key, data)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    values: HashMap<u32, Vec<u8>>,
}

impl Storage for MemoryStorage {
    fn exists(&self, key: u32) -> bool {
        self.values.contains_key(&key)
    }

    fn read(&self, key: u32) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.values.get(&key).cloned())
    }

    fn write(&mut self, key: u32, data: &[u8]) -> Result<(), StorageError> {
        check_storage_len(data)?;
        self.values.insert(key, data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PERSIST_DATA_MAX_LENGTH;

    #[test]
    fn send_records_payloads_in_order() {
        let mut platform = MemoryPlatform::connected();
        platform.send(vec![1]).unwrap();
        platform.send(vec![2, 3]).unwrap();

        assert_eq!(platform.take_sent(), vec![vec![1], vec![2, 3]]);
        assert!(platform.sent().is_empty());
    }

    #[test]
    fn injected_failure_applies_once() {
        let mut platform = MemoryPlatform::connected();
        platform.fail_next_send(TransportError::Busy);

        assert_eq!(platform.send(vec![1]), Err(TransportError::Busy));
        assert_eq!(platform.send(vec![1]), Ok(()));
    }

    #[test]
    fn disconnected_platform_refuses_to_send() {
        let mut platform = MemoryPlatform::disconnected();
        assert!(!platform.is_connected());
        assert_eq!(platform.send(vec![1]), Err(TransportError::NotConnected));
    }

    #[test]
    fn buffer_requests_keep_the_largest() {
        let mut platform = MemoryPlatform::connected();
        platform.request_inbox_size(200);
        platform.request_inbox_size(64);
        assert_eq!(platform.inbox_size(), Some(200));
    }

    #[test]
    fn unsubscribe_removes_only_that_handle() {
        let mut platform = MemoryPlatform::connected();
        let a = platform.subscribe_inbox();
        let b = platform.subscribe_inbox();
        platform.unsubscribe(a);

        assert_eq!(platform.active_subscriptions(), &[b]);
    }

    #[test]
    fn with_storage_keeps_platform_state() {
        let mut platform = MemoryPlatform::connected();
        platform.send(vec![1]).unwrap();
        let mut other = MemoryStorage::default();
        other.write(9, &[4]).unwrap();

        let platform = platform.with_storage(other);
        assert!(platform.is_connected());
        assert_eq!(platform.sent(), &[vec![1]]);
        assert!(platform.exists(9));
    }

    #[test]
    fn storage_enforces_size_limit() {
        let mut storage = MemoryStorage::default();
        let err = storage
            .write(1, &[0u8; PERSIST_DATA_MAX_LENGTH + 1])
            .unwrap_err();
        assert!(matches!(err, StorageError::TooLarge { .. }));
        assert!(!storage.exists(1));

        storage.write(1, &[7, 7]).unwrap();
        assert_eq!(storage.read(1).unwrap(), Some(vec![7, 7]));
        assert_eq!(storage.read(2).unwrap(), None);
    }
}
