//! Watch-side weather session.
//!
//! A session asks the companion app for weather with [`WeatherSession::fetch`]
//! and learns the result when the host feeds inbound messages to
//! [`WeatherSession::handle_message`]. Each fetch hands back a [`FetchHandle`]
//! that resolves once with the reply, while every status transition,
//! including the immediate `Pending`, is published on [`WeatherSession::watch_status`].

use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

use crate::{
    message::{CodecError, Dictionary},
    model::{Coordinates, RecordError, Status, WeatherInfo, truncate_to},
    platform::{Platform, StorageError, SubscriptionId, TransportError},
    provider::ProviderId,
    schema::{MalformedReply, MessageKeys, Reply, WeatherRequest},
};

/// Inbox capacity requested from the host.
pub const INBOX_SIZE: usize = 200;

/// Outbox capacity requested from the host.
pub const OUTBOX_SIZE: usize = 100;

/// Longest API key kept, in bytes.
pub const API_KEY_MAX_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub keys: MessageKeys,
    pub inbox_size: usize,
    pub outbox_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            keys: MessageKeys::default(),
            inbox_size: INBOX_SIZE,
            outbox_size: OUTBOX_SIZE,
        }
    }
}

/// Failures reported synchronously by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("weather session is not initialized")]
    NotInitialized,

    #[error("phone is not connected over Bluetooth")]
    BluetoothDisconnected,

    #[error("failed to send weather request: {0}")]
    Transport(#[from] TransportError),

    #[error("weather record storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("stored weather record is unreadable: {0}")]
    Record(#[from] RecordError),
}

/// How a sent request ended, as delivered through a [`FetchHandle`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("companion rejected the API key")]
    BadKey,

    #[error("companion could not determine a location")]
    LocationUnavailable,

    #[error("malformed reply from companion: {0}")]
    Malformed(#[from] MalformedReply),

    #[error("request was superseded or the session shut down")]
    Abandoned,
}

pub type FetchOutcome = Result<WeatherInfo, FetchError>;

/// One-shot completion of a single fetch.
#[derive(Debug)]
pub struct FetchHandle {
    rx: oneshot::Receiver<FetchOutcome>,
}

impl FetchHandle {
    /// Waits for the companion's reply.
    pub async fn wait(self) -> FetchOutcome {
        self.rx.await.unwrap_or(Err(FetchError::Abandoned))
    }

    /// Non-blocking poll; `None` while the reply is still outstanding.
    pub fn try_outcome(&mut self) -> Option<FetchOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(FetchError::Abandoned)),
        }
    }
}

/// State that only exists between `init` and `deinit`.
#[derive(Debug)]
struct Active {
    info: WeatherInfo,
    subscription: SubscriptionId,
    pending: Option<oneshot::Sender<FetchOutcome>>,
}

pub struct WeatherSession<P> {
    platform: P,
    options: SessionOptions,
    request: WeatherRequest,
    active: Option<Active>,
    status: watch::Sender<Status>,
}

impl<P: Platform> WeatherSession<P> {
    /// Creates a session that does nothing until [`WeatherSession::init`].
    pub fn new(platform: P, options: SessionOptions) -> Self {
        let (status, _) = watch::channel(Status::NotYetFetched);
        Self {
            platform,
            options,
            request: WeatherRequest::default(),
            active: None,
            status,
        }
    }

    /// Starts (or restarts) the session with a blank record.
    ///
    /// API key, provider and location return to their defaults; the
    /// feels-like flag is kept.
    pub fn init(&mut self) {
        if let Some(prev) = self.active.take() {
            debug!("re-initializing weather session");
            self.platform.unsubscribe(prev.subscription);
        }

        self.request = WeatherRequest {
            feels_like: self.request.feels_like,
            ..Default::default()
        };
        self.platform.request_inbox_size(self.options.inbox_size);
        self.platform.request_outbox_size(self.options.outbox_size);
        let subscription = self.platform.subscribe_inbox();

        self.active = Some(Active {
            info: WeatherInfo::default(),
            subscription,
            pending: None,
        });
        self.set_status(Status::NotYetFetched);
    }

    /// Releases the record and stops listening. Pending fetches resolve as abandoned.
    pub fn deinit(&mut self) {
        if let Some(active) = self.active.take() {
            self.platform.unsubscribe(active.subscription);
            debug!("weather session deinitialized");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.active.is_some()
    }

    /// `None` clears the key.
    pub fn set_api_key(&mut self, api_key: Option<&str>) {
        self.request.api_key = api_key
            .map(|key| truncate_to(key, API_KEY_MAX_LEN).to_owned())
            .unwrap_or_default();
    }

    pub fn set_provider(&mut self, provider: Option<ProviderId>) {
        self.request.provider = provider;
    }

    pub fn set_location(&mut self, location: Coordinates) {
        self.request.location = location;
    }

    pub fn set_feels_like(&mut self, feels_like: bool) {
        self.request.feels_like = feels_like;
    }

    pub fn request(&self) -> &WeatherRequest {
        &self.request
    }

    /// Sends a weather request to the companion app.
    ///
    /// On success the status is already `Pending` when this returns.
    pub fn fetch(&mut self) -> Result<FetchHandle, SessionError> {
        if self.active.is_none() {
            return Err(SessionError::NotInitialized);
        }

        if !self.platform.is_connected() {
            debug!("phone unreachable, weather request not sent");
            self.abandon_pending();
            self.set_status(Status::BluetoothDisconnected);
            return Err(SessionError::BluetoothDisconnected);
        }

        if let Err(e) = self.send_request() {
            warn!(error = %e, "weather request failed");
            self.abandon_pending();
            self.set_status(Status::Failed);
            return Err(e.into());
        }

        let (tx, rx) = oneshot::channel();
        let replaced = self.active.as_mut().and_then(|active| active.pending.replace(tx));
        if replaced.is_some() {
            debug!("replacing an unanswered weather request");
        }
        self.set_status(Status::Pending);

        Ok(FetchHandle { rx })
    }

    /// Drops an unanswered completion so a late reply cannot resolve it.
    fn abandon_pending(&mut self) {
        let dropped = self.active.as_mut().and_then(|active| active.pending.take());
        if dropped.is_some() {
            debug!("abandoning an unanswered weather request");
        }
    }

    fn send_request(&mut self) -> Result<(), TransportError> {
        let payload = self
            .request
            .to_dictionary(&self.options.keys)
            .encode(self.options.outbox_size)?;
        debug!(bytes = payload.len(), "sending weather request");
        self.platform.send(payload)
    }

    /// Entry point for every inbound message from the host.
    ///
    /// Returns the new status, or `None` when the message was not for this
    /// session (or the session is not running).
    pub fn handle_message(&mut self, message: &Dictionary) -> Option<Status> {
        let active = self.active.as_mut()?;
        let reply = Reply::classify(message, &self.options.keys)?;

        let (status, outcome) = match reply {
            Reply::Weather(reply) => {
                active.info = reply.into_info(self.platform.now().timestamp());
                debug!(name = %active.info.name, temp_k = active.info.temp_k, "weather updated");
                (Status::Available, Ok(active.info.clone()))
            }
            Reply::BadKey => (Status::BadKey, Err(FetchError::BadKey)),
            Reply::LocationUnavailable => {
                (Status::LocationUnavailable, Err(FetchError::LocationUnavailable))
            }
            Reply::Malformed(reason) => {
                warn!(%reason, "discarding malformed weather reply");
                (Status::Failed, Err(FetchError::Malformed(reason)))
            }
        };

        match active.pending.take() {
            // receiver may already be gone; the status still records the outcome
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => debug!(%status, "weather reply without an outstanding request"),
        }

        self.set_status(status);
        Some(status)
    }

    /// Decodes a raw inbound image and handles it.
    pub fn handle_payload(&mut self, payload: &[u8]) -> Result<Option<Status>, CodecError> {
        if payload.len() > self.options.inbox_size {
            return Err(CodecError::Overflow {
                needed: payload.len(),
                capacity: self.options.inbox_size,
            });
        }
        let message = Dictionary::decode(payload)?;
        Ok(self.handle_message(&message))
    }

    /// Last known weather; only meaningful once the status has been `Available`.
    pub fn peek(&self) -> Option<&WeatherInfo> {
        self.active.as_ref().map(|active| &active.info)
    }

    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    /// Receiver observing every status transition.
    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    /// Persists the current record under `key`.
    pub fn save(&mut self, key: u32) -> Result<(), SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::NotInitialized)?;
        self.platform.write(key, &active.info.to_record())?;
        debug!(key, "weather record saved");
        Ok(())
    }

    /// Replaces the current record with the one stored under `key`.
    ///
    /// Returns `false` (record untouched) when nothing is stored there.
    pub fn load(&mut self, key: u32) -> Result<bool, SessionError> {
        let active = self.active.as_mut().ok_or(SessionError::NotInitialized)?;
        if !self.platform.exists(key) {
            return Ok(false);
        }
        let Some(bytes) = self.platform.read(key)? else {
            return Ok(false);
        };
        active.info = WeatherInfo::from_record(&bytes)?;
        debug!(key, "weather record loaded");
        Ok(true)
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    fn set_status(&self, status: Status) {
        self.status.send_replace(status);
    }
}
