//! Core library for the generic weather session.
//!
//! This crate defines:
//! - The weather record, status and coordinate types
//! - The tuple dictionary codec and the field schema shared with the companion app
//! - Traits for the host services a session needs, plus in-memory and file backends
//! - The session itself and its on-disk configuration
//!
//! It is used by `generic-weather-cli`, but a watch host only needs to implement
//! [`platform::Platform`] to drive a [`WeatherSession`].

pub mod config;
pub mod message;
pub mod model;
pub mod platform;
pub mod provider;
pub mod schema;
pub mod session;

pub use config::{Config, LocationConfig, ProviderConfig};
pub use message::{CodecError, Dictionary, TupleValue};
pub use model::{Coordinates, Status, WeatherInfo};
pub use platform::{Platform, StorageError, TransportError};
pub use provider::ProviderId;
pub use schema::{MalformedReply, MessageKeys, Reply, WeatherRequest};
pub use session::{FetchError, FetchHandle, SessionError, SessionOptions, WeatherSession};
