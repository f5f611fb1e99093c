//! Forecast subsystem: publication slots and the upstream client.

pub mod client;
pub mod slot;
pub mod types;

pub use client::{FetcherConfig, RawResponse, Transport, UreqTransport, WeatherFetcher};
pub use slot::{Cadence, PublicationSlot};
pub use types::{result_message, UpstreamError, WeatherEnvelope};
