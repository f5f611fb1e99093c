//! gridcast: region-to-grid resolution and a thin REST proxy over the
//! KMA village forecast API.

pub mod clock;
pub mod config;
pub mod error;
pub mod forecast;
pub mod region;
pub mod server;

pub use error::GatewayError;
