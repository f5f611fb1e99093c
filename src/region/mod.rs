//! Region subsystem for gridcast.
//!
//! Maps three-level Korean administrative names to forecast grid
//! coordinates, backed by a cached CSV reference table.

pub mod resolver;
pub mod table;
pub mod types;

pub use resolver::{RegionResolver, TableStatus, DEFAULT_TTL};
pub use table::{CsvTable, TableSource};
pub use types::{Coordinate, QueryError, RegionQuery, TableError};
