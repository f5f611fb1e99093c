//! Reference table sources.
//!
//! The table is the KMA grid spreadsheet exported as CSV. Headers follow
//! the spreadsheet (`1단계`, `2단계`, `3단계`, `nx`, `ny`); English names
//! and the export's `격자 X` / `격자 Y` grid headers are accepted too.
//! Extra columns are ignored.

use super::types::{Coordinate, TableError};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

/// Something that can produce the full reference table in one read.
///
/// A read either yields every row or fails; partial tables are never
/// returned.
pub trait TableSource: Send + Sync {
    fn read(&self) -> Result<Vec<Coordinate>, TableError>;

    /// Human-readable origin for logs.
    fn describe(&self) -> String;
}

#[derive(Deserialize)]
struct TableRow {
    #[serde(rename = "1단계", alias = "level1")]
    level1: String,
    #[serde(rename = "2단계", alias = "level2", default)]
    level2: String,
    #[serde(rename = "3단계", alias = "level3", default)]
    level3: String,
    #[serde(alias = "격자 X")]
    nx: i32,
    #[serde(alias = "격자 Y")]
    ny: i32,
}

impl From<TableRow> for Coordinate {
    fn from(row: TableRow) -> Self {
        Self {
            level1: row.level1,
            level2: row.level2,
            level3: row.level3,
            nx: row.nx,
            ny: row.ny,
        }
    }
}

/// CSV file on disk.
#[derive(Debug, Clone)]
pub struct CsvTable {
    path: PathBuf,
}

impl CsvTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TableSource for CsvTable {
    fn read(&self) -> Result<Vec<Coordinate>, TableError> {
        let file = File::open(&self.path).map_err(|source| TableError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_csv(file)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Parse a whole CSV table. Any bad row fails the whole parse.
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<Coordinate>, TableError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let rows = rdr
        .deserialize::<TableRow>()
        .map(|r| r.map(Coordinate::from))
        .collect::<Result<Vec<_>, _>>()?;

    if rows.is_empty() {
        return Err(TableError::Empty);
    }
    Ok(rows)
}
