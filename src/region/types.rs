//! Core types for the region subsystem.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One row of the reference table: a three-level region name and its
/// forecast grid index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Province or metropolitan city (e.g. "서울특별시")
    pub level1: String,
    /// District (e.g. "종로구"); empty for province-level rows
    pub level2: String,
    /// Neighborhood (e.g. "청운효자동"); empty for district-level rows
    pub level3: String,
    pub nx: i32,
    pub ny: i32,
}

impl Coordinate {
    /// "서울특별시 종로구 청운효자동", skipping empty levels.
    pub fn display_name(&self) -> String {
        [&self.level1, &self.level2, &self.level3]
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A caller-supplied region name, normalized at construction.
///
/// Values are trimmed and blank strings count as absent, so `level2: ""`
/// and a missing `level2` mean the same thing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionQuery {
    pub level1: Option<String>,
    pub level2: Option<String>,
    pub level3: Option<String>,
}

impl RegionQuery {
    pub fn new(level1: Option<&str>, level2: Option<&str>, level3: Option<&str>) -> Self {
        Self {
            level1: normalize(level1),
            level2: normalize(level2),
            level3: normalize(level3),
        }
    }

    /// Query for a province/city only.
    pub fn level1(name: &str) -> Self {
        Self::new(Some(name), None, None)
    }

    /// Build a query from "서울특별시 종로구 청운효자동". Tokens past the
    /// third are folded into level3.
    pub fn from_location(location: &str) -> Self {
        let mut parts = location.split_whitespace();
        let level1 = parts.next();
        let level2 = parts.next();
        let rest: Vec<&str> = parts.collect();
        let level3 = if rest.is_empty() { None } else { Some(rest.join(" ")) };
        Self::new(level1, level2, level3.as_deref())
    }

    /// Reject queries the matcher cannot answer meaningfully.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.level1.is_none() {
            return Err(QueryError::MissingLevel1);
        }
        if self.level3.is_some() && self.level2.is_none() {
            return Err(QueryError::Level3WithoutLevel2);
        }
        Ok(())
    }

    /// Substring match against one row. `level1` is mandatory; `level3`
    /// is only consulted when `level2` is present.
    pub fn matches(&self, row: &Coordinate) -> bool {
        let Some(level1) = self.level1.as_deref() else {
            return false;
        };
        if !row.level1.contains(level1) {
            return false;
        }
        if let Some(level2) = self.level2.as_deref() {
            if !row.level2.contains(level2) {
                return false;
            }
            if let Some(level3) = self.level3.as_deref() {
                if !row.level3.contains(level3) {
                    return false;
                }
            }
        }
        true
    }
}

impl std::fmt::Display for RegionQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<&str> = [&self.level1, &self.level2, &self.level3]
            .iter()
            .filter_map(|l| l.as_deref())
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Malformed region query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("missing 'level1' parameter")]
    MissingLevel1,
    #[error("'level3' requires 'level2'")]
    Level3WithoutLevel2,
}

/// Region table loading errors.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("cannot read region table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed region table: {0}")]
    Csv(#[from] csv::Error),
    #[error("region table has no rows")]
    Empty,
}
