//! Publication slot computation.
//!
//! The upstream service publishes on a fixed cadence and lags real time.
//! A request must name a slot that is already out, expressed in Korea
//! Standard Time as `base_date` (YYYYMMDD) and `base_time` (HHMM).

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Asia::Seoul;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Minutes after the hour before an hourly slot is published.
pub const DEFAULT_PUBLICATION_DELAY_MINS: u32 = 10;

/// Hours of the day at which the three-hourly forecast is issued.
const THREE_HOURLY_SLOTS: [u32; 8] = [2, 5, 8, 11, 14, 17, 20, 23];

/// Upstream publication schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Ultra-short-term nowcast: every hour, available after a delay.
    Hourly { delay_mins: u32 },
    /// Village forecast: eight fixed slots a day.
    ThreeHourly,
}

impl Default for Cadence {
    fn default() -> Self {
        Self::Hourly { delay_mins: DEFAULT_PUBLICATION_DELAY_MINS }
    }
}

impl Cadence {
    /// Upstream operation serving this cadence.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Hourly { .. } => "getUltraSrtNcst",
            Self::ThreeHourly => "getVilageFcst",
        }
    }

    /// Override the hourly publication delay; no effect on three-hourly.
    pub fn with_delay(self, delay_mins: u32) -> Self {
        match self {
            Self::Hourly { .. } => Self::Hourly { delay_mins },
            other => other,
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Hourly { .. } => write!(f, "hourly"),
            Cadence::ThreeHourly => write!(f, "three-hourly"),
        }
    }
}

impl FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" | "1h" => Ok(Self::default()),
            "three-hourly" | "threehourly" | "3h" => Ok(Self::ThreeHourly),
            _ => Err(format!("Unknown cadence '{}'. Use 'hourly' or 'three-hourly'.", s)),
        }
    }
}

/// The slot a request was made for, as echoed back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationSlot {
    pub base_date: String,
    pub base_time: String,
}

impl PublicationSlot {
    /// Latest published slot at instant `now`, evaluated in KST.
    pub fn at(now: DateTime<Utc>, cadence: Cadence) -> Self {
        Self::for_local(now.with_timezone(&Seoul).naive_local(), cadence)
    }

    /// Latest published slot for a KST wall-clock time.
    pub fn for_local(local: NaiveDateTime, cadence: Cadence) -> Self {
        let slot = match cadence {
            Cadence::Hourly { delay_mins } => hourly_slot(local, delay_mins),
            Cadence::ThreeHourly => three_hourly_slot(local),
        };
        Self {
            base_date: slot.format("%Y%m%d").to_string(),
            base_time: slot.format("%H%M").to_string(),
        }
    }
}

fn top_of_hour(date: NaiveDate, hour: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(hour))
}

fn hourly_slot(local: NaiveDateTime, delay_mins: u32) -> NaiveDateTime {
    let current = top_of_hour(local.date(), local.hour());
    if local.minute() < delay_mins {
        current - Duration::hours(1)
    } else {
        current
    }
}

fn three_hourly_slot(local: NaiveDateTime) -> NaiveDateTime {
    let date = local.date();
    THREE_HOURLY_SLOTS
        .iter()
        .rev()
        .map(|&h| top_of_hour(date, h))
        .find(|slot| *slot < local)
        .unwrap_or_else(|| top_of_hour(date - Duration::days(1), 23))
}
