//! Upstream client: one call per observation, typed failures.

use super::slot::{Cadence, PublicationSlot};
use super::types::{result_message, UpstreamError, WeatherEnvelope, RESULT_OK};
use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "http://apis.data.go.kr/1360000/VilageFcstInfoService_2.0";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_NUM_OF_ROWS: u32 = 1000;

const BODY_EXCERPT_LEN: usize = 200;

/// Status and body of an upstream reply, whatever the status.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// The HTTP GET the fetcher needs. `Err` means no response was received.
pub trait Transport: Send + Sync {
    fn get(
        &self,
        url: &str,
        query: &[(&'static str, String)],
        timeout: Duration,
    ) -> Result<RawResponse, String>;
}

/// Blocking transport over `ureq`.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn get(
        &self,
        url: &str,
        query: &[(&'static str, String)],
        timeout: Duration,
    ) -> Result<RawResponse, String> {
        let mut request = self
            .agent
            .get(url)
            .set("User-Agent", concat!("gridcast/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout);
        for (key, value) in query {
            request = request.query(key, value);
        }

        match request.call() {
            Ok(response) => {
                let status = response.status();
                let body = response.into_string().map_err(|e| e.to_string())?;
                Ok(RawResponse { status, body })
            }
            Err(ureq::Error::Status(status, response)) => Ok(RawResponse {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(t)) => Err(t.to_string()),
        }
    }
}

/// Upstream connection settings.
#[derive(Clone)]
pub struct FetcherConfig {
    pub base_url: String,
    /// data.go.kr "decoding" service key; it is percent-encoded on the wire.
    pub api_key: String,
    pub cadence: Cadence,
    pub timeout: Duration,
    pub num_of_rows: u32,
}

impl FetcherConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            cadence: Cadence::default(),
            timeout: DEFAULT_TIMEOUT,
            num_of_rows: DEFAULT_NUM_OF_ROWS,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.cadence.operation())
    }
}

impl fmt::Debug for FetcherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetcherConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("cadence", &self.cadence)
            .field("timeout", &self.timeout)
            .field("num_of_rows", &self.num_of_rows)
            .finish()
    }
}

/// Fetches one observation per call from the upstream service.
pub struct WeatherFetcher {
    config: FetcherConfig,
    transport: Box<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl WeatherFetcher {
    pub fn new(config: FetcherConfig) -> Self {
        Self::with_transport(config, UreqTransport::new(), Arc::new(SystemClock))
    }

    /// Create a fetcher with a specific transport and clock (for testing).
    pub fn with_transport(
        config: FetcherConfig,
        transport: impl Transport + 'static,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            transport: Box::new(transport),
            clock,
        }
    }

    /// Fetch the latest published observation for grid cell `(nx, ny)`.
    pub fn fetch_observation(&self, nx: i32, ny: i32) -> Result<WeatherEnvelope, UpstreamError> {
        self.fetch_observation_at(nx, ny, self.clock.now())
    }

    /// Fetch the observation that was latest at instant `now`.
    pub fn fetch_observation_at(
        &self,
        nx: i32,
        ny: i32,
        now: DateTime<Utc>,
    ) -> Result<WeatherEnvelope, UpstreamError> {
        let slot = PublicationSlot::at(now, self.config.cadence);
        let url = self.config.endpoint();
        let query = self.query_params(&slot, nx, ny);

        debug!(%url, nx, ny, base_date = %slot.base_date, base_time = %slot.base_time, "calling upstream");

        let result = self
            .transport
            .get(&url, &query, self.config.timeout)
            .map_err(UpstreamError::Transport)
            .and_then(parse_response);

        match result {
            Ok(data) => {
                debug!(nx, ny, items = data.len(), "upstream ok");
                Ok(WeatherEnvelope {
                    data,
                    request_time: slot,
                })
            }
            Err(e) => {
                log_failure(&e, nx, ny, &slot);
                Err(e)
            }
        }
    }

    fn query_params(&self, slot: &PublicationSlot, nx: i32, ny: i32) -> Vec<(&'static str, String)> {
        vec![
            ("serviceKey", self.config.api_key.clone()),
            ("pageNo", "1".to_string()),
            ("numOfRows", self.config.num_of_rows.to_string()),
            ("dataType", "JSON".to_string()),
            ("base_date", slot.base_date.clone()),
            ("base_time", slot.base_time.clone()),
            ("nx", nx.to_string()),
            ("ny", ny.to_string()),
        ]
    }
}

fn log_failure(e: &UpstreamError, nx: i32, ny: i32, slot: &PublicationSlot) {
    match e {
        UpstreamError::HttpStatus { status, body } => warn!(
            kind = e.kind(), nx, ny, status, body = %excerpt(body),
            base_time = %slot.base_time, "upstream call failed"
        ),
        _ => warn!(kind = e.kind(), nx, ny, error = %e, base_time = %slot.base_time, "upstream call failed"),
    }
}

/// Validate an upstream reply and pull out the forecast items.
pub fn parse_response(raw: RawResponse) -> Result<Vec<Value>, UpstreamError> {
    if !(200..300).contains(&raw.status) {
        return Err(UpstreamError::HttpStatus {
            status: raw.status,
            body: excerpt(&raw.body),
        });
    }

    let payload: Value = match serde_json::from_str(&raw.body) {
        Ok(payload) => payload,
        Err(e) => {
            // The data.go.kr gateway answers key and quota errors in XML
            // even when JSON was requested.
            return Err(match gateway_reason_code(&raw.body) {
                Some(code) => UpstreamError::Api {
                    message: result_message(code),
                    code: code.to_string(),
                },
                None => UpstreamError::MalformedPayload(format!("body is not JSON: {}", e)),
            });
        }
    };

    let code = payload
        .pointer("/response/header/resultCode")
        .and_then(Value::as_str)
        .ok_or_else(|| UpstreamError::MalformedPayload("missing response.header.resultCode".into()))?;

    if code != RESULT_OK {
        return Err(UpstreamError::Api {
            code: code.to_string(),
            message: result_message(code),
        });
    }

    payload
        .pointer("/response/body/items/item")
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
        .cloned()
        .ok_or(UpstreamError::NoData)
}

/// `returnReasonCode` from an `OpenAPI_ServiceResponse` XML envelope.
fn gateway_reason_code(body: &str) -> Option<&str> {
    if !body.contains("<OpenAPI_ServiceResponse") && !body.contains("<cmmMsgHeader") {
        return None;
    }
    let (_, rest) = body.split_once("<returnReasonCode>")?;
    let (code, _) = rest.split_once("</returnReasonCode>")?;
    Some(code.trim()).filter(|c| !c.is_empty())
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_LEN).collect()
}
