//! Line-protocol objects exchanged with TCP clients.
//!
//! One JSON object per line in both directions. Requests carry `msisdn`
//! (and optionally `op`); unknown fields are ignored. Responses are either
//! full routing decisions produced by the FLX engine or short
//! status-and-reason replies originated by the server itself.

use serde::{Deserialize, Serialize};

use crate::alr::{AlrRecord, RouteGroup};

/// Reason tokens used in `reason` fields across the system.
pub const REASON_OVERLOAD: &str = "overload";
pub const REASON_MQ_FULL: &str = "mq_full";
pub const REASON_MQ_ERROR: &str = "mq_error";
pub const REASON_OVERSIZE_REQUEST: &str = "oversize_request";
pub const REASON_FLX_NO_RESPONSE: &str = "flx_no_response";
pub const REASON_SHUTDOWN: &str = "shutdown";
pub const REASON_NOT_IN_ALR: &str = "subscriber_not_in_alr";
pub const REASON_BAD_REQUEST_JSON: &str = "bad_request_json";

/// One request line from a TCP client.
///
/// A missing `msisdn` is not a parse error: the engine answers NOT_FOUND
/// for the empty subscriber instead, so a sloppy client still gets exactly
/// one response line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteRequest {
    #[serde(default)]
    pub msisdn: String,
    #[serde(default)]
    pub op: Option<String>,
}

impl RouteRequest {
    /// Requested operation, defaulting to `"route"`.
    pub fn op(&self) -> &str {
        self.op.as_deref().unwrap_or("route")
    }
}

/// Response status vocabulary.
///
/// `Ok` and `NotFound` come from the engine; `Busy`, `Error` and `Timeout`
/// are originated by the routing server without engine involvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Ok,
    NotFound,
    Busy,
    Error,
    Timeout,
}

/// Full routing decision for one request, produced by the FLX engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    pub corr_id: u64,
    pub op: String,
    pub msisdn: String,
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imsi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serving_msc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serving_vlr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_group: Option<RouteGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Observed engine-side processing latency in milliseconds.
    pub flx_latency_ms: u64,
}

impl RouteResponse {
    /// Successful lookup: echo the request identity and attach the record
    /// fields plus the routing decision.
    pub fn ok(
        corr_id: u64,
        op: &str,
        msisdn: &str,
        record: &AlrRecord,
        route_group: RouteGroup,
        flx_latency_ms: u64,
    ) -> Self {
        Self {
            corr_id,
            op: op.to_string(),
            msisdn: msisdn.to_string(),
            status: ResponseStatus::Ok,
            imsi: Some(record.imsi.clone()),
            serving_msc: Some(record.serving_msc.clone()),
            serving_vlr: Some(record.serving_vlr.clone()),
            route_group: Some(route_group),
            reason: None,
            flx_latency_ms,
        }
    }

    /// Failed lookup with an empty record and a reason token.
    pub fn not_found(
        corr_id: u64,
        op: &str,
        msisdn: &str,
        reason: &str,
        flx_latency_ms: u64,
    ) -> Self {
        Self {
            corr_id,
            op: op.to_string(),
            msisdn: msisdn.to_string(),
            status: ResponseStatus::NotFound,
            imsi: None,
            serving_msc: None,
            serving_vlr: None,
            route_group: None,
            reason: Some(reason.to_string()),
            flx_latency_ms,
        }
    }
}

/// Short server-originated reply emitted without engine involvement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: ResponseStatus,
    pub reason: String,
}

impl StatusReply {
    pub fn busy() -> Self {
        Self {
            status: ResponseStatus::Busy,
            reason: REASON_OVERLOAD.to_string(),
        }
    }

    pub fn timeout() -> Self {
        Self {
            status: ResponseStatus::Timeout,
            reason: REASON_FLX_NO_RESPONSE.to_string(),
        }
    }

    pub fn error(reason: &str) -> Self {
        Self {
            status: ResponseStatus::Error,
            reason: reason.to_string(),
        }
    }

    /// Render as a JSON object without a trailing newline.
    ///
    /// Status and reason are fixed tokens, so serialization cannot fail.
    pub fn render(&self) -> String {
        serde_json::to_string(self).expect("status reply serialization")
    }
}
