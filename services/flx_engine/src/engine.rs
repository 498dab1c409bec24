//! Engine request/response loop.
//!
//! Single-task consumer of the request queue. The registry is in-memory
//! and O(1), so contention-free sequential processing keeps per-request
//! work bounded and the shutdown model trivial: the loop re-checks the
//! run flag on every empty poll.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};

use bus::{MqConfig, PosixQueue, RecvOutcome, SendOutcome};
use types::wire::{REASON_BAD_REQUEST_JSON, REASON_NOT_IN_ALR};
use types::{FrameKind, RouteRequest, RouteResponse};

use crate::alr::{route_policy, AlrStore};

/// Engine-side bus configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub request_queue: String,
    pub response_queue: String,
    pub queue_depth: usize,
    pub message_size: usize,
    /// Sleep between empty polls of the request queue. Bounds both idle
    /// CPU burn and shutdown-flag reaction time.
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_queue: types::protocol::REQUEST_QUEUE.to_string(),
            response_queue: types::protocol::RESPONSE_QUEUE.to_string(),
            queue_depth: bus::DEFAULT_MAX_MESSAGES,
            message_size: bus::DEFAULT_MESSAGE_SIZE,
            poll_interval: Duration::from_millis(1),
        }
    }
}

/// The FLX engine: owns both bus endpoints and the registry.
pub struct Engine {
    requests: PosixQueue,
    responses: PosixQueue,
    alr: AlrStore,
    config: EngineConfig,
}

impl Engine {
    /// Create both queues (the engine is the owning side) and attach.
    pub fn new(config: EngineConfig, alr: AlrStore) -> Result<Self> {
        let requests = PosixQueue::open(
            MqConfig::new(config.request_queue.as_str())
                .capacity(config.queue_depth, config.message_size)
                .create(true)
                .nonblocking(true),
        )
        .with_context(|| format!("creating request queue {}", config.request_queue))?;

        let responses = PosixQueue::open(
            MqConfig::new(config.response_queue.as_str())
                .capacity(config.queue_depth, config.message_size)
                .create(true)
                .nonblocking(true),
        )
        .with_context(|| format!("creating response queue {}", config.response_queue))?;

        Ok(Self {
            requests,
            responses,
            alr,
            config,
        })
    }

    /// Consume requests until the shutdown flag flips, then unlink both
    /// queue names.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            subscribers = self.alr.len(),
            request_queue = %self.config.request_queue,
            response_queue = %self.config.response_queue,
            "🚀 FLX engine running"
        );

        let mut buf = vec![0u8; self.config.message_size];
        while !*shutdown.borrow() {
            match self.requests.recv(&mut buf) {
                Ok(RecvOutcome::Received(n)) => self.handle_frame(&buf[..n]),
                Ok(RecvOutcome::WouldBlock) => {
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Err(e) => {
                    error!(error = %e, "request queue receive failed");
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }

        info!("FLX engine stopping");
        if let Err(e) = self.requests.unlink() {
            warn!(error = %e, "request queue unlink failed");
        }
        if let Err(e) = self.responses.unlink() {
            warn!(error = %e, "response queue unlink failed");
        }
        Ok(())
    }

    /// Decode, resolve and answer one frame. All failure paths log and
    /// drop; the server observes a timeout for anything unanswered.
    fn handle_frame(&self, frame: &[u8]) {
        let (header, payload) = match codec::decode_frame(frame) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };
        match codec::frame_kind(&header) {
            Ok(FrameKind::RouteRequest) => {}
            Ok(other) => {
                warn!(kind = ?other, corr_id = header.corr_id, "unexpected frame kind");
                return;
            }
            Err(e) => {
                warn!(error = %e, corr_id = header.corr_id, "dropping frame");
                return;
            }
        }

        let response = handle_request(&self.alr, header.corr_id, payload);
        let body = match serde_json::to_vec(&response) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, corr_id = header.corr_id, "response serialization failed");
                return;
            }
        };

        match codec::encode_frame(
            FrameKind::RouteResponse,
            header.corr_id,
            &body,
            self.responses.message_size(),
        ) {
            Ok(out) => match self.responses.send(&out, 0) {
                Ok(SendOutcome::Delivered) => {}
                Ok(SendOutcome::WouldBlock) => {
                    warn!(corr_id = header.corr_id, "response queue full, dropping response");
                }
                Err(e) => {
                    error!(error = %e, corr_id = header.corr_id, "response queue send failed");
                }
            },
            Err(e) => {
                error!(error = %e, corr_id = header.corr_id, "response exceeds bus cap");
            }
        }
    }
}

/// Resolve one request payload into a response.
///
/// The payload is the client's JSON line. Payloads that do not parse as an
/// object answer NOT_FOUND with a `bad_request_json` reason; a parseable
/// object whose subscriber is absent (including a missing `msisdn` field)
/// answers NOT_FOUND with `subscriber_not_in_alr`. The latency field
/// reports wall time spent resolving, in whole milliseconds.
pub fn handle_request(alr: &AlrStore, corr_id: u64, payload: &[u8]) -> RouteResponse {
    let started = Instant::now();

    let request: RouteRequest = match serde_json::from_slice(payload) {
        Ok(request) => request,
        Err(_) => {
            return RouteResponse::not_found(
                corr_id,
                "route",
                "",
                REASON_BAD_REQUEST_JSON,
                elapsed_ms(started),
            );
        }
    };

    match alr.lookup(&request.msisdn) {
        Some(record) => {
            let group = route_policy(record);
            RouteResponse::ok(
                corr_id,
                request.op(),
                &request.msisdn,
                record,
                group,
                elapsed_ms(started),
            )
        }
        None => RouteResponse::not_found(
            corr_id,
            request.op(),
            &request.msisdn,
            REASON_NOT_IN_ALR,
            elapsed_ms(started),
        ),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
