//! Response dispatcher.
//!
//! Single task draining the response queue. Matching is fire-and-forget:
//! completing a slot is a oneshot send, so the dispatcher never waits on a
//! consumer. Unmatched correlation ids (request already timed out, or a
//! duplicate) are dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use bus::{PosixQueue, RecvOutcome};
use types::FrameKind;

use crate::metrics::RouterMetrics;
use crate::pending::PendingTable;

pub async fn run(
    responses: Arc<PosixQueue>,
    pending: Arc<PendingTable>,
    metrics: Arc<RouterMetrics>,
    idle: Duration,
    shutdown: watch::Receiver<bool>,
) {
    info!("response dispatcher started");
    let mut buf = vec![0u8; responses.message_size()];

    while !*shutdown.borrow() {
        match responses.recv(&mut buf) {
            Ok(RecvOutcome::Received(n)) => handle_frame(&buf[..n], &pending, &metrics),
            Ok(RecvOutcome::WouldBlock) => tokio::time::sleep(idle).await,
            Err(e) => {
                error!(error = %e, "response queue receive failed");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }

    info!("response dispatcher stopped");
}

fn handle_frame(frame: &[u8], pending: &PendingTable, metrics: &RouterMetrics) {
    let (header, payload) = match codec::decode_frame(frame) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(error = %e, "dropping malformed frame from response queue");
            return;
        }
    };
    match codec::frame_kind(&header) {
        Ok(FrameKind::RouteResponse) => {}
        Ok(other) => {
            warn!(kind = ?other, corr_id = header.corr_id, "unexpected frame kind on response queue");
            return;
        }
        Err(e) => {
            warn!(error = %e, corr_id = header.corr_id, "dropping frame");
            return;
        }
    }

    let payload = match std::str::from_utf8(payload) {
        Ok(text) => text,
        Err(_) => {
            warn!(corr_id = header.corr_id, "response payload is not UTF-8, dropping");
            return;
        }
    };

    if pending.complete(header.corr_id, payload.to_string()) {
        RouterMetrics::incr(&metrics.responses_completed);
    } else {
        debug!(
            corr_id = header.corr_id,
            "no pending slot for response (timed out or duplicate)"
        );
    }
}
