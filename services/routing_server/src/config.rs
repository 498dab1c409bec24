//! Server configuration.

use std::time::Duration;

use tracing::warn;

/// Tunables for the routing server.
///
/// The bus-send retry window and the end-to-end request timeout interact:
/// the retry window must stay below the timeout or a saturated bus eats
/// the whole request budget before the engine ever sees the frame.
/// [`ServerConfig::validate`] warns when the two are misconfigured.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP bind address.
    pub host: String,
    /// TCP port; 0 picks an ephemeral port.
    pub port: u16,
    /// Request queue name (server → engine).
    pub request_queue: String,
    /// Response queue name (engine → server).
    pub response_queue: String,
    /// Queue depth used when attaching.
    pub queue_depth: usize,
    /// Per-message byte cap on the bus.
    pub message_size: usize,
    /// Pending-table ceiling; lines above it are rejected with BUSY.
    pub max_pending: usize,
    /// Worker-pool size.
    pub workers: usize,
    /// Depth of the worker job queue.
    pub job_queue_depth: usize,
    /// Depth of each connection's outbound line queue.
    pub connection_queue_depth: usize,
    /// End-to-end budget for one request, from bus send to engine answer.
    pub request_timeout: Duration,
    /// Bus-send retries before a request fails with `mq_full`.
    pub send_retry_attempts: u32,
    /// Sleep between bus-send retries.
    pub send_retry_backoff: Duration,
    /// Dispatcher sleep when the response queue is empty.
    pub dispatcher_idle: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5555,
            request_queue: types::protocol::REQUEST_QUEUE.to_string(),
            response_queue: types::protocol::RESPONSE_QUEUE.to_string(),
            queue_depth: bus::DEFAULT_MAX_MESSAGES,
            message_size: bus::DEFAULT_MESSAGE_SIZE,
            max_pending: 100_000,
            workers: default_workers(),
            job_queue_depth: 1024,
            connection_queue_depth: 64,
            request_timeout: Duration::from_millis(500),
            send_retry_attempts: 1000,
            send_retry_backoff: Duration::from_micros(200),
            dispatcher_idle: Duration::from_micros(500),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Worst-case time a worker can spend retrying a bus send.
    pub fn send_retry_window(&self) -> Duration {
        self.send_retry_backoff * self.send_retry_attempts
    }

    /// Sanity-check interacting tunables, warning rather than failing:
    /// the server still runs, just with a skewed latency budget.
    pub fn validate(&self) {
        if self.send_retry_window() >= self.request_timeout {
            warn!(
                retry_window_ms = self.send_retry_window().as_millis() as u64,
                request_timeout_ms = self.request_timeout.as_millis() as u64,
                "bus-send retry window is not below the request timeout; \
                 saturated-bus requests will time out instead of reporting mq_full"
            );
        }
        if self.workers == 0 {
            warn!("worker count of 0 will never complete requests");
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .max(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_wire_contract() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 5555);
        assert_eq!(config.request_queue, "/tr_mq_req");
        assert_eq!(config.response_queue, "/tr_mq_resp");
        assert_eq!(config.max_pending, 100_000);
        assert!(config.workers >= 2);
    }

    #[test]
    fn default_retry_window_stays_below_timeout() {
        let config = ServerConfig::default();
        assert!(config.send_retry_window() < config.request_timeout);
    }
}
