//! End-to-end scenarios: real TCP sockets, real kernel queues, and an
//! in-process FLX engine where the scenario wants one.
//!
//! Queue names embed the test tag and the process id so parallel test
//! threads and parallel CI jobs cannot collide in the kernel namespace.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Barrier};
use tokio::time::timeout;

use bus::{MqConfig, PosixQueue};
use flx_engine::{AlrStore, Engine, EngineConfig};
use routing_server::pending::PendingTable;
use routing_server::{RoutingServer, ServerConfig};

const QUEUE_DEPTH: usize = 8;
const MESSAGE_SIZE: usize = 2048;
const CLIENT_IO_BUDGET: Duration = Duration::from_secs(20);

struct Cluster {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    /// Correlation-table handle for observing in-flight depth.
    pending: Arc<PendingTable>,
    /// Queue handles held for unlink when no engine owns the names.
    owned_queues: Vec<PosixQueue>,
}

impl Cluster {
    /// Start a server (and optionally an engine) on fresh queue names.
    async fn start(
        tag: &str,
        with_engine: bool,
        tweak: impl FnOnce(&mut ServerConfig),
    ) -> Cluster {
        let request_queue = format!("/tl_e2e_{}_{}_req", tag, std::process::id());
        let response_queue = format!("/tl_e2e_{}_{}_resp", tag, std::process::id());

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut owned_queues = Vec::new();

        if with_engine {
            let engine = Engine::new(
                EngineConfig {
                    request_queue: request_queue.clone(),
                    response_queue: response_queue.clone(),
                    queue_depth: QUEUE_DEPTH,
                    message_size: MESSAGE_SIZE,
                    poll_interval: Duration::from_millis(1),
                },
                AlrStore::seeded(),
            )
            .expect("engine queue creation");
            tokio::spawn(engine.run(shutdown_rx.clone()));
        } else {
            // The scenario runs without an engine; create the queues the
            // server expects to attach to.
            for name in [&request_queue, &response_queue] {
                owned_queues.push(
                    PosixQueue::open(
                        MqConfig::new(name.as_str())
                            .capacity(QUEUE_DEPTH, MESSAGE_SIZE)
                            .create(true)
                            .nonblocking(true),
                    )
                    .expect("queue creation"),
                );
            }
        }

        let mut config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            request_queue,
            response_queue,
            queue_depth: QUEUE_DEPTH,
            message_size: MESSAGE_SIZE,
            ..ServerConfig::default()
        };
        tweak(&mut config);

        let server = RoutingServer::bind(config).await.expect("server bind");
        let addr = server.local_addr();
        let pending = server.pending_handle();
        tokio::spawn(server.run(shutdown_rx));

        Cluster {
            addr,
            shutdown,
            pending,
            owned_queues,
        }
    }

    async fn stop(self) {
        let _ = self.shutdown.send(true);
        // Give the engine loop a poll interval to notice and unlink.
        tokio::time::sleep(Duration::from_millis(100)).await;
        for queue in &self.owned_queues {
            let _ = queue.unlink();
        }
    }
}

struct Client {
    writer: OwnedWriteHalf,
    lines: Lines<BufReader<OwnedReadHalf>>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Client {
        let stream = TcpStream::connect(addr).await.expect("client connect");
        let (read_half, writer) = stream.into_split();
        Client {
            writer,
            lines: BufReader::new(read_half).lines(),
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(line.as_bytes())
            .await
            .expect("client write");
    }

    async fn recv(&mut self) -> Value {
        let line = timeout(CLIENT_IO_BUDGET, self.lines.next_line())
            .await
            .expect("response deadline")
            .expect("client read")
            .expect("connection closed early");
        serde_json::from_str(&line).expect("response line is JSON")
    }
}

fn status(value: &Value) -> &str {
    value["status"].as_str().expect("status field")
}

#[tokio::test]
async fn known_subscriber_resolves_end_to_end() {
    let cluster = Cluster::start("known", true, |_| {}).await;
    let mut client = Client::connect(cluster.addr).await;

    client
        .send("{\"msisdn\":\"+14085551234\",\"op\":\"route\"}\n")
        .await;
    let response = client.recv().await;

    assert_eq!(status(&response), "OK");
    assert_eq!(response["msisdn"], "+14085551234");
    assert_eq!(response["op"], "route");
    assert_eq!(response["imsi"], "310150123456789");
    assert_eq!(response["serving_msc"], "MSC_DALLAS_01");
    assert_eq!(response["serving_vlr"], "VLR_DAL_01");
    assert_eq!(response["route_group"], "ROUTE_GROUP_SOUTH");
    assert!(response["corr_id"].as_u64().expect("corr_id") >= 1);
    assert!(response["flx_latency_ms"].as_u64().is_some());

    cluster.stop().await;
}

#[tokio::test]
async fn unknown_subscriber_is_not_found() {
    let cluster = Cluster::start("unknown", true, |_| {}).await;
    let mut client = Client::connect(cluster.addr).await;

    client.send("{\"msisdn\":\"+19999999999\"}\n").await;
    let response = client.recv().await;

    assert_eq!(status(&response), "NOT_FOUND");
    assert_eq!(response["reason"], "subscriber_not_in_alr");
    assert_eq!(response["msisdn"], "+19999999999");

    cluster.stop().await;
}

#[tokio::test]
async fn carriage_returns_and_blank_lines_are_tolerated() {
    let cluster = Cluster::start("crlf", true, |_| {}).await;
    let mut client = Client::connect(cluster.addr).await;

    client
        .send("\r\n{\"msisdn\":\"+12125550123\"}\r\n")
        .await;
    let response = client.recv().await;

    assert_eq!(status(&response), "OK");
    assert_eq!(response["route_group"], "ROUTE_GROUP_EAST");

    cluster.stop().await;
}

#[tokio::test]
async fn overload_rejects_lines_past_the_ceiling() {
    // No engine: armed slots stay armed for the whole request timeout, so
    // a low ceiling is easy to hit deterministically.
    let cluster = Cluster::start("overload", false, |config| {
        config.max_pending = 2;
        config.workers = 2;
        config.request_timeout = Duration::from_millis(300);
    })
    .await;
    let mut client = Client::connect(cluster.addr).await;

    let burst: String = (0..6)
        .map(|i| format!("{{\"msisdn\":\"+1555000{i:04}\"}}\n"))
        .collect();
    client.send(&burst).await;

    let mut busy = 0;
    let mut timed_out = 0;
    for _ in 0..6 {
        let response = client.recv().await;
        match status(&response) {
            "BUSY" => {
                assert_eq!(response["reason"], "overload");
                busy += 1;
            }
            "TIMEOUT" => timed_out += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    // Lines 1 and 2 arm slots and ride out the timeout; lines 3-6 hit the
    // ceiling without ever entering the table.
    assert_eq!(busy, 4);
    assert_eq!(timed_out, 2);

    cluster.stop().await;
}

#[tokio::test]
async fn concurrent_connections_cannot_push_pending_past_the_ceiling() {
    const CONNECTIONS: usize = 8;
    const LINES_PER_CONNECTION: usize = 3;
    const MAX_PENDING: usize = 4;
    const WORKERS: usize = 2;

    // No engine: armed slots stay armed until the request timeout, so
    // every ceiling decision for the burst happens while the table is
    // full.
    let cluster = Cluster::start("race", false, |config| {
        config.max_pending = MAX_PENDING;
        config.workers = WORKERS;
        config.request_timeout = Duration::from_millis(1500);
    })
    .await;

    // Sample the table depth continuously while the burst runs; the
    // in-flight count must never exceed the ceiling plus the worker
    // grace, no matter how many connections race their inserts.
    let observed_max = Arc::new(AtomicUsize::new(0));
    let sampling = Arc::new(AtomicBool::new(true));
    let sampler = {
        let pending = Arc::clone(&cluster.pending);
        let observed_max = Arc::clone(&observed_max);
        let sampling = Arc::clone(&sampling);
        tokio::spawn(async move {
            while sampling.load(Ordering::Relaxed) {
                observed_max.fetch_max(pending.len(), Ordering::Relaxed);
                tokio::time::sleep(Duration::from_micros(200)).await;
            }
        })
    };

    let barrier = Arc::new(Barrier::new(CONNECTIONS));
    let mut tasks = Vec::new();
    for conn in 0..CONNECTIONS {
        let addr = cluster.addr;
        let barrier = Arc::clone(&barrier);
        tasks.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            let batch: String = (0..LINES_PER_CONNECTION)
                .map(|i| format!("{{\"msisdn\":\"+1777{conn:02}{i:02}\"}}\n"))
                .collect();

            // Fire all connections' bursts together.
            barrier.wait().await;
            client.send(&batch).await;

            let mut busy = 0;
            let mut timed_out = 0;
            for _ in 0..LINES_PER_CONNECTION {
                match status(&client.recv().await) {
                    "BUSY" => busy += 1,
                    "TIMEOUT" => timed_out += 1,
                    other => panic!("unexpected status {other}"),
                }
            }
            (busy, timed_out)
        }));
    }

    let mut busy = 0;
    let mut timed_out = 0;
    for task in tasks {
        let (b, t) = task.await.expect("client task");
        busy += b;
        timed_out += t;
    }
    sampling.store(false, Ordering::Relaxed);
    let _ = sampler.await;

    // Exactly `MAX_PENDING` lines of the burst arm slots (and later time
    // out); every other line is rejected without entering the table.
    assert_eq!(timed_out, MAX_PENDING);
    assert_eq!(busy, CONNECTIONS * LINES_PER_CONNECTION - MAX_PENDING);

    let observed_max = observed_max.load(Ordering::Relaxed);
    assert!(
        observed_max <= MAX_PENDING + WORKERS,
        "pending table reached {observed_max}, past the ceiling plus worker grace"
    );

    cluster.stop().await;
}

#[tokio::test]
async fn stalled_engine_yields_timeout() {
    let cluster = Cluster::start("stall", false, |config| {
        config.request_timeout = Duration::from_millis(200);
    })
    .await;
    let mut client = Client::connect(cluster.addr).await;

    let started = Instant::now();
    client.send("{\"msisdn\":\"+14085551234\"}\n").await;
    let response = client.recv().await;

    assert_eq!(status(&response), "TIMEOUT");
    assert_eq!(response["reason"], "flx_no_response");
    assert!(started.elapsed() >= Duration::from_millis(200));

    cluster.stop().await;
}

#[tokio::test]
async fn saturated_request_queue_yields_mq_full() {
    let cluster = Cluster::start("full", false, |config| {
        config.send_retry_attempts = 5;
        config.send_retry_backoff = Duration::from_millis(2);
    })
    .await;

    // Fill the request queue to its depth so every worker send would
    // block for the whole retry window.
    let filler = PosixQueue::open(
        MqConfig::new(cluster.owned_queues[0].name())
            .capacity(QUEUE_DEPTH, MESSAGE_SIZE)
            .nonblocking(true),
    )
    .expect("filler attach");
    for _ in 0..QUEUE_DEPTH {
        filler.send(b"blocker", 0).expect("prefill");
    }

    let mut client = Client::connect(cluster.addr).await;
    client.send("{\"msisdn\":\"+14085551234\"}\n").await;
    let response = client.recv().await;

    assert_eq!(status(&response), "ERROR");
    assert_eq!(response["reason"], "mq_full");

    cluster.stop().await;
}

#[tokio::test]
async fn pipelined_requests_keep_correlation_per_connection() {
    const CONNECTIONS: usize = 10;
    const PER_CONNECTION: usize = 100;

    let cluster = Cluster::start("pipeline", true, |config| {
        // Bounded worker count keeps bus occupancy below the queue depth,
        // so no response is ever dropped for a full response queue.
        config.workers = 4;
    })
    .await;

    let mut tasks = Vec::new();
    for conn in 0..CONNECTIONS {
        let addr = cluster.addr;
        tasks.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;

            let mut expected: HashSet<String> = HashSet::new();
            let mut batch = String::new();
            for i in 0..PER_CONNECTION {
                // Mostly connection-unique unknowns (so cross-connection
                // routing would be caught), with known subscribers mixed in.
                let msisdn = if i % 3 == 0 {
                    "+14085551234".to_string()
                } else {
                    format!("+1999{conn:02}{i:04}")
                };
                expected.insert(msisdn.clone());
                batch.push_str(&format!("{{\"msisdn\":\"{msisdn}\"}}\n"));
            }
            client.send(&batch).await;

            let mut corr_ids = Vec::with_capacity(PER_CONNECTION);
            for _ in 0..PER_CONNECTION {
                let response = client.recv().await;
                let msisdn = response["msisdn"].as_str().expect("msisdn echo");
                assert!(
                    expected.contains(msisdn),
                    "response for {msisdn} routed to the wrong connection"
                );
                match status(&response) {
                    "OK" => assert_eq!(response["msisdn"], "+14085551234"),
                    "NOT_FOUND" => assert_eq!(response["reason"], "subscriber_not_in_alr"),
                    other => panic!("unexpected status {other}"),
                }
                corr_ids.push(response["corr_id"].as_u64().expect("corr_id"));
            }
            corr_ids
        }));
    }

    let mut all_corr_ids = HashSet::new();
    for task in tasks {
        for corr_id in task.await.expect("client task") {
            assert!(
                all_corr_ids.insert(corr_id),
                "correlation id {corr_id} issued twice"
            );
        }
    }
    assert_eq!(all_corr_ids.len(), CONNECTIONS * PER_CONNECTION);

    cluster.stop().await;
}
