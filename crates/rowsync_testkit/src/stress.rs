//! Stress tests for the sync server.
//!
//! These drive many clients against one server from several threads and
//! report what happened, so tests can check the counters afterwards.

use crate::fixtures::mutations;
use rowsync_protocol::{PullRequest, PushRequest};
use rowsync_server::SyncServer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Mutations pushed by each client.
    pub mutations_per_client: usize,
    /// Number of concurrent clients, one thread each.
    pub threads: usize,
    /// Put every client in one client group instead of one group each.
    pub shared_group: bool,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            mutations_per_client: 200,
            threads: 4,
            shared_group: true,
        }
    }
}

impl StressConfig {
    /// Returns the client group used by client `index`.
    pub fn group_for(&self, index: usize) -> String {
        if self.shared_group {
            "stress-group".to_string()
        } else {
            format!("stress-group-{index}")
        }
    }
}

/// Concurrent clients each create one list and then push todos into it,
/// one mutation per request, pulling after every push.
///
/// Every client acts for its own user, so lists never collide. On success
/// each client's last mutation ID equals `mutations_per_client + 1`.
pub fn stress_concurrent_push_pull(server: Arc<SyncServer>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let server = Arc::clone(&server);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let group = config.group_for(t);
            let count = config.mutations_per_client;

            thread::spawn(move || {
                let client = format!("stress-client-{t}");
                let user = format!("stress-user-{t}");
                let list = format!("stress-list-{t}");
                let mut cookie = None;

                let record = |ok: bool| {
                    if ok {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                };

                let create = mutations::create_list(1, &client, &list, &user);
                record(server.handle_push(&user, PushRequest::new(group.as_str(), vec![create])).is_ok());

                for i in 0..count {
                    let id = i as u64 + 2;
                    let todo = format!("{list}-todo-{i}");
                    let push = mutations::create_todo(id, &client, &todo, &list, "stress");
                    record(server.handle_push(&user, PushRequest::new(group.as_str(), vec![push])).is_ok());

                    match server.handle_pull(&user, PullRequest::new(group.as_str(), cookie.take())) {
                        Ok(response) => {
                            cookie = Some(response.cookie);
                            record(true);
                        }
                        Err(_) => record(false),
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Concurrent clients resend the same batch over and over.
///
/// Only the first delivery of each mutation may have an effect, so each
/// client's last mutation ID must end at exactly `mutations_per_client`.
pub fn stress_duplicate_delivery(server: Arc<SyncServer>, config: &StressConfig, repeats: usize) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let server = Arc::clone(&server);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let group = config.group_for(t);
            let count = config.mutations_per_client;

            thread::spawn(move || {
                let client = format!("dup-client-{t}");
                let user = format!("dup-user-{t}");
                let batch: Vec<_> = (0..count)
                    .map(|i| mutations::create_list(i as u64 + 1, &client, &format!("dup-{t}-{i}"), &user))
                    .collect();

                for _ in 0..repeats {
                    match server.handle_push(&user, PushRequest::new(group.as_str(), batch.clone())) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
