use std::time::Duration;

use apalis::prelude::Monitor;

/// Monitor for the worker process.
///
/// Without a `shutdown_timeout` the monitor waits for every in-flight job after the
/// signal fires; with one, jobs still running when it elapses are cut off.
pub fn worker_monitor(shutdown_timeout: Option<Duration>) -> Monitor {
    let monitor = Monitor::new();
    match shutdown_timeout {
        Some(limit) => monitor.shutdown_timeout(limit),
        None => monitor,
    }
}
