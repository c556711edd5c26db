//! # Run configuration.
//!
//! [`Config`] centralizes every cadence, bound and path the run supervisor
//! respects: capture/delivery ticks, remote batching, heartbeat idle time,
//! metric rate limiting, shutdown bounds and the local log directory.
//!
//! Config is used in two ways:
//! 1. **Supervisor creation**: `RunSupervisor::builder(job).with_config(cfg)`
//! 2. **Environment layering**: [`Config::from_env`] applies `JOBVISOR_*`
//!    overrides on top of [`Config::default`].
//!
//! ## Sentinel values
//! - `metric_interval = 0s` → no rate limiting (every emission is sent)
//! - `heartbeat_interval = 0s` → heartbeat on every idle drain
//! - `log_dir = None` → no local persistence
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use jobvisor::Config;
//!
//! let mut cfg = Config::default();
//! cfg.capture_interval = Duration::from_millis(200);
//! cfg.metric_interval = Duration::ZERO;
//!
//! assert_eq!(cfg.max_chunk_bytes, 20 * 1024);
//! ```

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding [`Config::log_dir`].
pub const ENV_LOG_DIR: &str = "JOBVISOR_LOG_DIR";

/// Environment variable carrying the remote endpoint base URL.
pub const ENV_SERVER: &str = "JOBVISOR_SERVER";

/// Configuration of one supervised run.
///
/// ## Field semantics
/// - `capture_interval`: event-loop tick between capture passes
/// - `delivery_interval`: delivery-worker tick between queue drains
/// - `remote_batch_interval`: minimum spacing between remote log flushes
/// - `heartbeat_interval`: idle time after which an empty drain sends a heartbeat
/// - `metric_interval`: minimum spacing between two emissions of one metric name
/// - `max_chunk_bytes`: upper bound of one remote log body
/// - `send_timeout`: bound on a single transport send
/// - `grace`: bound on the final drain rendezvous after normal completion
/// - `cancel_grace`: bound on the final drain rendezvous after cancellation
/// - `credential_ttl`: how long a resolved credential is reused
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
#[derive(Clone, Debug)]
pub struct Config {
    /// Tick of the event loop (local echo + log file + remote batching check).
    pub capture_interval: Duration,

    /// Tick of the delivery worker draining the outbound queue.
    pub delivery_interval: Duration,

    /// Minimum time between two remote log flushes.
    ///
    /// Local echo ignores this; the final forced pass bypasses it.
    pub remote_batch_interval: Duration,

    /// Idle time (since the last successful send) after which an empty drain
    /// synthesizes a heartbeat.
    pub heartbeat_interval: Duration,

    /// Minimum interval between two emissions of the same metric name.
    pub metric_interval: Duration,

    /// Maximum size in bytes of one remote log body.
    pub max_chunk_bytes: usize,

    /// Bound on one transport send. Elapsed sends count as transient failures.
    pub send_timeout: Duration,

    /// Maximum wait for the delivery worker's final drain on normal completion.
    pub grace: Duration,

    /// Maximum wait for the delivery worker's final drain after cancellation.
    pub cancel_grace: Duration,

    /// Cache lifetime of a resolved credential.
    pub credential_ttl: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Root directory for per-job log files (`None` disables local persistence).
    pub log_dir: Option<PathBuf>,

    /// Opaque remote endpoint override, handed to transports untouched.
    pub endpoint: Option<String>,

    /// Listen for OS termination signals during the run.
    pub handle_signals: bool,

    /// Terminate the process with exit code 130 after an OS interrupt.
    pub exit_on_interrupt: bool,

    /// `EnvFilter` directive for `tracing` events emitted by the monitored
    /// code; they are formatted into its captured stdout. `None` leaves the
    /// code's events to the process-wide subscriber.
    pub capture_tracing: Option<String>,
}

impl Config {
    /// Applies `JOBVISOR_*` environment overrides on top of the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an explicit variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|v| !v.is_empty()) {
            cfg.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(server) = lookup(ENV_SERVER).filter(|v| !v.is_empty()) {
            cfg.endpoint = Some(server);
        }
        cfg
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the chunk size clamped so that at least one character fits.
    #[inline]
    pub fn chunk_bytes_clamped(&self) -> usize {
        self.max_chunk_bytes.max(4)
    }
}

/// Default log root: `<home>/.jobvisor/logs`.
pub fn default_log_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".jobvisor").join("logs"))
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `capture_interval = 1s`, `delivery_interval = 1s`
    /// - `remote_batch_interval = 1s`
    /// - `heartbeat_interval = 5s`
    /// - `metric_interval = 1s` (at most one emission per second per name)
    /// - `max_chunk_bytes = 20 KiB`
    /// - `send_timeout = 10s`, `grace = 30s`, `cancel_grace = 1s`
    /// - `credential_ttl = 300s`
    /// - `bus_capacity = 1024`
    /// - `log_dir = ~/.jobvisor/logs`
    /// - `capture_tracing = "info"`
    fn default() -> Self {
        Self {
            capture_interval: Duration::from_secs(1),
            delivery_interval: Duration::from_secs(1),
            remote_batch_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(5),
            metric_interval: Duration::from_secs(1),
            max_chunk_bytes: 20 * 1024,
            send_timeout: Duration::from_secs(10),
            grace: Duration::from_secs(30),
            cancel_grace: Duration::from_secs(1),
            credential_ttl: Duration::from_secs(300),
            bus_capacity: 1024,
            log_dir: default_log_dir(),
            endpoint: None,
            handle_signals: true,
            exit_on_interrupt: true,
            capture_tracing: Some("info".to_string()),
        }
    }
}
