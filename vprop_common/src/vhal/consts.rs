//! Hub constants.
//!
//! Defaults for the transport client retry policy, dispatch thread naming
//! and the canonical handler priority order.

/// Canonical hub service name (used for logging and the default config).
pub const HUB_SERVICE_NAME: &str = "vprop_hub";

/// Default wall-clock budget for a synchronous get/set retried on TRY_AGAIN.
pub const DEFAULT_RETRY_TIMEOUT_MS: u64 = 2000;

/// Default sleep between two TRY_AGAIN attempts.
pub const DEFAULT_RETRY_POLL_INTERVAL_MS: u64 = 50;

/// Name of the thread delivering asynchronous events to handlers.
pub const DISPATCH_THREAD_NAME: &str = "vprop-dispatch";

/// Default simulation tick period.
pub const DEFAULT_SIM_TICK_MS: u64 = 100;

/// Handler priority order used when the config does not list handlers.
///
/// Later handlers may rely on earlier ones having configured shared transport
/// state, so release runs in the reverse of this order.
pub const DEFAULT_HANDLER_ORDER: &[&str] = &[
    "power",
    "sensor",
    "input",
    "audio",
    "hvac",
    "cabin",
    "radio",
    "diagnostic",
    "vendor",
];

/// Default configuration directory
pub const DEFAULT_CONFIG_DIR: &str = "/etc/vprop";
