/// Consecutive errors after which ad processing is suspended.
pub const DEFAULT_MAX_ERRORS: u32 = 10;
/// Backoff ticks spent suspended before processing is re-enabled.
pub const DEFAULT_MAX_DELAY_TICKS: u32 = 30;
/// Length of one backoff tick.
pub const DEFAULT_BACKOFF_TICK_MS: u64 = 5_000;

/// Display duration used when no slot is available to time the worker loop.
pub const DEFAULT_SLOT_DURATION_MS: u64 = 5_000;
/// Display duration of a campaign slot that does not declare one.
pub const DEFAULT_AD_DURATION_MS: u64 = 60_000;
/// Transition duration of a slot that does not declare one.
pub const DEFAULT_TRANSITION_DURATION_MS: u64 = 500;

pub const MIN_REFRESH_INTERVAL_MS: u64 = 30_000;
pub const MAX_REFRESH_INTERVAL_MS: u64 = 86_400_000;

pub const DEFAULT_EVENT_QUEUE_DEPTH: usize = 32;
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_SCREEN_DPI: u32 = 320;

pub const DEFAULT_ACCOUNT_ID: &str = "undefined";
pub const DEFAULT_CAMPAIGN_ID: &str = "default";

/// Single-byte payload meaning "no campaign exists for this account".
pub const EMPTY_CAMPAIGN_SENTINEL: u8 = 77;
/// Payloads of this size or smaller cannot hold a campaign package.
pub const MIN_PACKAGE_LEN: usize = 100;
/// Largest decompressed package accepted, in bytes.
pub const MAX_UNPACKED_LEN: u64 = 64 * 1024 * 1024;

/// Name of the descriptor file written into each staging directory.
pub const DESCRIPTOR_FILE_NAME: &str = "campaign.json";
/// Link value that suppresses tap-through navigation.
pub const LINK_NONE: &str = "none";
/// Link prefix routed to the host's in-app handler.
pub const LINK_APP_PREFIX: &str = "app/";

pub const ENV_PREFIX: &str = "ADREEL";
pub const ENV_SEPARATOR: &str = "__";
