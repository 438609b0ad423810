//! Engine-wide constants
//!
//! Single source of truth for policy defaults and node-kind groupings.

/// Default values for engine configuration
pub mod defaults {
    /// Retry budget handed out by `Retry` classifications
    pub const MAX_RETRIES: u32 = 3;
    /// Base retry delay; attempt `n` waits `delay * (n + 1)`
    pub const RETRY_DELAY_MS: u64 = 1000;
    /// Ceiling for a single backoff sleep
    pub const MAX_RETRY_DELAY_MS: u64 = 10_000;
    /// Retries attempted before a failure is classified at all
    pub const INITIAL_RETRIES: u32 = 0;
    /// Maximum entries kept in the error history
    pub const HISTORY_LIMIT: usize = 100;
    /// Command sent by the cleanup hook after an abort
    pub const CLEANUP_COMMAND: &str = "land";
}

/// Node kinds grouped by how the error policy treats them
pub mod node_kinds {
    /// Kinds whose failure always aborts the run
    pub const SAFETY_CRITICAL: &[&str] = &["takeoff", "land", "start", "end"];

    /// Inference-backed kinds that degrade to a fallback result
    pub const FALLBACK_CAPABLE: &[&str] = &[
        "unipixel_segmentation",
        "object_detection",
        "vision_analysis",
        "chat",
        "qr_scan",
    ];
}
