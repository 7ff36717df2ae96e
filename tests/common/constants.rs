//! Shared constants for end-to-end tests
//!
//! When test data changes (fingerprints, queries, timings), update only this file.

// ============================================================================
// Test Books
// ============================================================================

/// Fingerprint the fake upstream serves a file for
pub const BOOK_1_FINGERPRINT: &str = "5d41402abc4b2a76b9719d911017c592";

/// Title attached to BOOK_1 in search results
pub const BOOK_1_TITLE: &str = "The Dispossessed";

/// Body served for BOOK_1 downloads
pub const BOOK_1_CONTENT: &[u8] = b"anarres and urras";

/// Second fingerprint, also downloadable
pub const BOOK_2_FINGERPRINT: &str = "7d793037a0760186574b0282f2f435e7";

/// Fingerprint the fake upstream answers with 404
pub const MISSING_FINGERPRINT: &str = "0000000000000000000000000000dead";

/// Saved search query that matches BOOK_1
pub const MATCHING_QUERY: &str = "dispossessed";

/// Saved search query that matches nothing
pub const UNMATCHED_QUERY: &str = "no such book anywhere";

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for a server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Interval between readiness checks (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Maximum time to wait for the worker to settle a record (milliseconds)
pub const SETTLE_TIMEOUT_MS: u64 = 5000;

/// HTTP request timeout for test client (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;
