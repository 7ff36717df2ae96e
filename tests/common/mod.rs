//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, TestClient, BOOK_1_FINGERPRINT};
//! use reqwest::StatusCode;
//!
//! #[tokio::test]
//! async fn test_enqueue() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::new(server.base_url.clone());
//!
//!     let response = client.enqueue(BOOK_1_FINGERPRINT, None).await;
//!     assert_eq!(response.status(), StatusCode::CREATED);
//! }
//! ```

// Each test binary uses a different subset of the helpers
#![allow(dead_code)]

mod client;
mod constants;
mod server;
mod upstream;

// Public API - this is what tests import
pub use client::{EventReader, SseEvent, TestClient};
pub use constants::*;
pub use server::TestServer;
pub use upstream::FakeUpstream;
