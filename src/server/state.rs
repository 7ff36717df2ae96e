use axum::extract::FromRef;

use crate::download_queue::QueueEngine;
use crate::requests::{RequestChecker, RequestManager};
use crate::updates::UpdateBroadcaster;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedQueueEngine = Arc<QueueEngine>;
pub type GuardedRequestManager = Arc<RequestManager>;
pub type GuardedRequestChecker = Arc<RequestChecker>;
pub type GuardedUpdateBroadcaster = Arc<UpdateBroadcaster>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub queue: GuardedQueueEngine,
    pub requests: GuardedRequestManager,
    pub checker: GuardedRequestChecker,
    pub updates: GuardedUpdateBroadcaster,
    pub hash: String,
}

impl FromRef<ServerState> for GuardedQueueEngine {
    fn from_ref(input: &ServerState) -> Self {
        input.queue.clone()
    }
}

impl FromRef<ServerState> for GuardedRequestManager {
    fn from_ref(input: &ServerState) -> Self {
        input.requests.clone()
    }
}

impl FromRef<ServerState> for GuardedRequestChecker {
    fn from_ref(input: &ServerState) -> Self {
        input.checker.clone()
    }
}

impl FromRef<ServerState> for GuardedUpdateBroadcaster {
    fn from_ref(input: &ServerState) -> Self {
        input.updates.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
