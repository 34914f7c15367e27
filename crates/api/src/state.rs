//! Shared application state

use std::sync::Arc;

use crate::auth::{AccessGate, JwtManager, TokenVerifier};
use crate::store::RecordStore;
use crate::websocket::BroadcastBus;

/// Everything a handler needs, built once at startup and cloned per request
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub bus: Arc<dyn BroadcastBus>,
    pub jwt: JwtManager,
    pub verifier: TokenVerifier,
    pub gate: AccessGate,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, bus: Arc<dyn BroadcastBus>, jwt: JwtManager) -> Self {
        Self {
            verifier: TokenVerifier::new(jwt.clone(), Arc::clone(&store)),
            gate: AccessGate::new(Arc::clone(&store)),
            store,
            bus,
            jwt,
        }
    }
}
