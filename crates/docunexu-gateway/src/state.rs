use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use std::sync::Arc;

/// Shared application state
pub struct AppState<C, B, U> {
    pub config: Arc<GatewayConfig>,
    pub gateway: Arc<Gateway<C, B, U>>,
}

// Manual impl: the store types themselves need not be `Clone`.
impl<C, B, U> Clone for AppState<C, B, U> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            gateway: Arc::clone(&self.gateway),
        }
    }
}

impl<C, B, U> AppState<C, B, U> {
    pub fn new(config: GatewayConfig, gateway: Gateway<C, B, U>) -> Self {
        Self {
            config: Arc::new(config),
            gateway: Arc::new(gateway),
        }
    }
}
