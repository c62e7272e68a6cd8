pub mod body;
pub mod cli;
pub mod config;
pub mod cors;
pub mod error;
pub mod gateway;
pub mod metering;
pub mod metrics;
pub mod proxy;
pub mod routes;
pub mod state;
pub mod store;
pub mod validation;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::Gateway;
pub use state::AppState;
