pub mod account;
pub mod gateway;
pub mod health;

use actix_web::web;

use crate::store::{BalanceStore, CredentialValidator, UsageLog};

/// Mount every route for a gateway built over the given store types.
pub fn configure<C, B, U>(cfg: &mut web::ServiceConfig)
where
    C: CredentialValidator + 'static,
    B: BalanceStore + 'static,
    U: UsageLog + 'static,
{
    cfg.configure(health::configure::<C, B, U>)
        .configure(account::configure::<C, B, U>)
        .configure(gateway::configure::<C, B, U>);
}
