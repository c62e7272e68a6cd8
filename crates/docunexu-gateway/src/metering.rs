//! Post-flight metering: runs only after an authenticated call came back 2xx.
//!
//! Both steps are best-effort. The caller's response is already decided when
//! this runs, so failures are logged and counted, never returned.

use crate::metrics::{CREDITS_CONSUMED, METERING_FAILURES};
use crate::store::{BalanceStore, UsageLog, UsageRecord};

/// Flat price of one successful proxied call.
pub const CREDIT_COST: i64 = 1;

/// What the metering stage managed to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeteringOutcome {
    pub debited: bool,
    pub logged: bool,
}

/// Decrement the account's credits and append a usage record.
/// The two steps are attempted independently.
pub async fn meter_call<B, U>(
    balances: &B,
    usage: &U,
    account_id: &str,
    endpoint: &str,
) -> MeteringOutcome
where
    B: BalanceStore,
    U: UsageLog,
{
    let debited = match balances.decrement(account_id, CREDIT_COST).await {
        Ok(true) => {
            CREDITS_CONSUMED.inc_by(CREDIT_COST as u64);
            true
        }
        Ok(false) => {
            // A concurrent call spent the last credit between the pre-check and now.
            tracing::warn!(
                account_id = %account_id,
                endpoint = %endpoint,
                "balance no longer covers the call, credit not deducted"
            );
            METERING_FAILURES.with_label_values(&["overdraw"]).inc();
            false
        }
        Err(e) => {
            tracing::error!(
                account_id = %account_id,
                endpoint = %endpoint,
                error = %e,
                "failed to deduct credits"
            );
            METERING_FAILURES.with_label_values(&["decrement"]).inc();
            false
        }
    };

    let record = UsageRecord::now(account_id, endpoint, CREDIT_COST);
    let logged = match usage.append(&record).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(
                account_id = %account_id,
                endpoint = %endpoint,
                error = %e,
                "failed to append usage record"
            );
            METERING_FAILURES.with_label_values(&["usage_log"]).inc();
            false
        }
    };

    MeteringOutcome { debited, logged }
}
