//! Argument types for the `docunexu-admin` operator CLI.
//!
//! Kept in the library so the parser can be exercised from integration tests.

use clap::{Parser, Subcommand};

use crate::store::sqlite::Plan;

#[derive(Parser, Debug)]
#[command(
    name = "docunexu-admin",
    version,
    about = "Manage DocuNexu accounts, API keys and credits"
)]
pub struct AdminCli {
    /// SQLite database file shared with the gateway.
    #[arg(long, env = "DB_PATH", default_value = "./docunexu.db")]
    pub db_path: String,

    #[command(subcommand)]
    pub command: AdminCommand,
}

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
    /// Create an account on the free plan.
    CreateAccount {
        email: String,
        /// Starting balance instead of the plan default.
        #[arg(value_parser = clap::value_parser!(i64).range(0..))]
        credits: Option<i64>,
    },
    /// Issue a new live API key for an account.
    IssueKey {
        account_id: String,
        #[arg(default_value = "Default")]
        name: String,
    },
    /// List every key of an account, active or not.
    ListKeys { account_id: String },
    /// Deactivate a key. It keeps answering 403 rather than 401.
    RevokeKey { api_key: String },
    /// Overwrite an account's balance.
    SetCredits {
        account_id: String,
        #[arg(value_parser = clap::value_parser!(i64).range(0..))]
        credits: i64,
    },
    /// Move an account to a plan and reset its balance to the plan ceiling.
    SetPlan {
        account_id: String,
        /// free, hobby, basic, personal or business
        #[arg(value_parser = parse_plan)]
        plan: Plan,
    },
    /// Show the balance and most recent usage records.
    Usage {
        account_id: String,
        #[arg(default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..=1000))]
        limit: u32,
    },
}

fn parse_plan(raw: &str) -> Result<Plan, String> {
    raw.parse().map_err(|_| format!("unknown plan '{raw}'"))
}
