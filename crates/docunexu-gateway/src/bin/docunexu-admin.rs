//! Operator CLI for the SQLite account database.
//!
//! ```text
//! docunexu-admin create-account dev@example.com
//! docunexu-admin issue-key <account_id> "CI"
//! docunexu-admin set-plan <account_id> basic
//! docunexu-admin --db-path /var/lib/docunexu.db usage <account_id> 50
//! ```

use clap::Parser;

use docunexu_gateway::cli::{AdminCli, AdminCommand};
use docunexu_gateway::store::{BalanceStore, SqliteStore, StoreError, UsageLog};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = AdminCli::parse();
    let store = SqliteStore::open(&cli.db_path).expect("failed to open database");

    if let Err(e) = run(&store, cli.command).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(store: &SqliteStore, command: AdminCommand) -> Result<(), StoreError> {
    match command {
        AdminCommand::CreateAccount { email, credits } => {
            let account = store.create_account(&email)?;
            if let Some(credits) = credits {
                store.set_credits(&account.id, credits)?;
            }
            let account = store
                .get_account(&account.id)?
                .ok_or_else(|| StoreError::NotFound(account.id.clone()))?;
            println!("Created account {}", account.id);
            println!("  Email:   {}", account.email);
            println!("  Plan:    {}", account.plan);
            println!("  Credits: {}/{}", account.credits, account.credit_limit);
        }
        AdminCommand::IssueKey { account_id, name } => {
            let key = store.issue_key(&account_id, &name)?;
            println!("Issued key '{}' for {}", key.key_name, key.user_id);
            println!("  {}", key.api_key);
        }
        AdminCommand::ListKeys { account_id } => {
            for key in store.list_keys(&account_id)? {
                println!(
                    "{}  {:<20} {}",
                    if key.is_active { "active " } else { "revoked" },
                    key.key_name,
                    key.api_key
                );
            }
        }
        AdminCommand::RevokeKey { api_key } => {
            store.revoke_key(&api_key)?;
            println!("Key revoked");
        }
        AdminCommand::SetCredits {
            account_id,
            credits,
        } => {
            store.set_credits(&account_id, credits)?;
            print_balance(store, &account_id).await?;
        }
        AdminCommand::SetPlan { account_id, plan } => {
            store.set_plan(&account_id, plan)?;
            println!("Plan set to {}", plan.as_str());
            print_balance(store, &account_id).await?;
        }
        AdminCommand::Usage { account_id, limit } => {
            print_balance(store, &account_id).await?;
            for record in store.recent(&account_id, limit).await? {
                let when = chrono::DateTime::from_timestamp(record.created_at, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default();
                println!("{when}  {:>3}  {}", record.credits_used, record.endpoint);
            }
        }
    }

    Ok(())
}

async fn print_balance(store: &SqliteStore, account_id: &str) -> Result<(), StoreError> {
    let balance = store
        .balance(account_id)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("account {account_id}")))?;
    println!("Credits: {}/{}", balance.credits, balance.credit_limit);
    Ok(())
}
