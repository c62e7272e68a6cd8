//! Argument parsing for `docunexu-admin`.

use clap::Parser;

use docunexu_gateway::cli::{AdminCli, AdminCommand};
use docunexu_gateway::store::sqlite::Plan;

fn parse(args: &[&str]) -> Result<AdminCli, clap::Error> {
    AdminCli::try_parse_from(args)
}

#[test]
fn test_create_account_with_optional_credits() {
    let cli = parse(&["docunexu-admin", "create-account", "dev@example.com"]).unwrap();
    match cli.command {
        AdminCommand::CreateAccount { email, credits } => {
            assert_eq!(email, "dev@example.com");
            assert!(credits.is_none());
        }
        other => panic!("expected CreateAccount, got {other:?}"),
    }

    let cli = parse(&["docunexu-admin", "create-account", "dev@example.com", "500"]).unwrap();
    assert!(matches!(
        cli.command,
        AdminCommand::CreateAccount {
            credits: Some(500),
            ..
        }
    ));
}

#[test]
fn test_issue_key_default_name() {
    let cli = parse(&["docunexu-admin", "issue-key", "acct-1"]).unwrap();
    match cli.command {
        AdminCommand::IssueKey { account_id, name } => {
            assert_eq!(account_id, "acct-1");
            assert_eq!(name, "Default");
        }
        other => panic!("expected IssueKey, got {other:?}"),
    }
}

#[test]
fn test_set_plan_is_case_insensitive() {
    let cli = parse(&["docunexu-admin", "set-plan", "acct-1", "Business"]).unwrap();
    assert!(matches!(
        cli.command,
        AdminCommand::SetPlan {
            plan: Plan::Business,
            ..
        }
    ));

    assert!(parse(&["docunexu-admin", "set-plan", "acct-1", "platinum"]).is_err());
}

#[test]
fn test_usage_limit_defaults_and_bounds() {
    let cli = parse(&["docunexu-admin", "usage", "acct-1"]).unwrap();
    assert!(matches!(cli.command, AdminCommand::Usage { limit: 20, .. }));

    let cli = parse(&["docunexu-admin", "usage", "acct-1", "50"]).unwrap();
    assert!(matches!(cli.command, AdminCommand::Usage { limit: 50, .. }));

    assert!(parse(&["docunexu-admin", "usage", "acct-1", "0"]).is_err());
    assert!(parse(&["docunexu-admin", "usage", "acct-1", "lots"]).is_err());
}

#[test]
fn test_set_credits_requires_a_number() {
    let cli = parse(&["docunexu-admin", "set-credits", "acct-1", "250"]).unwrap();
    assert!(matches!(
        cli.command,
        AdminCommand::SetCredits { credits: 250, .. }
    ));

    assert!(parse(&["docunexu-admin", "set-credits", "acct-1"]).is_err());
    assert!(parse(&["docunexu-admin", "set-credits", "acct-1", "ten"]).is_err());
}

#[test]
fn test_db_path_flag() {
    let cli = parse(&[
        "docunexu-admin",
        "--db-path",
        "/tmp/docunexu-test.db",
        "list-keys",
        "acct-1",
    ])
    .unwrap();
    assert_eq!(cli.db_path, "/tmp/docunexu-test.db");
    assert!(matches!(cli.command, AdminCommand::ListKeys { .. }));
}

#[test]
fn test_unknown_or_missing_subcommand() {
    assert!(parse(&["docunexu-admin"]).is_err());
    assert!(parse(&["docunexu-admin", "delete-everything"]).is_err());
    assert!(parse(&["docunexu-admin", "revoke-key"]).is_err());
}
