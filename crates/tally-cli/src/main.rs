//! Tally CLI - track your money from the terminal
//!
//! Every command works offline against the local store; `tally sync`
//! reconciles with the configured backend when you have a connection.

mod cli;
mod commands;
mod error;
mod profile;

use clap::Parser;

use crate::cli::{
    ChannelCommand, Cli, Commands, CommitCommand, ConfigCommand, PlanCommand, TxCommand,
    WalletCommand,
};
use crate::error::CliError;
use crate::profile::{default_profile_path, Profile, ResolvedProfile};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tally_core=info".parse().unwrap())
                .add_directive("tally_cli=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Wallet(command) => {
            let profile = resolve_profile(cli.db_path)?;
            match command {
                WalletCommand::Add {
                    name,
                    currency,
                    opening_balance,
                } => commands::wallet::run_add(&profile, &name, &currency, &opening_balance)?,
                WalletCommand::List { json } => commands::wallet::run_list(&profile, json)?,
                WalletCommand::Rename { wallet, name } => {
                    commands::wallet::run_rename(&profile, &wallet, &name)?;
                }
                WalletCommand::Delete { wallet } => {
                    commands::wallet::run_delete(&profile, &wallet)?;
                }
            }
        }
        Commands::Channel(command) => {
            let profile = resolve_profile(cli.db_path)?;
            match command {
                ChannelCommand::Add { name, kind } => {
                    commands::channel::run_add(&profile, &name, &kind)?;
                }
                ChannelCommand::List { json } => commands::channel::run_list(&profile, json)?,
                ChannelCommand::Delete { channel } => {
                    commands::channel::run_delete(&profile, &channel)?;
                }
            }
        }
        Commands::Tx(command) => {
            let profile = resolve_profile(cli.db_path)?;
            match command {
                TxCommand::Add {
                    wallet,
                    amount,
                    channel,
                    note,
                } => commands::tx::run_add(
                    &profile,
                    &wallet,
                    &amount,
                    channel.as_deref(),
                    note.as_deref(),
                )?,
                TxCommand::List {
                    limit,
                    wallet,
                    json,
                } => commands::tx::run_list(&profile, limit, wallet.as_deref(), json)?,
                TxCommand::Delete { id } => commands::tx::run_delete(&profile, &id)?,
            }
        }
        Commands::Commit(command) => {
            let profile = resolve_profile(cli.db_path)?;
            match command {
                CommitCommand::Add {
                    counterparty,
                    amount,
                    direction,
                    due,
                } => commands::commit::run_add(
                    &profile,
                    &counterparty,
                    &amount,
                    direction,
                    due.as_deref(),
                )?,
                CommitCommand::Settle { id } => commands::commit::run_settle(&profile, &id)?,
                CommitCommand::List { all, json } => {
                    commands::commit::run_list(&profile, all, json)?;
                }
            }
        }
        Commands::Plan(command) => {
            let profile = resolve_profile(cli.db_path)?;
            match command {
                PlanCommand::Add { title, wallet } => {
                    commands::plan::run_add(&profile, &title, &wallet)?;
                }
                PlanCommand::Component {
                    plan,
                    label,
                    amount,
                } => commands::plan::run_component(&profile, &plan, &label, &amount)?,
                PlanCommand::Finalize { plan } => commands::plan::run_finalize(&profile, &plan)?,
                PlanCommand::Settle {
                    plan,
                    payer,
                    amount,
                } => commands::plan::run_settle(&profile, &plan, &payer, &amount)?,
                PlanCommand::List { json } => commands::plan::run_list(&profile, json)?,
            }
        }
        Commands::Sync { force_pull, global } => {
            let profile = resolve_profile(cli.db_path)?;
            commands::sync::run_sync(&profile, force_pull, global).await?;
        }
        Commands::Status { json, watch } => {
            let profile = resolve_profile(cli.db_path)?;
            commands::status::run_status(&profile, json, watch).await?;
        }
        Commands::Config(command) => match command {
            ConfigCommand::Init {
                backend_url,
                user,
                token,
                db_path,
            } => commands::config::run_init(backend_url, user, token, db_path)?,
            ConfigCommand::Show => commands::config::run_show()?,
        },
        Commands::Completions { shell, output } => {
            commands::completions::run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}

fn resolve_profile(cli_db_path: Option<std::path::PathBuf>) -> Result<ResolvedProfile, CliError> {
    let path = default_profile_path();
    Profile::load(&path)?.resolve(&path, cli_db_path)
}
