use serde::Serialize;
use tally_core::util;

use crate::commands::common::{open_ledger, resolve_wallet};
use crate::error::CliError;
use crate::profile::ResolvedProfile;

pub fn run_add(
    profile: &ResolvedProfile,
    name: &str,
    currency: &str,
    opening_balance: &str,
) -> Result<(), CliError> {
    let opening_balance = util::parse_amount(opening_balance)?;
    let (ledger, _store) = open_ledger(profile)?;
    let wallet = ledger.create_wallet(name, currency, opening_balance)?;
    println!("{}", wallet.id);
    Ok(())
}

pub fn run_rename(profile: &ResolvedProfile, wallet: &str, name: &str) -> Result<(), CliError> {
    let (ledger, store) = open_ledger(profile)?;
    let wallet = resolve_wallet(&store, wallet)?;
    let renamed = ledger.rename_wallet(wallet.id, name)?;
    println!("{}", renamed.id);
    Ok(())
}

pub fn run_delete(profile: &ResolvedProfile, wallet: &str) -> Result<(), CliError> {
    let (ledger, store) = open_ledger(profile)?;
    let wallet = resolve_wallet(&store, wallet)?;
    ledger.delete_wallet(wallet.id)?;
    println!("{}", wallet.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct WalletListItem {
    id: String,
    name: String,
    currency: String,
    balance_minor: i64,
    balance: String,
}

pub fn run_list(profile: &ResolvedProfile, as_json: bool) -> Result<(), CliError> {
    let (ledger, _store) = open_ledger(profile)?;

    let mut items = Vec::new();
    for wallet in ledger.wallets()? {
        let balance = ledger.wallet_balance(wallet.id)?;
        items.push(WalletListItem {
            id: wallet.id.as_str(),
            name: wallet.name,
            currency: wallet.currency,
            balance_minor: balance,
            balance: util::format_amount(balance),
        });
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for item in &items {
            let short: String = item.id.chars().take(13).collect();
            println!(
                "{short:<13}  {:<20}  {:>14} {}",
                item.name, item.balance, item.currency
            );
        }
    }

    Ok(())
}
