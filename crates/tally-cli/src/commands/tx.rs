use std::collections::HashMap;

use serde::Serialize;
use tally_core::models::{RecordId, Transaction};
use tally_core::util;

use crate::commands::common::{
    format_relative_time, open_ledger, resolve_channel, resolve_record, resolve_wallet, short_id,
};
use crate::error::CliError;
use crate::profile::ResolvedProfile;

pub fn run_add(
    profile: &ResolvedProfile,
    wallet: &str,
    amount: &str,
    channel: Option<&str>,
    note: Option<&str>,
) -> Result<(), CliError> {
    let (ledger, store) = open_ledger(profile)?;
    let wallet = resolve_wallet(&store, wallet)?;
    let amount = util::parse_amount(amount)?;

    let mut tx = Transaction::new(wallet.id, amount);
    if let Some(channel) = channel {
        tx = tx.with_channel(resolve_channel(&store, channel)?.id);
    }
    if let Some(note) = note {
        tx = tx.with_note(note);
    }

    let tx = ledger.add_transaction(tx)?;
    println!("{}", tx.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct TxListItem {
    id: String,
    wallet_id: String,
    wallet: String,
    amount_minor: i64,
    amount: String,
    note: Option<String>,
    occurred_at: i64,
}

pub fn run_list(
    profile: &ResolvedProfile,
    limit: usize,
    wallet: Option<&str>,
    as_json: bool,
) -> Result<(), CliError> {
    let (ledger, store) = open_ledger(profile)?;

    let wallet_filter = wallet.map(|query| resolve_wallet(&store, query)).transpose()?;
    let wallet_names: HashMap<RecordId, String> = ledger
        .wallets()?
        .into_iter()
        .map(|wallet| (wallet.id, wallet.name))
        .collect();

    let mut transactions = ledger.transactions()?;
    transactions.sort_by_key(|tx| std::cmp::Reverse(tx.occurred_at));
    let items = transactions
        .into_iter()
        .filter(|tx| wallet_filter.as_ref().is_none_or(|w| tx.wallet_id == w.id))
        .take(limit)
        .map(|tx| TxListItem {
            id: tx.id.as_str(),
            wallet_id: tx.wallet_id.as_str(),
            wallet: wallet_names
                .get(&tx.wallet_id)
                .cloned()
                .unwrap_or_else(|| short_id(tx.wallet_id)),
            amount_minor: tx.amount,
            amount: util::format_amount(tx.amount),
            note: tx.note,
            occurred_at: tx.occurred_at,
        })
        .collect::<Vec<_>>();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        let now_ms = util::unix_timestamp_ms();
        for item in &items {
            let short: String = item.id.chars().take(13).collect();
            println!(
                "{short:<13}  {:>12}  {:<16}  {:<30}  {}",
                item.amount,
                item.wallet,
                item.note.as_deref().unwrap_or(""),
                format_relative_time(item.occurred_at, now_ms)
            );
        }
    }

    Ok(())
}

pub fn run_delete(profile: &ResolvedProfile, id: &str) -> Result<(), CliError> {
    let (ledger, store) = open_ledger(profile)?;
    let tx: Transaction = resolve_record(&store, id, "Transaction")?;
    ledger.delete_transaction(tx.id)?;
    println!("{}", tx.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;
    use crate::commands::wallet;

    fn test_profile(db_path: PathBuf) -> ResolvedProfile {
        ResolvedProfile {
            user_id: "user-1".to_string(),
            device_id: "device-a".to_string(),
            db_path,
            backend_url: None,
            auth_token: None,
        }
    }

    #[test]
    fn run_add_and_delete_round_trip() {
        let dir = tempdir().unwrap();
        let profile = test_profile(dir.path().join("tally.db"));
        wallet::run_add(&profile, "Cash", "PHP", "100.00").unwrap();

        run_add(&profile, "Cash", "-12.50", None, Some("jeepney")).unwrap();

        let (ledger, store) = open_ledger(&profile).unwrap();
        let wallet = resolve_wallet(&store, "Cash").unwrap();
        assert_eq!(ledger.wallet_balance(wallet.id).unwrap(), 8_750);

        let tx = ledger.transactions().unwrap().remove(0);
        assert_eq!(tx.note.as_deref(), Some("jeepney"));

        let prefix: String = tx.id.as_str().chars().take(13).collect();
        run_delete(&profile, &prefix).unwrap();
        assert_eq!(ledger.transactions().unwrap().len(), 0);
        assert_eq!(ledger.wallet_balance(wallet.id).unwrap(), 10_000);
    }

    #[test]
    fn run_add_rejects_unknown_wallet_and_channel() {
        let dir = tempdir().unwrap();
        let profile = test_profile(dir.path().join("tally.db"));
        wallet::run_add(&profile, "Cash", "PHP", "0").unwrap();

        assert!(matches!(
            run_add(&profile, "Savings", "-5.00", None, None),
            Err(CliError::RecordNotFound { .. })
        ));
        assert!(matches!(
            run_add(&profile, "Cash", "-5.00", Some("GCash"), None),
            Err(CliError::RecordNotFound { .. })
        ));
    }
}
