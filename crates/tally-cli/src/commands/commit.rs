use serde::Serialize;
use tally_core::models::{Commitment, CommitmentDirection};
use tally_core::util;

use crate::cli::DirectionArg;
use crate::commands::common::{format_date, open_ledger, parse_due_date, resolve_record};
use crate::error::CliError;
use crate::profile::ResolvedProfile;

pub fn run_add(
    profile: &ResolvedProfile,
    counterparty: &str,
    amount: &str,
    direction: DirectionArg,
    due: Option<&str>,
) -> Result<(), CliError> {
    let amount = util::parse_amount(amount)?;
    let due_at = due.map(parse_due_date).transpose()?;
    let direction = match direction {
        DirectionArg::Owed => CommitmentDirection::Owed,
        DirectionArg::Owing => CommitmentDirection::Owing,
    };

    let (ledger, _store) = open_ledger(profile)?;
    let commitment = ledger.add_commitment(counterparty, amount, direction, due_at)?;
    println!("{}", commitment.id);
    Ok(())
}

pub fn run_settle(profile: &ResolvedProfile, id: &str) -> Result<(), CliError> {
    let (ledger, store) = open_ledger(profile)?;
    let commitment: Commitment = resolve_record(&store, id, "Commitment")?;
    let settled = ledger.settle_commitment(commitment.id)?;
    println!("{}", settled.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct CommitListItem {
    id: String,
    counterparty: String,
    direction: String,
    amount_minor: i64,
    amount: String,
    due_at: Option<i64>,
    settled: bool,
}

pub fn run_list(profile: &ResolvedProfile, all: bool, as_json: bool) -> Result<(), CliError> {
    let (ledger, _store) = open_ledger(profile)?;
    let items = ledger
        .commitments()?
        .into_iter()
        .filter(|commitment| all || !commitment.settled)
        .map(|commitment| CommitListItem {
            id: commitment.id.as_str(),
            counterparty: commitment.counterparty,
            direction: commitment.direction.as_str().to_string(),
            amount_minor: commitment.amount,
            amount: util::format_amount(commitment.amount),
            due_at: commitment.due_at,
            settled: commitment.settled,
        })
        .collect::<Vec<_>>();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for item in &items {
            let short: String = item.id.chars().take(13).collect();
            let due = item.due_at.map_or_else(|| "-".to_string(), format_date);
            let state = if item.settled { "settled" } else { "open" };
            println!(
                "{short:<13}  {:<6}  {:<20}  {:>12}  due {due:<12}  {state}",
                item.direction, item.counterparty, item.amount
            );
        }
    }

    Ok(())
}
