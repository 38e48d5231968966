use std::collections::HashMap;

use serde::Serialize;
use tally_core::models::{Plan, RecordId};
use tally_core::util;

use crate::commands::common::{open_ledger, resolve_record, resolve_wallet};
use crate::error::CliError;
use crate::profile::ResolvedProfile;

pub fn run_add(profile: &ResolvedProfile, title: &str, wallet: &str) -> Result<(), CliError> {
    let (ledger, store) = open_ledger(profile)?;
    let wallet = resolve_wallet(&store, wallet)?;
    let plan = ledger.create_plan(title, wallet.id)?;
    println!("{}", plan.id);
    Ok(())
}

pub fn run_component(
    profile: &ResolvedProfile,
    plan: &str,
    label: &str,
    amount: &str,
) -> Result<(), CliError> {
    let amount = util::parse_amount(amount)?;
    let (ledger, store) = open_ledger(profile)?;
    let plan: Plan = resolve_record(&store, plan, "Plan")?;
    let component = ledger.add_plan_component(plan.id, label, amount)?;
    println!("{}", component.id);
    Ok(())
}

pub fn run_finalize(profile: &ResolvedProfile, plan: &str) -> Result<(), CliError> {
    let (ledger, store) = open_ledger(profile)?;
    let plan: Plan = resolve_record(&store, plan, "Plan")?;
    let booked = ledger.finalize_plan(plan.id)?;
    for tx in &booked {
        println!("{}", tx.id);
    }
    Ok(())
}

pub fn run_settle(
    profile: &ResolvedProfile,
    plan: &str,
    payer: &str,
    amount: &str,
) -> Result<(), CliError> {
    let amount = util::parse_amount(amount)?;
    let (ledger, store) = open_ledger(profile)?;
    let plan: Plan = resolve_record(&store, plan, "Plan")?;
    let settlement = ledger.record_settlement(plan.id, payer, amount)?;
    println!("{}", settlement.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct PlanListItem {
    id: String,
    title: String,
    status: String,
    wallet: String,
    total_minor: i64,
    total: String,
    settled_minor: i64,
    settled: String,
}

pub fn run_list(profile: &ResolvedProfile, as_json: bool) -> Result<(), CliError> {
    let (ledger, _store) = open_ledger(profile)?;

    let wallet_names: HashMap<RecordId, String> = ledger
        .wallets()?
        .into_iter()
        .map(|wallet| (wallet.id, wallet.name))
        .collect();

    let mut items = Vec::new();
    for plan in ledger.plans()? {
        let total: i64 = ledger
            .plan_components(plan.id)?
            .iter()
            .map(|component| component.amount)
            .sum();
        let settled: i64 = ledger
            .settlements(plan.id)?
            .iter()
            .map(|settlement| settlement.amount)
            .sum();
        items.push(PlanListItem {
            id: plan.id.as_str(),
            title: plan.title,
            status: plan.status.as_str().to_string(),
            wallet: wallet_names
                .get(&plan.wallet_id)
                .cloned()
                .unwrap_or_else(|| plan.wallet_id.as_str()),
            total_minor: total,
            total: util::format_amount(total),
            settled_minor: settled,
            settled: util::format_amount(settled),
        });
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for item in &items {
            let short: String = item.id.chars().take(13).collect();
            println!(
                "{short:<13}  {:<24}  {:<9}  {:<16}  {:>12} total  {:>12} settled",
                item.title, item.status, item.wallet, item.total, item.settled
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;
    use tally_core::models::PlanStatus;
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
    fn plan_lifecycle_through_commands() {
        let dir = tempdir().unwrap();
        let profile = test_profile(dir.path().join("tally.db"));
        wallet::run_add(&profile, "Cash", "PHP", "100.00").unwrap();

        run_add(&profile, "Birthday dinner", "Cash").unwrap();

        let (ledger, _store) = open_ledger(&profile).unwrap();
        let plan = ledger.plans().unwrap().remove(0);
        let prefix: String = plan.id.as_str().chars().take(13).collect();

        run_component(&profile, &prefix, "Food", "30.00").unwrap();
        run_component(&profile, &prefix, "Cake", "12.00").unwrap();
        run_finalize(&profile, &prefix).unwrap();

        let plan = ledger.plan(plan.id).unwrap();
        assert_eq!(plan.status, PlanStatus::Finalized);
        assert_eq!(ledger.transactions().unwrap().len(), 2);
        assert_eq!(ledger.wallet_balance(plan.wallet_id).unwrap(), 5_800);

        run_settle(&profile, &prefix, "Bea", "20.00").unwrap();
        assert_eq!(ledger.settlements(plan.id).unwrap().len(), 1);

        // A finalized plan accepts no further components.
        assert!(run_component(&profile, &prefix, "Late", "1.00").is_err());
    }
}
