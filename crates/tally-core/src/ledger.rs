//! Domain operations over the store
//!
//! [`Ledger`] is what applications call: it validates cross-record rules
//! (a transaction needs its wallet, a plan finalizes once) and leaves
//! stamping, outbox bookkeeping, and sync entirely to the store layer.

use std::sync::Arc;

use crate::db::Store;
use crate::error::{Error, Result};
use crate::models::{
    Channel, Commitment, CommitmentDirection, Plan, PlanComponent, PlanStatus, RecordId,
    Settlement, Transaction, UserSettings, Wallet,
};
use crate::util;

/// High-level interface to the local ledger
#[derive(Clone)]
pub struct Ledger {
    store: Arc<Store>,
}

impl Ledger {
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    // ---- wallets ----

    pub fn create_wallet(
        &self,
        name: &str,
        currency: &str,
        opening_balance: i64,
    ) -> Result<Wallet> {
        let name = util::normalize_text(name)
            .ok_or_else(|| Error::InvalidInput("Wallet name cannot be empty".to_string()))?;
        let currency = util::normalize_text(currency)
            .ok_or_else(|| Error::InvalidInput("Currency cannot be empty".to_string()))?;

        let mut wallet = Wallet::new(name, currency.to_uppercase(), opening_balance);
        self.store.create(&mut wallet)?;
        Ok(wallet)
    }

    pub fn wallets(&self) -> Result<Vec<Wallet>> {
        self.store.list()
    }

    pub fn wallet(&self, id: RecordId) -> Result<Wallet> {
        self.store
            .get(id)?
            .ok_or_else(|| Error::NotFound(format!("wallet {id}")))
    }

    pub fn rename_wallet(&self, id: RecordId, name: &str) -> Result<Wallet> {
        let name = util::normalize_text(name)
            .ok_or_else(|| Error::InvalidInput("Wallet name cannot be empty".to_string()))?;
        let mut wallet = self.wallet(id)?;
        wallet.name = name;
        self.store.update(&mut wallet)?;
        Ok(wallet)
    }

    pub fn delete_wallet(&self, id: RecordId) -> Result<()> {
        self.store.soft_delete::<Wallet>(id)
    }

    /// Opening balance plus every live transaction against the wallet
    pub fn wallet_balance(&self, id: RecordId) -> Result<i64> {
        let wallet = self.wallet(id)?;
        let movement: i64 = self
            .store
            .list::<Transaction>()?
            .iter()
            .filter(|tx| tx.wallet_id == id)
            .map(|tx| tx.amount)
            .sum();
        Ok(wallet.opening_balance + movement)
    }

    // ---- channels ----

    pub fn create_channel(&self, name: &str, kind: &str) -> Result<Channel> {
        let name = util::normalize_text(name)
            .ok_or_else(|| Error::InvalidInput("Channel name cannot be empty".to_string()))?;
        let kind = util::normalize_text(kind)
            .ok_or_else(|| Error::InvalidInput("Channel kind cannot be empty".to_string()))?;

        let mut channel = Channel::new(name, kind);
        self.store.create(&mut channel)?;
        Ok(channel)
    }

    pub fn channels(&self) -> Result<Vec<Channel>> {
        self.store.list()
    }

    pub fn delete_channel(&self, id: RecordId) -> Result<()> {
        self.store.soft_delete::<Channel>(id)
    }

    // ---- transactions ----

    /// Record a transaction after checking its references
    pub fn add_transaction(&self, mut tx: Transaction) -> Result<Transaction> {
        if tx.amount == 0 {
            return Err(Error::InvalidInput(
                "Transaction amount cannot be zero".to_string(),
            ));
        }
        if self.store.get::<Wallet>(tx.wallet_id)?.is_none() {
            return Err(Error::NotFound(format!("wallet {}", tx.wallet_id)));
        }
        if let Some(channel_id) = tx.channel_id {
            if self.store.get::<Channel>(channel_id)?.is_none() {
                return Err(Error::NotFound(format!("channel {channel_id}")));
            }
        }

        self.store.create(&mut tx)?;
        Ok(tx)
    }

    pub fn transactions(&self) -> Result<Vec<Transaction>> {
        self.store.list()
    }

    pub fn delete_transaction(&self, id: RecordId) -> Result<()> {
        self.store.soft_delete::<Transaction>(id)
    }

    // ---- commitments ----

    pub fn add_commitment(
        &self,
        counterparty: &str,
        amount: i64,
        direction: CommitmentDirection,
        due_at: Option<i64>,
    ) -> Result<Commitment> {
        let counterparty = util::normalize_text(counterparty)
            .ok_or_else(|| Error::InvalidInput("Counterparty cannot be empty".to_string()))?;
        if amount <= 0 {
            return Err(Error::InvalidInput(
                "Commitment amount must be positive".to_string(),
            ));
        }

        let mut commitment = Commitment::new(counterparty, amount, direction);
        if let Some(due_at) = due_at {
            commitment = commitment.with_due_at(due_at);
        }
        self.store.create(&mut commitment)?;
        Ok(commitment)
    }

    pub fn commitments(&self) -> Result<Vec<Commitment>> {
        self.store.list()
    }

    /// Mark a commitment settled; settling twice is an error
    pub fn settle_commitment(&self, id: RecordId) -> Result<Commitment> {
        let mut commitment: Commitment = self
            .store
            .get(id)?
            .ok_or_else(|| Error::NotFound(format!("commitment {id}")))?;
        if commitment.settled {
            return Err(Error::InvalidInput(format!(
                "Commitment {id} is already settled"
            )));
        }

        commitment.settled = true;
        commitment.settled_at = Some(util::unix_timestamp_ms());
        self.store.update(&mut commitment)?;
        Ok(commitment)
    }

    // ---- plans ----

    pub fn create_plan(&self, title: &str, wallet_id: RecordId) -> Result<Plan> {
        let title = util::normalize_text(title)
            .ok_or_else(|| Error::InvalidInput("Plan title cannot be empty".to_string()))?;
        if self.store.get::<Wallet>(wallet_id)?.is_none() {
            return Err(Error::NotFound(format!("wallet {wallet_id}")));
        }

        let mut plan = Plan::new(title, wallet_id);
        self.store.create(&mut plan)?;
        Ok(plan)
    }

    pub fn plans(&self) -> Result<Vec<Plan>> {
        self.store.list()
    }

    pub fn plan(&self, id: RecordId) -> Result<Plan> {
        self.store
            .get(id)?
            .ok_or_else(|| Error::NotFound(format!("plan {id}")))
    }

    /// Add a component to a draft plan
    pub fn add_plan_component(
        &self,
        plan_id: RecordId,
        label: &str,
        amount: i64,
    ) -> Result<PlanComponent> {
        let label = util::normalize_text(label)
            .ok_or_else(|| Error::InvalidInput("Component label cannot be empty".to_string()))?;
        if amount <= 0 {
            return Err(Error::InvalidInput(
                "Component amount must be positive".to_string(),
            ));
        }
        let plan = self.plan(plan_id)?;
        if plan.status != PlanStatus::Draft {
            return Err(Error::InvalidInput(format!(
                "Plan {plan_id} is already finalized"
            )));
        }

        let mut component = PlanComponent::new(plan_id, label, amount);
        self.store.create(&mut component)?;
        Ok(component)
    }

    pub fn plan_components(&self, plan_id: RecordId) -> Result<Vec<PlanComponent>> {
        let mut components: Vec<PlanComponent> = self
            .store
            .list()?
            .into_iter()
            .filter(|component: &PlanComponent| component.plan_id == plan_id)
            .collect();
        components.sort_by_key(|component| component.id.as_str());
        Ok(components)
    }

    /// Turn a draft plan into booked transactions, atomically
    ///
    /// One expense transaction per component lands against the plan's
    /// wallet and the plan flips to finalized, all in a single local
    /// transaction; either every row is written and queued or none is.
    pub fn finalize_plan(&self, plan_id: RecordId) -> Result<Vec<Transaction>> {
        self.store.batch(|batch| {
            let mut plan: Plan = batch
                .get(plan_id)?
                .ok_or_else(|| Error::NotFound(format!("plan {plan_id}")))?;
            if plan.status != PlanStatus::Draft {
                return Err(Error::InvalidInput(format!(
                    "Plan {plan_id} is already finalized"
                )));
            }
            if batch.get::<Wallet>(plan.wallet_id)?.is_none() {
                return Err(Error::NotFound(format!("wallet {}", plan.wallet_id)));
            }

            let components: Vec<PlanComponent> = batch
                .list()?
                .into_iter()
                .filter(|component: &PlanComponent| component.plan_id == plan_id)
                .collect();
            if components.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "Plan {plan_id} has no components to finalize"
                )));
            }

            let mut booked = Vec::with_capacity(components.len());
            for component in &components {
                let mut tx = Transaction::new(plan.wallet_id, -component.amount)
                    .with_note(component.label.clone())
                    .for_plan(plan_id);
                batch.create(&mut tx)?;
                booked.push(tx);
            }

            plan.status = PlanStatus::Finalized;
            batch.update(&mut plan)?;
            Ok(booked)
        })
    }

    /// Record who paid what against a finalized plan
    pub fn record_settlement(
        &self,
        plan_id: RecordId,
        payer: &str,
        amount: i64,
    ) -> Result<Settlement> {
        let payer = util::normalize_text(payer)
            .ok_or_else(|| Error::InvalidInput("Payer cannot be empty".to_string()))?;
        if amount <= 0 {
            return Err(Error::InvalidInput(
                "Settlement amount must be positive".to_string(),
            ));
        }
        let plan = self.plan(plan_id)?;
        if plan.status != PlanStatus::Finalized {
            return Err(Error::InvalidInput(format!(
                "Plan {plan_id} must be finalized before settling"
            )));
        }

        let mut settlement = Settlement::new(plan_id, payer, amount);
        self.store.create(&mut settlement)?;
        Ok(settlement)
    }

    pub fn settlements(&self, plan_id: RecordId) -> Result<Vec<Settlement>> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|settlement: &Settlement| settlement.plan_id == plan_id)
            .collect())
    }

    // ---- settings ----

    /// The user's settings row, if one has been written yet
    pub fn settings(&self) -> Result<Option<UserSettings>> {
        Ok(self.store.list()?.into_iter().next())
    }

    /// Create or update the user's settings
    pub fn save_settings(&self, currency: &str, month_start_day: i64) -> Result<UserSettings> {
        let currency = util::normalize_text(currency)
            .ok_or_else(|| Error::InvalidInput("Currency cannot be empty".to_string()))?;
        if !(1..=28).contains(&month_start_day) {
            return Err(Error::InvalidInput(
                "Month start day must be between 1 and 28".to_string(),
            ));
        }

        match self.settings()? {
            Some(mut settings) => {
                settings.currency = currency.to_uppercase();
                settings.month_start_day = month_start_day;
                self.store.update(&mut settings)?;
                Ok(settings)
            }
            None => {
                let mut settings = UserSettings::new(currency.to_uppercase(), month_start_day);
                self.store.create(&mut settings)?;
                Ok(settings)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DeviceIdentity;
    use crate::sync::StatusPublisher;
    use pretty_assertions::assert_eq;

    fn setup() -> Ledger {
        let store = Store::open_in_memory(
            DeviceIdentity::new("user-1", "device-a"),
            StatusPublisher::new("user-1"),
        )
        .unwrap();
        Ledger::new(Arc::new(store))
    }

    #[test]
    fn test_create_wallet_normalizes_input() {
        let ledger = setup();
        let wallet = ledger.create_wallet("  Cash  ", "php", 10_000).unwrap();
        assert_eq!(wallet.name, "Cash");
        assert_eq!(wallet.currency, "PHP");

        assert!(matches!(
            ledger.create_wallet("   ", "PHP", 0),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_transaction_requires_live_references() {
        let ledger = setup();
        let wallet = ledger.create_wallet("Cash", "PHP", 0).unwrap();

        let orphan = Transaction::new(RecordId::new(), -100);
        assert!(matches!(
            ledger.add_transaction(orphan),
            Err(Error::NotFound(_))
        ));

        let zero = Transaction::new(wallet.id, 0);
        assert!(matches!(
            ledger.add_transaction(zero),
            Err(Error::InvalidInput(_))
        ));

        let ghost_channel = Transaction::new(wallet.id, -100).with_channel(RecordId::new());
        assert!(matches!(
            ledger.add_transaction(ghost_channel),
            Err(Error::NotFound(_))
        ));

        let ok = Transaction::new(wallet.id, -100).with_note("coffee");
        let tx = ledger.add_transaction(ok).unwrap();
        assert_eq!(tx.meta.version, 1);
    }

    #[test]
    fn test_wallet_balance_sums_movement() {
        let ledger = setup();
        let wallet = ledger.create_wallet("Cash", "PHP", 10_000).unwrap();
        ledger
            .add_transaction(Transaction::new(wallet.id, -2_500))
            .unwrap();
        ledger
            .add_transaction(Transaction::new(wallet.id, 1_000))
            .unwrap();

        let other = ledger.create_wallet("Bank", "PHP", 0).unwrap();
        ledger
            .add_transaction(Transaction::new(other.id, -999))
            .unwrap();

        assert_eq!(ledger.wallet_balance(wallet.id).unwrap(), 8_500);
        assert_eq!(ledger.wallet_balance(other.id).unwrap(), -999);
    }

    #[test]
    fn test_settle_commitment_once() {
        let ledger = setup();
        let commitment = ledger
            .add_commitment("Alice", 1_000, CommitmentDirection::Owed, None)
            .unwrap();

        let settled = ledger.settle_commitment(commitment.id).unwrap();
        assert!(settled.settled);
        assert!(settled.settled_at.is_some());
        assert_eq!(settled.meta.version, 2);

        assert!(matches!(
            ledger.settle_commitment(commitment.id),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_finalize_plan_books_components_atomically() {
        let ledger = setup();
        let wallet = ledger.create_wallet("Cash", "PHP", 10_000).unwrap();
        let plan = ledger.create_plan("Birthday dinner", wallet.id).unwrap();
        ledger.add_plan_component(plan.id, "Food", 3_000).unwrap();
        ledger.add_plan_component(plan.id, "Cake", 1_200).unwrap();

        let pending_before = ledger.store.pending_count().unwrap();
        let booked = ledger.finalize_plan(plan.id).unwrap();

        // Two transactions plus the plan update, in one batch.
        assert_eq!(booked.len(), 2);
        assert_eq!(
            ledger.store.pending_count().unwrap(),
            pending_before + 3
        );

        let plan = ledger.plan(plan.id).unwrap();
        assert_eq!(plan.status, PlanStatus::Finalized);
        assert_eq!(ledger.wallet_balance(wallet.id).unwrap(), 5_800);
        assert!(booked.iter().all(|tx| tx.plan_id == Some(plan.id)));
    }

    #[test]
    fn test_finalize_rolls_back_when_validation_fails() {
        let ledger = setup();
        let wallet = ledger.create_wallet("Cash", "PHP", 10_000).unwrap();
        let plan = ledger.create_plan("Trip", wallet.id).unwrap();
        ledger.add_plan_component(plan.id, "Fuel", 2_000).unwrap();

        // The wallet disappears before finalization.
        ledger.delete_wallet(wallet.id).unwrap();
        let pending_before = ledger.store.pending_count().unwrap();

        assert!(matches!(
            ledger.finalize_plan(plan.id),
            Err(Error::NotFound(_))
        ));

        assert_eq!(ledger.store.pending_count().unwrap(), pending_before);
        assert_eq!(ledger.transactions().unwrap().len(), 0);
        assert_eq!(ledger.plan(plan.id).unwrap().status, PlanStatus::Draft);
    }

    #[test]
    fn test_finalize_requires_draft_with_components() {
        let ledger = setup();
        let wallet = ledger.create_wallet("Cash", "PHP", 0).unwrap();
        let empty = ledger.create_plan("Empty", wallet.id).unwrap();
        assert!(matches!(
            ledger.finalize_plan(empty.id),
            Err(Error::InvalidInput(_))
        ));

        ledger.add_plan_component(empty.id, "Thing", 100).unwrap();
        ledger.finalize_plan(empty.id).unwrap();
        assert!(matches!(
            ledger.finalize_plan(empty.id),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            ledger.add_plan_component(empty.id, "Late", 50),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_settlements_only_against_finalized_plans() {
        let ledger = setup();
        let wallet = ledger.create_wallet("Cash", "PHP", 0).unwrap();
        let plan = ledger.create_plan("Dinner", wallet.id).unwrap();

        assert!(matches!(
            ledger.record_settlement(plan.id, "Bea", 500),
            Err(Error::InvalidInput(_))
        ));

        ledger.add_plan_component(plan.id, "Food", 1_000).unwrap();
        ledger.finalize_plan(plan.id).unwrap();

        let settlement = ledger.record_settlement(plan.id, "Bea", 500).unwrap();
        assert_eq!(settlement.amount, 500);
        assert_eq!(ledger.settlements(plan.id).unwrap().len(), 1);
    }

    #[test]
    fn test_save_settings_upserts_single_row() {
        let ledger = setup();
        assert_eq!(ledger.settings().unwrap(), None);

        let created = ledger.save_settings("php", 1).unwrap();
        assert_eq!(created.currency, "PHP");
        assert_eq!(created.meta.version, 1);

        let updated = ledger.save_settings("usd", 15).unwrap();
        assert_eq!(updated.currency, "USD");
        assert_eq!(updated.meta.version, 2);
        assert_eq!(updated.id, created.id);

        assert!(matches!(
            ledger.save_settings("usd", 31),
            Err(Error::InvalidInput(_))
        ));
    }
}
