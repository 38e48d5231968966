//! Multi-device sync scenarios
//!
//! Each test wires several stores to one shared in-memory backend and
//! drives full cycles, checking that every replica settles on the same
//! rows no matter who syncs first.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::db::{Clock, DeviceIdentity, Store};
use crate::ledger::Ledger;
use crate::models::{
    Commitment, CommitmentDirection, Entity, Transaction, Wallet,
};
use crate::sync::{
    MemoryBackend, NetworkMonitor, RemoteBackend, StatusPublisher, SyncDispatcher, SyncReport,
};

struct Device {
    store: Arc<Store>,
    dispatcher: SyncDispatcher,
    clock: Arc<AtomicI64>,
}

fn device(backend: &Arc<MemoryBackend>, user: &str, device_id: &str, t0: i64) -> Device {
    let status = StatusPublisher::new(user);
    let clock = Arc::new(AtomicI64::new(t0));
    let store = Arc::new(
        Store::open_in_memory_with_clock(
            DeviceIdentity::new(user, device_id),
            status.clone(),
            Clock::Fixed(Arc::clone(&clock)),
        )
        .unwrap(),
    );
    let monitor = NetworkMonitor::new(status.clone(), Duration::ZERO);
    let dispatcher = SyncDispatcher::new(
        Arc::clone(&store),
        Arc::clone(backend) as Arc<dyn RemoteBackend>,
        monitor,
        status,
    );
    Device {
        store,
        dispatcher,
        clock,
    }
}

impl Device {
    fn set_time(&self, at: i64) {
        self.clock.store(at, Ordering::SeqCst);
    }

    async fn sync(&self) -> SyncReport {
        self.dispatcher.sync().await.unwrap().unwrap()
    }
}

#[tokio::test]
async fn test_two_devices_converge_on_later_equal_version_write() {
    let backend = Arc::new(MemoryBackend::new());
    let a = device(&backend, "user-1", "device-a", 1_000);
    let b = device(&backend, "user-1", "device-b", 1_000);

    let mut wallet = Wallet::new("Cash", "PHP", 100);
    a.store.create(&mut wallet).unwrap();
    a.sync().await;
    b.sync().await;
    let on_b: Wallet = b.store.get(wallet.id).unwrap().unwrap();
    assert_eq!(on_b.opening_balance, 100);

    // Concurrent offline edits to the same base version: 500 at t=10s on
    // one device, 700 at t=12s on the other.
    b.set_time(10_000);
    let mut edit_b: Wallet = b.store.get(wallet.id).unwrap().unwrap();
    edit_b.opening_balance = 500;
    b.store.update(&mut edit_b).unwrap();

    a.set_time(12_000);
    let mut edit_a: Wallet = a.store.get(wallet.id).unwrap().unwrap();
    edit_a.opening_balance = 700;
    a.store.update(&mut edit_a).unwrap();

    a.sync().await;
    b.sync().await;
    a.sync().await;

    let final_a: Wallet = a.store.get(wallet.id).unwrap().unwrap();
    let final_b: Wallet = b.store.get(wallet.id).unwrap().unwrap();
    assert_eq!(final_a.opening_balance, 700);
    assert_eq!(final_b, final_a);

    let server = backend.record(Entity::Wallet, wallet.id).unwrap();
    assert_eq!(server.payload["opening_balance"], 700);
    assert_eq!(server.meta, final_a.meta);

    assert_eq!(a.store.pending_count().unwrap(), 0);
    assert_eq!(b.store.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn test_convergence_holds_for_either_reconnect_order_and_replayed_pulls() {
    for winner_first in [false, true] {
        let backend = Arc::new(MemoryBackend::new());
        let a = device(&backend, "user-1", "device-a", 1_000);
        let b = device(&backend, "user-1", "device-b", 1_000);

        let mut wallet = Wallet::new("Cash", "PHP", 100);
        a.store.create(&mut wallet).unwrap();
        a.sync().await;
        b.sync().await;

        // Concurrent offline edits to the same base version.
        a.set_time(10_000);
        let mut edit_a: Wallet = a.store.get(wallet.id).unwrap().unwrap();
        edit_a.opening_balance = 500;
        a.store.update(&mut edit_a).unwrap();

        b.set_time(12_000);
        let mut edit_b: Wallet = b.store.get(wallet.id).unwrap().unwrap();
        edit_b.opening_balance = 700;
        b.store.update(&mut edit_b).unwrap();

        if winner_first {
            b.sync().await;
            a.sync().await;
            b.sync().await;
        } else {
            a.sync().await;
            b.sync().await;
            a.sync().await;
        }

        let settled_a: Wallet = a.store.get(wallet.id).unwrap().unwrap();
        let settled_b: Wallet = b.store.get(wallet.id).unwrap().unwrap();
        assert_eq!(settled_a.opening_balance, 700, "winner_first={winner_first}");
        assert_eq!(settled_b, settled_a);

        // Re-applying the full remote state twice changes nothing.
        for _ in 0..2 {
            let report = a.dispatcher.force_pull().await.unwrap();
            assert_eq!(report.applied, 0);
        }
        let after: Wallet = a.store.get(wallet.id).unwrap().unwrap();
        assert_eq!(after, settled_a);
        assert_eq!(a.store.pending_count().unwrap(), 0);
        assert_eq!(b.store.pending_count().unwrap(), 0);
    }
}

#[tokio::test]
async fn test_delete_propagates_and_recreate_resurrects() {
    let backend = Arc::new(MemoryBackend::new());
    let a = device(&backend, "user-1", "device-a", 1_000);
    let b = device(&backend, "user-1", "device-b", 1_000);

    let mut wallet = Wallet::new("Cash", "PHP", 100);
    a.store.create(&mut wallet).unwrap();
    a.sync().await;
    b.sync().await;

    a.set_time(2_000);
    a.store.soft_delete::<Wallet>(wallet.id).unwrap();
    a.sync().await;
    b.sync().await;

    // The tombstone replicated: hidden from reads on both devices.
    assert_eq!(b.store.get::<Wallet>(wallet.id).unwrap(), None);
    let meta_b = b.store.record_meta(Entity::Wallet, wallet.id).unwrap().unwrap();
    assert!(meta_b.is_deleted);
    assert_eq!(meta_b.version, 2);

    // Re-creating the id continues the version chain past the tombstone.
    b.set_time(3_000);
    let mut revived = Wallet::new("Cash again", "PHP", 50);
    revived.id = wallet.id;
    b.store.create(&mut revived).unwrap();
    assert_eq!(revived.meta.version, 3);

    b.sync().await;
    a.sync().await;

    let on_a: Wallet = a.store.get(wallet.id).unwrap().unwrap();
    assert_eq!(on_a.name, "Cash again");
    assert_eq!(on_a.meta.version, 3);
    assert!(!on_a.meta.is_deleted);
}

#[tokio::test]
async fn test_offline_writes_survive_restart_and_replay_with_original_stamps() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tally.db");
    let backend = Arc::new(MemoryBackend::new());
    let identity = DeviceIdentity::new("user-1", "device-a");

    let (wallet_id, edited_at) = {
        let store = Store::open(&path, identity.clone(), StatusPublisher::new("user-1")).unwrap();
        let mut wallet = Wallet::new("Cash", "PHP", 100);
        store.create(&mut wallet).unwrap();
        wallet.name = "Cash box".to_string();
        store.update(&mut wallet).unwrap();
        (wallet.id, wallet.meta.updated_at)
        // Device shuts down before it ever reached the network.
    };

    let status = StatusPublisher::new("user-1");
    let store = Arc::new(Store::open(&path, identity, status.clone()).unwrap());
    assert_eq!(store.pending_count().unwrap(), 2);

    let monitor = NetworkMonitor::new(status.clone(), Duration::ZERO);
    let dispatcher = SyncDispatcher::new(
        Arc::clone(&store),
        Arc::clone(&backend) as Arc<dyn RemoteBackend>,
        monitor,
        status,
    );
    let report = dispatcher.sync().await.unwrap().unwrap();
    assert_eq!(report.pushed, 2);

    // The replay carries the metadata stamped at write time, not push time.
    let server = backend.record(Entity::Wallet, wallet_id).unwrap();
    assert_eq!(server.meta.version, 2);
    assert_eq!(server.meta.updated_at, edited_at);
    assert_eq!(server.payload["name"], "Cash box");
    assert_eq!(store.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn test_mixed_entities_replicate_in_one_cycle() {
    let backend = Arc::new(MemoryBackend::new());
    let a = device(&backend, "user-1", "device-a", 1_000);
    let b = device(&backend, "user-1", "device-b", 1_000);

    let mut wallet = Wallet::new("Cash", "PHP", 10_000);
    a.store.create(&mut wallet).unwrap();
    let mut groceries = Transaction::new(wallet.id, -2_500).with_note("palengke run");
    a.store.create(&mut groceries).unwrap();
    let mut owed = Commitment::new("Alice", 1_000, CommitmentDirection::Owed);
    a.store.create(&mut owed).unwrap();

    let report = a.sync().await;
    assert_eq!(report.pushed, 3);

    let report = b.sync().await;
    assert_eq!(report.applied, 3);

    let tx_on_b: Transaction = b.store.get(groceries.id).unwrap().unwrap();
    assert_eq!(tx_on_b.amount, -2_500);
    assert_eq!(tx_on_b.note.as_deref(), Some("palengke run"));
    assert_eq!(tx_on_b.wallet_id, wallet.id);

    let owed_on_b: Commitment = b.store.get(owed.id).unwrap().unwrap();
    assert_eq!(owed_on_b.direction, CommitmentDirection::Owed);
    assert_eq!(b.store.list::<Wallet>().unwrap().len(), 1);
}

#[tokio::test]
async fn test_pushed_transaction_reaches_idle_device_with_matching_balances() {
    let backend = Arc::new(MemoryBackend::new());
    let a = device(&backend, "user-1", "device-a", 1_000);
    let b = device(&backend, "user-1", "device-b", 1_000);

    // Both devices start from the same replicated snapshot.
    let mut wallet = Wallet::new("Cash", "PHP", 10_000);
    a.store.create(&mut wallet).unwrap();
    a.sync().await;
    b.sync().await;

    // A records a transaction while disconnected; B makes no edits.
    a.set_time(2_000);
    let mut t1 = Transaction::new(wallet.id, -2_500);
    a.store.create(&mut t1).unwrap();
    assert_eq!(a.store.pending_count().unwrap(), 1);
    assert_eq!(a.store.get::<Transaction>(t1.id).unwrap().unwrap().meta.version, 1);

    a.sync().await;
    b.sync().await;

    let ledger_a = Ledger::new(Arc::clone(&a.store));
    let ledger_b = Ledger::new(Arc::clone(&b.store));
    assert_eq!(ledger_a.wallet_balance(wallet.id).unwrap(), 7_500);
    assert_eq!(ledger_b.wallet_balance(wallet.id).unwrap(), 7_500);
    assert_eq!(a.store.pending_count().unwrap(), 0);
    assert_eq!(b.store.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_commitment_edits_converge_regardless_of_order() {
    let backend = Arc::new(MemoryBackend::new());
    let a = device(&backend, "user-1", "device-a", 1_000);
    let b = device(&backend, "user-1", "device-b", 1_000);

    let mut owed = Commitment::new("Alice", 100, CommitmentDirection::Owed);
    a.store.create(&mut owed).unwrap();
    a.sync().await;
    b.sync().await;

    // Both devices edit the amount offline from the same base version.
    a.set_time(10_000);
    let mut edit_a: Commitment = a.store.get(owed.id).unwrap().unwrap();
    edit_a.amount = 500;
    a.store.update(&mut edit_a).unwrap();

    b.set_time(12_000);
    let mut edit_b: Commitment = b.store.get(owed.id).unwrap().unwrap();
    edit_b.amount = 700;
    b.store.update(&mut edit_b).unwrap();

    // Winner reconnects first this time; the stale push from A is
    // consumed by the backend without being applied.
    b.sync().await;
    a.sync().await;
    b.sync().await;

    let final_a: Commitment = a.store.get(owed.id).unwrap().unwrap();
    let final_b: Commitment = b.store.get(owed.id).unwrap().unwrap();
    assert_eq!(final_a.amount, 700);
    assert_eq!(final_a.meta.version, 2);
    assert_eq!(final_a, final_b);

    let server = backend.record(Entity::Commitment, owed.id).unwrap();
    assert_eq!(server.payload["amount"], 700);
    assert_eq!(a.store.pending_count().unwrap(), 0);
    assert_eq!(b.store.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn test_tenants_do_not_see_each_other() {
    let backend = Arc::new(MemoryBackend::new());
    let mine = device(&backend, "user-1", "device-a", 1_000);
    let theirs = device(&backend, "user-2", "device-x", 1_000);

    let mut my_wallet = Wallet::new("Mine", "PHP", 100);
    mine.store.create(&mut my_wallet).unwrap();
    let mut their_wallet = Wallet::new("Theirs", "USD", 900);
    theirs.store.create(&mut their_wallet).unwrap();

    mine.sync().await;
    theirs.sync().await;
    let report = mine.sync().await;
    assert_eq!(report.pulled, 0);

    assert_eq!(mine.store.get::<Wallet>(their_wallet.id).unwrap(), None);
    assert_eq!(theirs.store.get::<Wallet>(my_wallet.id).unwrap(), None);
}
