use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tally_core::db::{DeviceIdentity, Store};
use tally_core::models::{Channel, RecordId, SyncRecord, Wallet};
use tally_core::sync::{
    HttpBackend, NetworkMonitor, RemoteBackend, StatusPublisher, SyncDispatcher,
};
use tally_core::Ledger;

use crate::error::CliError;
use crate::profile::ResolvedProfile;

const SYNC_HTTP_TIMEOUT_SECS: u64 = 30;

/// Open the local store and wrap it in the domain facade
pub fn open_ledger(profile: &ResolvedProfile) -> Result<(Ledger, Arc<Store>), CliError> {
    let (store, _status) = open_store(profile)?;
    Ok((Ledger::new(Arc::clone(&store)), store))
}

pub fn open_store(profile: &ResolvedProfile) -> Result<(Arc<Store>, StatusPublisher), CliError> {
    if let Some(parent) = profile.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let identity = DeviceIdentity::new(&profile.user_id, &profile.device_id);
    let status = StatusPublisher::new(&profile.user_id);
    let store = Store::open(&profile.db_path, identity, status.clone())?;
    Ok((Arc::new(store), status))
}

/// Wire a dispatcher against the configured backend
pub fn build_dispatcher(
    profile: &ResolvedProfile,
) -> Result<(Arc<SyncDispatcher>, StatusPublisher), CliError> {
    let Some(backend_url) = profile.backend_url.as_deref() else {
        return Err(CliError::SyncNotConfigured);
    };

    let mut headers = HeaderMap::new();
    if let Some(token) = profile.auth_token.as_deref() {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|error| CliError::Config(format!("Invalid auth token: {error}")))?;
        headers.insert(AUTHORIZATION, value);
    }
    let client = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(SYNC_HTTP_TIMEOUT_SECS))
        .build()
        .map_err(|error| CliError::Config(format!("Failed to build HTTP client: {error}")))?;

    let (store, status) = open_store(profile)?;
    let backend: Arc<dyn RemoteBackend> = Arc::new(HttpBackend::with_client(client, backend_url));
    let monitor = NetworkMonitor::new(status.clone(), NetworkMonitor::DEFAULT_DEBOUNCE);
    let dispatcher = Arc::new(SyncDispatcher::new(store, backend, monitor, status.clone()));
    Ok((dispatcher, status))
}

/// Find one record by exact id or unique id prefix
pub fn resolve_record<T: SyncRecord>(
    store: &Store,
    query: &str,
    entity: &'static str,
) -> Result<T, CliError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(CliError::RecordNotFound {
            entity,
            query: query.to_string(),
        });
    }

    if let Ok(id) = query.parse::<RecordId>() {
        if let Some(record) = store.get::<T>(id)? {
            return Ok(record);
        }
    }

    let mut matches: Vec<T> = store
        .list::<T>()?
        .into_iter()
        .filter(|record| record.id().as_str().starts_with(query))
        .collect();

    match matches.len() {
        0 => Err(CliError::RecordNotFound {
            entity,
            query: query.to_string(),
        }),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|record| short_id(record.id()))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousId(format!(
                "Id prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Wallets and channels also resolve by name, since that is how people
/// refer to them on the command line
fn resolve_named<T: SyncRecord>(
    store: &Store,
    query: &str,
    entity: &'static str,
    name_of: fn(&T) -> &str,
) -> Result<T, CliError> {
    match resolve_record::<T>(store, query, entity) {
        Err(CliError::RecordNotFound { .. }) => {}
        other => return other,
    }

    let mut named: Vec<T> = store
        .list::<T>()?
        .into_iter()
        .filter(|record| name_of(record).eq_ignore_ascii_case(query.trim()))
        .collect();
    match named.len() {
        0 => Err(CliError::RecordNotFound {
            entity,
            query: query.trim().to_string(),
        }),
        1 => Ok(named.remove(0)),
        _ => Err(CliError::AmbiguousId(format!(
            "{entity} name '{query}' matches more than one record; use an id prefix"
        ))),
    }
}

pub fn resolve_wallet(store: &Store, query: &str) -> Result<Wallet, CliError> {
    resolve_named(store, query, "Wallet", |wallet| wallet.name.as_str())
}

pub fn resolve_channel(store: &Store, query: &str) -> Result<Channel, CliError> {
    resolve_named(store, query, "Channel", |channel| channel.name.as_str())
}

/// First block of a UUID, enough to copy-paste back as a prefix
pub fn short_id(id: RecordId) -> String {
    id.as_str().chars().take(13).collect()
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    const MINUTE: i64 = 60_000;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;

    let diff = now_ms.saturating_sub(timestamp_ms);
    if diff < MINUTE {
        "just now".to_string()
    } else if diff < HOUR {
        format!("{}m ago", diff / MINUTE)
    } else if diff < DAY {
        format!("{}h ago", diff / HOUR)
    } else if diff < 30 * DAY {
        format!("{}d ago", diff / DAY)
    } else {
        // Old entries read better as plain dates.
        format_date(timestamp_ms)
    }
}

pub fn format_date(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d").to_string(),
    )
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// Parse a YYYY-MM-DD date into Unix milliseconds at midnight UTC
pub fn parse_due_date(input: &str) -> Result<i64, CliError> {
    let input = input.trim();
    let date = chrono::NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|_| CliError::InvalidDate(input.to_string()))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| CliError::InvalidDate(input.to_string()))?;
    Ok(midnight.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tally_core::db::{DeviceIdentity, Store};
    use tally_core::sync::StatusPublisher;

    use super::*;

    fn test_store() -> Store {
        Store::open_in_memory(
            DeviceIdentity::new("user-1", "device-a"),
            StatusPublisher::new("user-1"),
        )
        .unwrap()
    }

    #[test]
    fn resolve_record_by_exact_id_and_prefix() {
        let store = test_store();
        let mut wallet = Wallet::new("Cash", "PHP", 0);
        store.create(&mut wallet).unwrap();

        let full_id = wallet.id.as_str();
        let by_exact: Wallet = resolve_record(&store, &full_id, "Wallet").unwrap();
        assert_eq!(by_exact.id, wallet.id);

        let prefix: String = wallet.id.as_str().chars().take(10).collect();
        let by_prefix: Wallet = resolve_record(&store, &prefix, "Wallet").unwrap();
        assert_eq!(by_prefix.id, wallet.id);
    }

    #[test]
    fn resolve_record_rejects_missing_and_empty() {
        let store = test_store();
        assert!(matches!(
            resolve_record::<Wallet>(&store, "ffffffff", "Wallet"),
            Err(CliError::RecordNotFound { .. })
        ));
        assert!(matches!(
            resolve_record::<Wallet>(&store, "  ", "Wallet"),
            Err(CliError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn resolve_wallet_falls_back_to_name() {
        let store = test_store();
        let mut wallet = Wallet::new("Cash", "PHP", 0);
        store.create(&mut wallet).unwrap();

        let by_name = resolve_wallet(&store, "cash").unwrap();
        assert_eq!(by_name.id, wallet.id);

        assert!(matches!(
            resolve_wallet(&store, "savings"),
            Err(CliError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn resolve_wallet_rejects_duplicate_names() {
        let store = test_store();
        let mut first = Wallet::new("Cash", "PHP", 0);
        let mut second = Wallet::new("cash", "USD", 0);
        store.create(&mut first).unwrap();
        store.create(&mut second).unwrap();

        assert!(matches!(
            resolve_wallet(&store, "CASH"),
            Err(CliError::AmbiguousId(_))
        ));
    }

    #[test]
    fn relative_time_switches_to_dates_for_old_entries() {
        let now = 1_700_000_000_000;
        assert_eq!(format_relative_time(now - 30_000, now), "just now");
        assert_eq!(format_relative_time(now - 5 * 60_000, now), "5m ago");
        assert_eq!(format_relative_time(now - 3 * 3_600_000, now), "3h ago");
        assert_eq!(format_relative_time(now - 2 * 86_400_000, now), "2d ago");
        assert_eq!(
            format_relative_time(now - 90 * 86_400_000, now),
            format_date(now - 90 * 86_400_000)
        );
    }

    #[test]
    fn parse_due_date_accepts_iso_dates_only() {
        assert_eq!(parse_due_date("2026-03-01").unwrap(), 1_772_323_200_000);
        assert!(matches!(
            parse_due_date("03/01/2026"),
            Err(CliError::InvalidDate(_))
        ));
        assert!(matches!(
            parse_due_date("2026-13-40"),
            Err(CliError::InvalidDate(_))
        ));
    }

    #[test]
    fn short_id_is_a_copyable_prefix() {
        let id = RecordId::new();
        let short = short_id(id);
        assert_eq!(short.len(), 13);
        assert!(id.as_str().starts_with(&short));
    }
}
