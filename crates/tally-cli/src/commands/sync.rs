use tally_core::sync::BackendErrorKind;

use crate::commands::common::build_dispatcher;
use crate::error::CliError;
use crate::profile::ResolvedProfile;

/// Authorization failures will not fix themselves on retry; say so
fn with_auth_hint(error: tally_core::Error) -> CliError {
    if let tally_core::Error::Backend(backend) = &error {
        if backend.kind == BackendErrorKind::Authorization {
            return CliError::Config(format!(
                "{backend}. Refresh the token with `tally config init --token <TOKEN>`."
            ));
        }
    }
    error.into()
}

pub async fn run_sync(
    profile: &ResolvedProfile,
    force_pull: bool,
    global: bool,
) -> Result<(), CliError> {
    let (dispatcher, _status) = build_dispatcher(profile)?;

    if global {
        let entries = dispatcher.sync_global_data().await.map_err(with_auth_hint)?;
        println!("Refreshed {entries} global configuration entries");
        return Ok(());
    }

    if force_pull {
        let report = dispatcher.force_pull().await.map_err(with_auth_hint)?;
        println!(
            "Force pull applied {} of {} records",
            report.applied, report.pulled
        );
        return Ok(());
    }

    match dispatcher.sync().await.map_err(with_auth_hint)? {
        Some(report) => {
            println!(
                "Pushed {}, pulled {}, applied {}",
                report.pushed, report.pulled, report.applied
            );
            if report.push_failures > 0 {
                println!(
                    "{} operation(s) were rejected and will be retried",
                    report.push_failures
                );
            }
        }
        None => println!("Sync skipped; another cycle is already running"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::sync::BackendError;

    #[test]
    fn test_auth_errors_get_a_config_hint() {
        let hinted = with_auth_hint(tally_core::Error::Backend(BackendError::authorization(
            "HTTP 401",
        )));
        assert!(matches!(hinted, CliError::Config(_)));
        assert!(hinted.to_string().contains("tally config init"));

        let passed = with_auth_hint(tally_core::Error::Backend(BackendError::network("timeout")));
        assert!(matches!(passed, CliError::Core(_)));
    }
}
