use serde::Serialize;

use crate::commands::common::{open_ledger, resolve_channel, short_id};
use crate::error::CliError;
use crate::profile::ResolvedProfile;

pub fn run_add(profile: &ResolvedProfile, name: &str, kind: &str) -> Result<(), CliError> {
    let (ledger, _store) = open_ledger(profile)?;
    let channel = ledger.create_channel(name, kind)?;
    println!("{}", channel.id);
    Ok(())
}

pub fn run_delete(profile: &ResolvedProfile, channel: &str) -> Result<(), CliError> {
    let (ledger, store) = open_ledger(profile)?;
    let channel = resolve_channel(&store, channel)?;
    ledger.delete_channel(channel.id)?;
    println!("{}", channel.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct ChannelListItem {
    id: String,
    name: String,
    kind: String,
}

pub fn run_list(profile: &ResolvedProfile, as_json: bool) -> Result<(), CliError> {
    let (ledger, _store) = open_ledger(profile)?;
    let channels = ledger.channels()?;

    if as_json {
        let items = channels
            .iter()
            .map(|channel| ChannelListItem {
                id: channel.id.as_str(),
                name: channel.name.clone(),
                kind: channel.kind.clone(),
            })
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for channel in &channels {
            println!(
                "{:<13}  {:<20}  {}",
                short_id(channel.id),
                channel.name,
                channel.kind
            );
        }
    }

    Ok(())
}
