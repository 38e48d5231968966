use std::path::{Path, PathBuf};

use tally_core::util::{is_http_url, normalize_text};
use uuid::Uuid;

use crate::error::CliError;
use crate::profile::{default_db_path, default_profile_path, Profile};

pub fn run_init(
    backend_url: Option<String>,
    user: Option<String>,
    token: Option<String>,
    db_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let path = default_profile_path();
    init_at(&path, backend_url, user, token, db_path)?;
    println!("{}", path.display());
    Ok(())
}

pub fn run_show() -> Result<(), CliError> {
    let path = default_profile_path();
    let profile = Profile::load(&path)?;
    for line in render_show_lines(&profile, &path) {
        println!("{line}");
    }
    Ok(())
}

/// Merge the provided flags into the profile file, keeping existing values
fn init_at(
    path: &Path,
    backend_url: Option<String>,
    user: Option<String>,
    token: Option<String>,
    db_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let mut profile = Profile::load(path)?;

    if let Some(url) = backend_url.as_deref().and_then(normalize_text) {
        if !is_http_url(&url) {
            return Err(CliError::Config(format!(
                "Backend URL must start with http:// or https://, got '{url}'"
            )));
        }
        profile.backend_url = Some(url);
    }
    if let Some(user) = user.as_deref().and_then(normalize_text) {
        profile.user_id = Some(user);
    }
    if let Some(token) = token.as_deref().and_then(normalize_text) {
        profile.auth_token = Some(token);
    }
    if let Some(db_path) = db_path {
        profile.db_path = Some(db_path);
    }
    if profile.device_id.is_none() {
        profile.device_id = Some(Uuid::now_v7().to_string());
    }

    profile.save(path)
}

fn render_show_lines(profile: &Profile, path: &Path) -> Vec<String> {
    let unset = || "(unset)".to_string();
    let db_path = profile
        .db_path
        .clone()
        .unwrap_or_else(default_db_path)
        .display()
        .to_string();

    vec![
        format!("Profile:   {}", path.display()),
        format!(
            "Backend:   {}",
            profile.backend_url.clone().unwrap_or_else(unset)
        ),
        format!(
            "Token:     {}",
            if profile.auth_token.is_some() {
                "(set)"
            } else {
                "(unset)"
            }
        ),
        format!("User:      {}", profile.user_id.clone().unwrap_or_else(unset)),
        format!(
            "Device:    {}",
            profile.device_id.clone().unwrap_or_else(unset)
        ),
        format!("Database:  {db_path}"),
    ]
}
