use std::env;

use angle_core::util::normalize_text_option;
use serde::Serialize;

use crate::cli::ConfigCommands;
use crate::commands::common::load_client_config;
use crate::config_profiles::{CliProfilesConfig, API_BASE_URL_ENV};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct ResolvedProfile {
    profile: String,
    api_base_url: String,
    socket_url: String,
    heartbeat_interval_secs: u64,
    bid_ack_timeout_ms: u64,
    max_images: usize,
}

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            api_base_url,
            socket_url,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            api_base_url,
            socket_url,
            no_activate,
        ),
        ConfigCommands::Show { json } => run_config_show(global_profile, json),
    }
}

#[allow(clippy::needless_pass_by_value)]
pub fn run_config_init(
    profile_name: Option<&str>,
    api_base_url: Option<String>,
    socket_url: Option<String>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    let api_base_url = normalize_text_option(api_base_url)
        .or_else(|| normalize_text_option(env::var(API_BASE_URL_ENV).ok()));
    let socket_url = normalize_text_option(socket_url);

    let profile = config.profile_mut_or_default(&profile_name);
    if let Some(value) = api_base_url {
        profile.api_base_url = Some(value);
    }
    if let Some(value) = socket_url {
        profile.socket_url = Some(value);
    }
    profile.validate().map_err(CliError::Config)?;
    let missing_api_base_url = profile.api_base_url.is_none();

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );
    if missing_api_base_url {
        println!("Profile '{profile_name}' is missing: api_base_url");
    }
    Ok(())
}

fn run_config_show(global_profile: Option<&str>, as_json: bool) -> Result<(), CliError> {
    let profiles = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile = profiles.resolve_profile_name(global_profile);
    let config = load_client_config(global_profile)?;

    let resolved = ResolvedProfile {
        profile,
        socket_url: config.resolved_socket_url()?,
        api_base_url: config.api_base_url,
        heartbeat_interval_secs: config.heartbeat_interval_secs,
        bid_ack_timeout_ms: config.bid_ack_timeout_ms,
        max_images: config.max_images,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
    } else {
        println!("profile       {}", resolved.profile);
        println!("api_base_url  {}", resolved.api_base_url);
        println!("socket_url    {}", resolved.socket_url);
    }
    Ok(())
}
