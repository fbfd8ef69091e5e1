use std::env;
use std::str::FromStr;
use std::time::Duration;

use angle_core::bidding::{BiddingChannel, BiddingState, BiddingTopic};
use angle_core::channel::{ChannelCallbacks, ChannelPool, WebSocketConnector};
use angle_core::config::ClientConfig;
use angle_core::models::{Amount, Bid, Image, ImageOwner};
use angle_core::session::ApiSession;
use angle_core::util::normalize_text_option;

use crate::config_profiles::{
    CliProfile, CliProfilesConfig, API_BASE_URL_ENV, CSRF_TOKEN_ENV, SOCKET_URL_ENV,
};
use crate::error::CliError;

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Merge a stored profile with environment overrides.
pub fn client_config_from(
    profile: Option<&CliProfile>,
    env_api_base_url: Option<String>,
    env_socket_url: Option<String>,
) -> Result<ClientConfig, CliError> {
    let api_base_url = normalize_text_option(env_api_base_url)
        .or_else(|| profile.and_then(|profile| profile.api_base_url.clone()))
        .ok_or(CliError::NotConfigured)?;
    let socket_url = normalize_text_option(env_socket_url)
        .or_else(|| profile.and_then(|profile| profile.socket_url.clone()));

    let mut config = ClientConfig::new(api_base_url)?;
    config.socket_url = socket_url;
    Ok(config.normalized()?)
}

pub fn load_client_config(global_profile: Option<&str>) -> Result<ClientConfig, CliError> {
    let profiles = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = profiles.resolve_profile_name(global_profile);
    tracing::debug!(profile = %profile_name, "Resolved CLI profile");
    client_config_from(
        profiles.profile(&profile_name),
        env::var(API_BASE_URL_ENV).ok(),
        env::var(SOCKET_URL_ENV).ok(),
    )
}

/// Open an API session, bootstrapping the CSRF token unless one is provided.
pub async fn open_session(global_profile: Option<&str>) -> Result<ApiSession, CliError> {
    let config = load_client_config(global_profile)?;
    match normalize_text_option(env::var(CSRF_TOKEN_ENV).ok()) {
        Some(token) => Ok(ApiSession::new(config, Some(token))?),
        None => Ok(ApiSession::bootstrap(config).await?),
    }
}

/// Connect a pool over the session's socket and wait for `topic` to join.
pub async fn join_bidding(
    session: &ApiSession,
    topic: BiddingTopic,
    callbacks: ChannelCallbacks,
) -> Result<BiddingChannel, CliError> {
    let connector = WebSocketConnector::from_session(session)?;
    let pool = ChannelPool::spawn(connector, session.config().heartbeat_interval());
    let channel =
        BiddingChannel::join(&pool, topic, session.config().bid_ack_timeout(), callbacks).await?;
    channel.joined(JOIN_TIMEOUT).await?;
    tracing::debug!(%topic, "Joined bidding topic");
    Ok(channel)
}

pub fn parse_id<T: FromStr>(kind: &'static str, value: &str) -> Result<T, CliError> {
    value.trim().parse::<T>().map_err(|_| CliError::InvalidId {
        kind,
        value: value.to_string(),
    })
}

pub fn parse_amount(value: &str) -> Result<Amount, CliError> {
    Ok(value.parse::<Amount>()?)
}

/// Parse `item:<id>`, `avatar:<id>` or `logo:<id>`.
pub fn parse_owner(value: &str) -> Result<ImageOwner, CliError> {
    let invalid = || CliError::InvalidOwner(value.to_string());
    let (kind, id) = value.trim().split_once(':').ok_or_else(invalid)?;
    match kind {
        "item" => Ok(ImageOwner::Item(parse_id("item", id)?)),
        "avatar" => Ok(ImageOwner::UserAvatar(parse_id("user", id)?)),
        "logo" => Ok(ImageOwner::StoreLogo(parse_id("user", id)?)),
        _ => Err(invalid()),
    }
}

pub fn format_bid_line(bid: &Bid) -> String {
    format!(
        "{}  {:>12}  bidder={}",
        bid.inserted_at.format("%Y-%m-%d %H:%M:%S UTC"),
        bid.amount,
        bid.bidder_id
    )
}

pub fn format_image_lines(images: &[Image]) -> Vec<String> {
    images
        .iter()
        .map(|image| {
            let url = image.variant_url("thumbnail").unwrap_or("-");
            format!("{:>3}  {}  {url}", image.position, image.id)
        })
        .collect()
}

/// One-line summary of the live auction state.
pub fn format_state_summary(state: &BiddingState) -> String {
    let mut parts = Vec::new();
    if let Some(item) = &state.item {
        parts.push(format!("status={:?}", item.status));
        parts.push(format!("price={}", item.price_floor()));
    }
    match state.leading_bid() {
        Some(bid) => parts.push(format!("leading={} by {}", bid.amount, bid.bidder_id)),
        None => parts.push("no bids".to_string()),
    }
    parts.push(format!("bids={}", state.bids.len()));
    if state.auction_ended {
        parts.push("ended".to_string());
    }
    parts.join("  ")
}
