//! # Configuration and settings
//!
//! This module is used to retrieve the configuration from the environment variables
//! and parse them into a struct.

use crate::{
    client::ConnectOptions,
    service::notification::DEFAULT_CHAT_ROUTE,
    state::responsibility::{parse_responsibilities, ResponsibilityError, ResponsibilityId},
};
use dotenv::dotenv;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use std::time::Duration;

/// Configuration settings for the listener.
#[derive(Deserialize, Clone, Debug)]
pub struct Configuration {
    /// Realtime endpoint.
    pub socket_url: String,
    /// Base url of the REST API.
    pub api_url: String,
    /// Bearer token seeded into the token store.
    #[serde(default)]
    pub access_token: String,
    /// Unread count endpoint, relative to `api_url`.
    pub count_path: String,
    /// Notification list endpoint, relative to `api_url`.
    pub list_path: String,
    /// Comma separated responsibility ids, e.g. `7,12`.
    #[serde(default)]
    pub responsibilities: String,
    /// Seconds between two badge polls, raised to 1 when lower.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub poll_interval_secs: u64,
    /// Consecutive automatic reconnect attempts.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub reconnection_attempts: u32,
    /// Milliseconds between two reconnect attempts.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub reconnection_delay_ms: u64,
    /// Route prefix where toasts are suppressed.
    pub chat_route: String,
    /// Number of recently shown message ids remembered.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub notification_window: usize,
    /// Route reported at start.
    pub initial_route: String,
}

impl Configuration {
    /// Returns the connection options.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            url: self.socket_url.clone(),
            reconnection_attempts: self.reconnection_attempts,
            reconnection_delay: Duration::from_millis(self.reconnection_delay_ms),
        }
    }

    /// Returns the badge poll period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Returns the parsed responsibility ids.
    pub fn responsibility_ids(&self) -> Result<Vec<ResponsibilityId>, ResponsibilityError> {
        parse_responsibilities(&self.responsibilities)
    }

    /// Returns the access token, if one is configured.
    pub fn token(&self) -> Option<String> {
        Some(self.access_token.clone()).filter(|token| !token.is_empty())
    }
}

/// Returns a configuration object from the environment variables.
pub fn get_configuration() -> Result<Configuration, config::ConfigError> {
    dotenv().ok();

    let configuration = with_defaults(config::Config::builder())?
        .add_source(config::Environment::default())
        .build()?;

    configuration.try_deserialize()
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
    builder
        .set_default("socket_url", "ws://127.0.0.1:8080/")?
        .set_default("api_url", "http://127.0.0.1:8080/")?
        .set_default("access_token", "")?
        .set_default("count_path", "notification/count")?
        .set_default("list_path", "notification")?
        .set_default("responsibilities", "")?
        .set_default("poll_interval_secs", 10)?
        .set_default("reconnection_attempts", 5)?
        .set_default("reconnection_delay_ms", 1000)?
        .set_default("chat_route", DEFAULT_CHAT_ROUTE)?
        .set_default("notification_window", 1)?
        .set_default("initial_route", "/")
}
