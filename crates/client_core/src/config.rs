use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use url::Url;

pub const SETTINGS_FILE: &str = "storefront.toml";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub quiet_period_ms: u64,
    pub product_search_limit: u32,
    pub order_page_size: u32,
    pub request_timeout_secs: u64,
    pub seller_center_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5000".into(),
            quiet_period_ms: 500,
            product_search_limit: 10,
            order_page_size: 10,
            request_timeout_secs: 15,
            seller_center_url: "https://seller-center-32880.web.app".into(),
        }
    }
}

impl Settings {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// API base with a trailing slash so relative endpoint paths join under it.
    pub fn api_base(&self) -> anyhow::Result<Url> {
        parse_api_base(&self.api_base_url)
    }
}

pub fn parse_api_base(raw: &str) -> anyhow::Result<Url> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&with_slash).with_context(|| format!("invalid api base url '{raw}'"))
}

/// Defaults, then `storefront.toml` in the working directory, then the
/// environment.
pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    file: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(file) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, env);

    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        tracing::warn!("ignoring malformed {SETTINGS_FILE}");
        return;
    };

    if let Some(v) = file_cfg.get("api_base_url").and_then(toml::Value::as_str) {
        settings.api_base_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("quiet_period_ms").and_then(as_u64) {
        settings.quiet_period_ms = v;
    }
    if let Some(v) = file_cfg.get("product_search_limit").and_then(as_u32) {
        settings.product_search_limit = v;
    }
    if let Some(v) = file_cfg.get("order_page_size").and_then(as_u32) {
        settings.order_page_size = v;
    }
    if let Some(v) = file_cfg.get("request_timeout_secs").and_then(as_u64) {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.get("seller_center_url").and_then(toml::Value::as_str) {
        settings.seller_center_url = v.to_string();
    }
}

fn as_u64(value: &toml::Value) -> Option<u64> {
    value.as_integer().and_then(|v| u64::try_from(v).ok())
}

fn as_u32(value: &toml::Value) -> Option<u32> {
    value
        .as_integer()
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v > 0)
}

fn apply_env(settings: &mut Settings, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("STOREFRONT_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = env("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = env("APP__QUIET_PERIOD_MS").and_then(|v| v.parse::<u64>().ok()) {
        settings.quiet_period_ms = v;
    }
    if let Some(v) = env("APP__PRODUCT_SEARCH_LIMIT")
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
    {
        settings.product_search_limit = v;
    }
    if let Some(v) = env("APP__ORDER_PAGE_SIZE")
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
    {
        settings.order_page_size = v;
    }
    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
        settings.request_timeout_secs = v;
    }

    if let Some(v) = env("APP__SELLER_CENTER_URL") {
        settings.seller_center_url = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
