//! Process configuration (C10), assembled once from environment variables
//! (§6). Every field has a hard-coded default; a provided value that fails
//! to parse is logged and the default is kept rather than aborting startup.

use std::time::Duration;

use tracing::warn;

use crate::notify::distributor::EndpointUrls;

#[derive(Debug, Clone)]
pub struct NotifierDefaults {
    pub retries: u32,
    pub retry_interval: Duration,
}

impl Default for NotifierDefaults {
    fn default() -> Self {
        Self {
            retries: 50,
            retry_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub notifier_defaults: NotifierDefaults,
    /// Zero disables the periodic reconciliation sweep.
    pub sweep_interval: Duration,
    pub notify_label: String,
    pub include_node_ip_info: bool,
    pub endpoint_urls: EndpointUrls,
    pub docker_host: Option<String>,
    /// Listen address for the admin HTTP surface (C11). This crate's own
    /// addition, not one of the original `DF_` variables.
    pub admin_bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            notifier_defaults: NotifierDefaults::default(),
            sweep_interval: Duration::from_secs(5),
            notify_label: "com.df.notify".to_string(),
            include_node_ip_info: false,
            endpoint_urls: EndpointUrls::default(),
            docker_host: None,
            admin_bind: "0.0.0.0:8080".to_string(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(v) => v.parse().unwrap_or_else(|_| {
            warn!(var = name, value = %v, "failed to parse environment variable, using default");
            default
        }),
        Err(_) => default,
    }
}

fn parse_seconds_env(name: &str, default: Duration) -> Duration {
    match std::env::var(name) {
        Ok(v) => match v.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                warn!(var = name, value = %v, "failed to parse environment variable, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// First non-empty of the candidate env vars, split on commas. Implements
/// the "first non-empty wins" fallback chain from §6.
fn urls_from_env(names: &[&str]) -> Vec<String> {
    for name in names {
        if let Ok(v) = std::env::var(name) {
            let urls: Vec<String> = v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
            if !urls.is_empty() {
                return urls;
            }
        }
    }
    Vec::new()
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let notifier_defaults = NotifierDefaults {
            retries: parse_env("DF_RETRY", defaults.notifier_defaults.retries),
            retry_interval: parse_seconds_env("DF_RETRY_INTERVAL", defaults.notifier_defaults.retry_interval),
        };

        let sweep_interval = parse_seconds_env("DF_INTERVAL", defaults.sweep_interval);

        let notify_label = std::env::var("DF_NOTIFY_LABEL").unwrap_or(defaults.notify_label);

        let include_node_ip_info = std::env::var("DF_INCLUDE_NODE_IP_INFO")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.include_node_ip_info);

        let endpoint_urls = EndpointUrls {
            service_create: urls_from_env(&[
                "DF_NOTIFY_CREATE_SERVICE_URL",
                "DF_NOTIF_CREATE_SERVICE_URL",
                "DF_NOTIFICATION_URL",
            ]),
            service_remove: urls_from_env(&[
                "DF_NOTIFY_REMOVE_SERVICE_URL",
                "DF_NOTIF_REMOVE_SERVICE_URL",
                "DF_NOTIFICATION_URL",
            ]),
            node_create: urls_from_env(&["DF_NOTIFY_CREATE_NODE_URL"]),
            node_remove: urls_from_env(&["DF_NOTIFY_REMOVE_NODE_URL"]),
        };

        let docker_host = std::env::var("DF_DOCKER_HOST").ok();

        let admin_bind = std::env::var("DF_ADMIN_BIND").unwrap_or(defaults.admin_bind);

        Self {
            notifier_defaults,
            sweep_interval,
            notify_label,
            include_node_ip_info,
            endpoint_urls,
            docker_host,
            admin_bind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = Config::default();
        assert_eq!(cfg.notifier_defaults.retries, 50);
        assert_eq!(cfg.notifier_defaults.retry_interval, Duration::from_secs(5));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(5));
        assert_eq!(cfg.admin_bind, "0.0.0.0:8080");
        assert!(cfg.docker_host.is_none());
        assert!(cfg.endpoint_urls.service_create.is_empty());
    }

    #[test]
    fn urls_from_env_splits_and_trims_comma_list() {
        // exercised indirectly through from_env in integration; here we just
        // confirm the splitting behavior directly.
        std::env::set_var("CONFIG_TEST_URLS", "http://a, http://b ,,http://c");
        let urls = urls_from_env(&["CONFIG_TEST_URLS"]);
        std::env::remove_var("CONFIG_TEST_URLS");
        assert_eq!(urls, vec!["http://a", "http://b", "http://c"]);
    }

    #[test]
    fn urls_from_env_first_non_empty_wins() {
        std::env::remove_var("CONFIG_TEST_A");
        std::env::set_var("CONFIG_TEST_B", "http://b");
        let urls = urls_from_env(&["CONFIG_TEST_A", "CONFIG_TEST_B"]);
        std::env::remove_var("CONFIG_TEST_B");
        assert_eq!(urls, vec!["http://b"]);
    }
}
