//! Configuration validation.

use crate::config::{Config, HealthCheckType};
use crate::upstream::Origin;
use std::collections::HashSet;
use std::time::Duration;

/// Validate the configuration.
///
/// Checks for:
/// - At least one upstream
/// - Every upstream URL is a valid http origin, with no duplicates
/// - Valid log level and metrics path
/// - Non-zero proxy timeouts
/// - Sane health check settings (path starting with '/', timeout shorter
///   than the interval)
///
/// # Returns
///
/// `Ok(())` if valid, or every problem found joined into one message.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    if config.upstreams.is_empty() {
        errors.push("at least one upstream must be defined".to_string());
    }

    let mut seen = HashSet::new();
    for upstream in &config.upstreams {
        match Origin::parse(&upstream.url) {
            Ok(origin) => {
                if !seen.insert(origin.as_str().to_string()) {
                    errors.push(format!("duplicate upstream: {}", origin));
                }
            }
            Err(e) => errors.push(e.to_string()),
        }
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if config.global.metrics.enabled && !config.global.metrics.path.starts_with('/') {
        errors.push(format!(
            "metrics path '{}' must start with '/'",
            config.global.metrics.path
        ));
    }

    if config.proxy.connect_timeout == Duration::ZERO {
        errors.push("proxy connect_timeout must be greater than zero".to_string());
    }
    if config.proxy.request_timeout == Duration::ZERO {
        errors.push("proxy request_timeout must be greater than zero".to_string());
    }

    if let Some(ref hc) = config.health_check {
        if hc.check_type == HealthCheckType::Http {
            match hc.path.as_deref() {
                None => errors.push("HTTP health check has no path specified".to_string()),
                Some(path) if !path.starts_with('/') => errors.push(format!(
                    "health check path '{}' must start with '/'",
                    path
                )),
                Some(_) => {}
            }
        }
        if hc.interval == Duration::ZERO {
            errors.push("health check interval must be greater than zero".to_string());
        }
        if hc.timeout == Duration::ZERO {
            errors.push("health check timeout must be greater than zero".to_string());
        }
        // Probes are started on every tick, so one must finish before the next.
        if hc.timeout >= hc.interval {
            errors.push(format!(
                "health check timeout ({:?}) must be shorter than the interval ({:?})",
                hc.timeout, hc.interval
            ));
        }
        if hc.unhealthy_threshold == 0 || hc.healthy_threshold == 0 {
            errors.push("health check thresholds must be >= 1".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;

    fn minimal_config() -> Config {
        Config {
            upstreams: vec![
                UpstreamConfig::new("http://127.0.0.1:9000"),
                UpstreamConfig::new("http://127.0.0.1:9001"),
            ],
            ..Config::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&minimal_config()).is_ok());
    }

    #[test]
    fn test_no_upstreams() {
        let mut config = minimal_config();
        config.upstreams.clear();
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("at least one upstream"));
    }

    #[test]
    fn test_malformed_upstream() {
        let mut config = minimal_config();
        config.upstreams.push(UpstreamConfig::new("https://secure.example.com"));
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("unsupported scheme"));
    }

    #[test]
    fn test_duplicate_upstream() {
        let mut config = minimal_config();
        config.upstreams.push(UpstreamConfig::new("http://127.0.0.1:9000/"));
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("duplicate upstream"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = minimal_config();
        config.global.log_level = "loud".to_string();
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("invalid log level"));
    }

    #[test]
    fn test_http_health_check_missing_path() {
        let mut config = minimal_config();
        config.health_check = Some(HealthCheckConfig {
            check_type: HealthCheckType::Http,
            path: None,
            ..HealthCheckConfig::default()
        });
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("no path specified"));
    }

    #[test]
    fn test_http_health_check_relative_path() {
        let mut config = minimal_config();
        config.health_check = Some(HealthCheckConfig {
            check_type: HealthCheckType::Http,
            path: Some("health".to_string()),
            ..HealthCheckConfig::default()
        });
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("must start with '/'"));
    }

    #[test]
    fn test_health_check_timeout_not_below_interval() {
        let mut config = minimal_config();
        config.health_check = Some(HealthCheckConfig {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
            ..HealthCheckConfig::default()
        });
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("must be shorter than the interval"));

        config.health_check = Some(HealthCheckConfig {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(2),
            ..HealthCheckConfig::default()
        });
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_threshold() {
        let mut config = minimal_config();
        config.health_check = Some(HealthCheckConfig {
            unhealthy_threshold: 0,
            ..HealthCheckConfig::default()
        });
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("thresholds must be >= 1"));
    }

    #[test]
    fn test_errors_are_collected() {
        let mut config = minimal_config();
        config.upstreams.clear();
        config.global.log_level = "loud".to_string();
        config.proxy.connect_timeout = Duration::ZERO;

        let message = validate_config(&config).unwrap_err();
        assert_eq!(message.matches("; ").count(), 2);
    }
}
