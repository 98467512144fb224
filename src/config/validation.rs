//! Configuration validation.

use crate::config::{ModClusterConfig, ProbeType};

/// Validate the configuration.
///
/// Checks for:
/// - A positive health-check interval
/// - HTTP probes have a path
/// - A sane expected status code
/// - A non-zero failover cache capacity
/// - A known log level
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing the problem.
pub fn validate_config(config: &ModClusterConfig) -> Result<(), String> {
    let mut errors = Vec::new();

    if config.health_check_interval.is_zero() {
        errors.push("health_check_interval must be greater than zero".to_string());
    }

    if config.health_check.check_type == ProbeType::Http && config.health_check.path.is_none() {
        errors.push("http health check requires a path".to_string());
    }

    let status = config.health_check.expected_status;
    if !(100..=599).contains(&status) {
        errors.push(format!("invalid expected status code: {}", status));
    }

    if config.failover_cache.capacity == 0 {
        errors.push("failover_cache.capacity must be at least 1".to_string());
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
