use super::{
    types::{BrokerBackend, Config, ServiceRole},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Polling, heartbeat and reaper intervals are not 0
/// - Heartbeats are more frequent than the liveness window
/// - Webhook URL carries an http(s) scheme
/// - Receipt lease outlasts the webhook timeout
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let intervals = [
        ("broker.poll_interval_ms", config.broker.poll_interval_ms),
        ("broker.publish_timeout_ms", config.broker.publish_timeout_ms),
        ("liveness.window_ms", config.liveness.window_ms),
        ("reaper.interval_ms", config.reaper.interval_ms),
        (
            "kitchen.heartbeat_interval_ms",
            config.kitchen.heartbeat_interval_ms,
        ),
        ("kitchen.poll_interval_ms", config.kitchen.poll_interval_ms),
        ("kitchen.store_timeout_ms", config.kitchen.store_timeout_ms),
    ];
    for (name, value) in intervals {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!("{} cannot be 0", name)));
        }
    }

    if config.broker.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "broker.batch_size cannot be 0".to_string(),
        ));
    }

    if config.kitchen.heartbeat_interval_ms >= config.liveness.window_ms {
        return Err(ConfigError::ValidationError(format!(
            "kitchen.heartbeat_interval_ms ({}) must be shorter than liveness.window_ms ({})",
            config.kitchen.heartbeat_interval_ms, config.liveness.window_ms
        )));
    }

    if config.kitchen.order_types.is_empty() {
        return Err(ConfigError::ValidationError(
            "kitchen.order_types cannot be empty".to_string(),
        ));
    }

    if config.notifier.receipt_lease_secs <= config.notifier.webhook_timeout_secs {
        return Err(ConfigError::ValidationError(format!(
            "notifier.receipt_lease_secs ({}) must be longer than notifier.webhook_timeout_secs ({})",
            config.notifier.receipt_lease_secs, config.notifier.webhook_timeout_secs
        )));
    }

    if let Some(ref url) = config.notifier.webhook_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "notifier.webhook_url must start with http:// or https://, got {}",
                url
            )));
        }
    }

    Ok(())
}

/// Validate settings that only make sense for some roles.
pub fn validate_role(config: &Config, role: ServiceRole) -> Result<(), ConfigError> {
    if config.broker.backend == BrokerBackend::Memory && role != ServiceRole::All {
        return Err(ConfigError::ValidationError(format!(
            "broker.backend = \"memory\" requires role all, got {}",
            role.as_str()
        )));
    }

    Ok(())
}
