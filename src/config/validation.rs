//! Configuration validation logic.

use crate::config::schema::ProxyConfig;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a ProxyConfig for semantic correctness.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // 1. The raw listener binds http_port + 1, so the top port is unusable.
    if config.listener.http_port == u16::MAX {
        errors.push(ValidationError(format!(
            "listener.http_port {} leaves no room for the raw listener on port + 1",
            config.listener.http_port
        )));
    }

    // 2. Admission limit
    if config.admission.max_clients == 0 {
        errors.push(ValidationError(
            "admission.max_clients must be > 0".to_string(),
        ));
    }

    // 3. Cache sizing
    if config.cache.capacity_bytes == 0 {
        errors.push(ValidationError(
            "cache.capacity_bytes must be > 0".to_string(),
        ));
    }
    if config.cache.max_entry_bytes == 0 {
        errors.push(ValidationError(
            "cache.max_entry_bytes must be > 0".to_string(),
        ));
    }
    if config.cache.max_entry_bytes > config.cache.capacity_bytes {
        errors.push(ValidationError(format!(
            "cache.max_entry_bytes ({}) exceeds cache.capacity_bytes ({})",
            config.cache.max_entry_bytes, config.cache.capacity_bytes
        )));
    }
    if config.cache.sweep_interval_secs == 0 {
        errors.push(ValidationError(
            "cache.sweep_interval_secs must be > 0".to_string(),
        ));
    }

    // 4. Upstream limits
    if config.upstream.max_response_bytes == 0 {
        errors.push(ValidationError(
            "upstream.max_response_bytes must be > 0".to_string(),
        ));
    }

    // 5. Timeouts (basic check)
    if config.upstream.connect_timeout_secs == 0 && config.upstream.response_timeout_secs == 0 {
        tracing::warn!("Upstream timeouts are set to 0, fetches might time out immediately");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
