use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_models(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.connect_timeout_secs == 0 {
        return Err(validation_err(
            "server.connect_timeout_secs must be greater than 0",
        ));
    }
    if server.idle_timeout_secs == 0 {
        return Err(validation_err(
            "server.idle_timeout_secs must be greater than 0",
        ));
    }
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    if let Some(max_blocking_threads) = server.runtime_max_blocking_threads {
        if max_blocking_threads == 0 {
            return Err(validation_err(
                "server.runtime_max_blocking_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    if !upstream.base_url.starts_with("http://") && !upstream.base_url.starts_with("https://") {
        return Err(validation_err(
            "upstream.base_url must start with http:// or https://",
        ));
    }
    if let Err(err) = url::Url::parse(&upstream.base_url) {
        return Err(validation_err(format!(
            "upstream.base_url '{}' is not a valid URL: {err}",
            upstream.base_url
        )));
    }
    if upstream.user_agent.trim().is_empty() {
        return Err(validation_err("upstream.user_agent cannot be empty"));
    }
    for (field, value) in [
        ("upstream.cookie", upstream.cookie.as_str()),
        ("upstream.user_agent", upstream.user_agent.as_str()),
        ("upstream.origin", upstream.origin.as_str()),
        ("upstream.referer", upstream.referer.as_str()),
        (
            "upstream.statsig_id",
            upstream.statsig_id.as_deref().unwrap_or_default(),
        ),
    ] {
        if http::HeaderValue::from_str(value).is_err() {
            return Err(validation_err(format!(
                "{field} contains characters not allowed in an HTTP header"
            )));
        }
    }
    Ok(())
}

fn validate_models(config: &AppConfig) -> Result<(), ConfigError> {
    let features = &config.features;
    if features.models.is_empty() {
        return Err(validation_err("features.models cannot be empty"));
    }
    if features.models.iter().any(|m| m.trim().is_empty()) {
        return Err(validation_err("features.models contains an empty model"));
    }
    if features.default_model.trim().is_empty() {
        return Err(validation_err("features.default_model cannot be empty"));
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level '{}' is invalid. Must be one of: {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let mut config = AppConfig::default();
        config.upstream.base_url = "ftp://example.com".into();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("http:// or https://"));
    }

    #[test]
    fn test_rejects_unparsable_base_url() {
        let mut config = AppConfig::default();
        config.upstream.base_url = "http://exa mple.com".into();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("not a valid URL"));
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let mut config = AppConfig::default();
        config.server.idle_timeout_secs = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.server.connect_timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_cookie_with_newline() {
        let mut config = AppConfig::default();
        config.upstream.cookie = "a=b\nc=d".into();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("upstream.cookie"));
    }

    #[test]
    fn test_rejects_empty_model_catalog() {
        let mut config = AppConfig::default();
        config.features.models.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_log_level_case_insensitive() {
        let mut config = AppConfig::default();
        config.features.log_level = "warning".into();
        assert!(validate_config(&config).is_ok());
        config.features.log_level = "verbose".into();
        assert!(validate_config(&config).is_err());
    }
}
