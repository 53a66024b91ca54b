//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (durations > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - A missing cookie secret or session directory is not an error; the
//!   runtime degrades instead

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is not a socket address: {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero("listener.request_timeout_secs"));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::Zero("listener.max_body_bytes"));
    }
    if config.server.name.trim().is_empty() {
        errors.push(ValidationError::Empty("server.name"));
    }
    if config.session.duration_secs == 0 {
        errors.push(ValidationError::Zero("session.duration_secs"));
    }
    if config.session.sweep_interval_secs == 0 {
        errors.push(ValidationError::Zero("session.sweep_interval_secs"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(validate_config(&AppConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = AppConfig::default();
        config.listener.bind_address = "nowhere".to_string();
        config.session.duration_secs = 0;
        config.session.sweep_interval_secs = 0;
        config.server.name = " ".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::Zero("session.duration_secs")));
        assert!(errors.contains(&ValidationError::Empty("server.name")));
    }

    #[test]
    fn test_metrics_address_only_checked_when_enabled() {
        let mut config = AppConfig::default();
        config.observability.metrics_address = "bogus".to_string();
        assert!(validate_config(&config).is_ok());
        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
