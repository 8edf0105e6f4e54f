//! Configuration validation

use crate::policy::EscapeModeSetting;
use crate::schema::{RawConfig, RawHypervisorConfig, RawRotationConfig};
use thiserror::Error;
use vmherd_api::StartMode;

/// Longest delay a rotation setting may ask for (30 days)
pub const MAX_DELAY_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("hypervisor.{field}: {message}")]
    HypervisorError { field: &'static str, message: String },

    #[error("rotation.{field}: {message}")]
    RotationError { field: &'static str, message: String },
}

/// Validate a raw configuration, collecting every problem
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = validate_hypervisor(&config.hypervisor);
    errors.extend(validate_rotation(&config.rotation));
    errors
}

fn validate_hypervisor(raw: &RawHypervisorConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(path) = &raw.executable
        && path.as_os_str().is_empty()
    {
        errors.push(ValidationError::HypervisorError {
            field: "executable",
            message: "cannot be empty".into(),
        });
    }

    if let Some(mode) = &raw.escape_mode
        && let Err(e) = parse_escape_mode(mode)
    {
        errors.push(e);
    }

    errors
}

fn validate_rotation(raw: &RawRotationConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if raw.running_limit == Some(0) {
        errors.push(ValidationError::RotationError {
            field: "running_limit",
            message: "must be at least 1".into(),
        });
    }

    if raw.work_seconds == Some(0) {
        errors.push(ValidationError::RotationError {
            field: "work_seconds",
            message: "must be greater than 0".into(),
        });
    }

    let delays = [
        ("work_seconds", raw.work_seconds),
        ("start_stagger_seconds", raw.start_stagger_seconds),
        ("restart_cooldown_seconds", raw.restart_cooldown_seconds),
    ];
    for (field, seconds) in delays {
        if let Some(seconds) = seconds
            && seconds > MAX_DELAY_SECONDS
        {
            errors.push(ValidationError::RotationError {
                field,
                message: format!("must be at most {} seconds, got {}", MAX_DELAY_SECONDS, seconds),
            });
        }
    }

    if let Some(group) = &raw.group
        && !group.starts_with('/')
    {
        errors.push(ValidationError::RotationError {
            field: "group",
            message: format!("'{}' must start with '/'", group),
        });
    }

    if let Some(mode) = &raw.start_mode
        && let Err(e) = parse_start_mode(mode)
    {
        errors.push(e);
    }

    errors
}

/// Parse an escape mode name
pub fn parse_escape_mode(s: &str) -> Result<EscapeModeSetting, ValidationError> {
    match s.trim().to_lowercase().as_str() {
        "auto" => Ok(EscapeModeSetting::Auto),
        "posix" => Ok(EscapeModeSetting::Posix),
        "windows" => Ok(EscapeModeSetting::Windows),
        other => Err(ValidationError::HypervisorError {
            field: "escape_mode",
            message: format!("unknown mode '{}', expected auto, posix or windows", other),
        }),
    }
}

/// Parse a start mode name
pub fn parse_start_mode(s: &str) -> Result<StartMode, ValidationError> {
    match s.trim().to_lowercase().as_str() {
        "headless" => Ok(StartMode::Headless),
        "gui" => Ok(StartMode::Gui),
        other => Err(ValidationError::RotationError {
            field: "start_mode",
            message: format!("unknown mode '{}', expected headless or gui", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(toml_str: &str) -> RawConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_parse_escape_mode() {
        assert_eq!(parse_escape_mode("auto").unwrap(), EscapeModeSetting::Auto);
        assert_eq!(parse_escape_mode("POSIX").unwrap(), EscapeModeSetting::Posix);
        assert_eq!(parse_escape_mode(" windows ").unwrap(), EscapeModeSetting::Windows);
        assert!(parse_escape_mode("cmd").is_err());
    }

    #[test]
    fn test_parse_start_mode() {
        assert_eq!(parse_start_mode("headless").unwrap(), StartMode::Headless);
        assert_eq!(parse_start_mode("Gui").unwrap(), StartMode::Gui);
        assert!(parse_start_mode("sdl").is_err());
    }

    #[test]
    fn valid_config_has_no_errors() {
        let config = raw(r#"
            config_version = 1
            [rotation]
            running_limit = 2
            group = "/"
        "#);
        assert!(validate_config(&config).is_empty());
    }

    #[test]
    fn collects_every_error() {
        let config = raw(r#"
            config_version = 1
            [hypervisor]
            executable = ""
            escape_mode = "cmd"
            [rotation]
            running_limit = 0
            work_seconds = 0
            group = "farm"
            start_mode = "sdl"
        "#);

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 6);
    }

    #[test]
    fn delays_have_an_upper_bound() {
        let config = raw(r#"
            config_version = 1
            [rotation]
            work_seconds = 9223372036854775807
            start_stagger_seconds = 2592001
            restart_cooldown_seconds = 9999999999
        "#);

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 3);
        assert!(errors[0].to_string().starts_with("rotation.work_seconds: must be at most"));

        let config = raw(r#"
            config_version = 1
            [rotation]
            work_seconds = 2592000
            start_stagger_seconds = 2592000
            restart_cooldown_seconds = 2592000
        "#);
        assert!(validate_config(&config).is_empty());
    }
}
