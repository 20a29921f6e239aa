//! Custom validation functions shared by the configuration sections.

use validator::ValidationError;

fn matches(pattern: &str, value: &str, code: &'static str) -> Result<(), ValidationError> {
    let re = regex::Regex::new(pattern).map_err(|_| ValidationError::new("invalid_regex"))?;
    if re.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new(code))
    }
}

/// Wire protocol the listener decodes.
pub fn validate_protocol(protocol: &str) -> Result<(), ValidationError> {
    matches("^(ipfix|syslog)$", protocol, "invalid_protocol")
}

/// Dispatcher backpressure policy.
pub fn validate_overflow(policy: &str) -> Result<(), ValidationError> {
    matches("^(drop_newest|drop_oldest)$", policy, "invalid_overflow_policy")
}

/// A bare level or an `EnvFilter` directive list such as `info,driftnet_engine=debug`.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    matches(
        r"^([A-Za-z0-9_:]+=)?(trace|debug|info|warn|error|off)(,([A-Za-z0-9_:]+=)?(trace|debug|info|warn|error|off))*$",
        level,
        "invalid_log_level",
    )
}
