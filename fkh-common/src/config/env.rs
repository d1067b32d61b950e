//! Environment variable parsing with type safety.
//!
//! Provides a type-safe parser for FKH environment variables that collects
//! every error, so all issues can be reported at once.

use std::env;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

/// Type-safe environment variable parser.
///
/// Every getter returns `None` when the variable is unset, so callers only
/// override what the operator actually set. Invalid values are recorded and
/// also yield `None`.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Create a new parser with the FKH_ prefix.
    pub fn new() -> Self {
        Self::with_prefix("FKH_")
    }

    pub fn with_prefix(prefix: &'static str) -> Self {
        Self {
            prefix,
            errors: Vec::new(),
        }
    }

    /// Get all accumulated errors.
    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    /// Check if any errors occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Take ownership of errors.
    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn raw(&self, name: &str) -> Option<(String, String)> {
        let var_name = self.var_name(name);
        env::var(&var_name).ok().map(|value| (var_name, value))
    }

    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off, "" (for false)
    pub fn get_bool(&mut self, name: &str) -> Option<bool> {
        let (var, value) = self.raw(name)?;
        match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" | "" => Some(false),
            _ => {
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: "boolean (true/false/1/0/yes/no)".to_string(),
                    value,
                });
                None
            }
        }
    }

    pub fn get_u64_range(&mut self, name: &str, min: u64, max: u64) -> Option<u64> {
        let (var, value) = self.raw(name)?;
        match value.trim().parse::<u64>() {
            Ok(n) if n >= min && n <= max => Some(n),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                None
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: "unsigned 64-bit integer".to_string(),
                    value,
                });
                None
            }
        }
    }

    pub fn get_usize_range(&mut self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.get_u64_range(name, min as u64, max as u64)
            .map(|n| n as usize)
    }

    pub fn get_log_level(&mut self, name: &str) -> Option<String> {
        let (var, value) = self.raw(name)?;
        let lower = value.to_lowercase();
        match lower.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" | "off" => Some(lower),
            _ => {
                self.errors.push(EnvError::InvalidLogLevel { var, value });
                None
            }
        }
    }

    /// Get a comma-separated list of strings.
    pub fn get_string_list(&mut self, name: &str) -> Option<Vec<String>> {
        let (_, value) = self.raw(name)?;
        Some(
            value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}
