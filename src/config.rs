use std::fs;
use std::num::NonZeroU32;
use std::path::Path;

use serde::Deserialize;

use crate::compress::{Compression, Level, Method};
use crate::error::{Error, Result};
use crate::key;

// Configuration
//
// Every field is optional in the toml file, missing ones take the defaults
// below:
//
//   codec = "gzip"
//   level = "standard"
//   kdf_iterations = 100000
//   jobs = 4
//
//   [password]
//   min_length = 12
//   require_uppercase = true
//   require_lowercase = true
//   require_digit = true
//   require_special = true
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub codec: Method,
    pub level: Level,
    pub kdf_iterations: u32,
    pub jobs: usize,
    pub password: PasswordPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            codec: Method::Gzip,
            level: Level::Standard,
            kdf_iterations: key::DEFAULT_ITERATIONS.get(),
            jobs: std::thread::available_parallelism()
                .map(|n| n.get().min(8))
                .unwrap_or(1),
            password: PasswordPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Config> {
        let config: Config =
            toml::from_str(text).map_err(|e| Error::validation(format!("bad config: {}", e)))?;
        config.iterations()?;
        if config.jobs == 0 {
            return Err(Error::validation("jobs must be at least 1"));
        }
        Ok(config)
    }

    pub fn load(path: Option<&Path>) -> Result<Config> {
        match path {
            None => Ok(Config::default()),
            Some(p) => Config::from_toml(&fs::read_to_string(p)?),
        }
    }

    pub fn iterations(&self) -> Result<NonZeroU32> {
        NonZeroU32::new(self.kdf_iterations)
            .filter(|n| n.get() <= key::MAX_ITERATIONS)
            .ok_or_else(|| {
                Error::validation(format!(
                    "kdf_iterations must be within 1..={}, got {}",
                    key::MAX_ITERATIONS,
                    self.kdf_iterations
                ))
            })
    }

    pub fn compression(&self) -> Compression {
        Compression::preset(self.codec, self.level)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        PasswordPolicy {
            min_length: 12,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
        }
    }
}

impl PasswordPolicy {
    // Reports every rule the password breaks, not just the first one
    pub fn check(&self, password: &str) -> Result<()> {
        let mut failed: Vec<String> = Vec::new();

        let len = password.chars().count();
        if len < self.min_length.max(1) {
            failed.push(format!("at least {} characters", self.min_length.max(1)));
        }
        if self.require_uppercase && !password.chars().any(char::is_uppercase) {
            failed.push("an uppercase letter".to_string());
        }
        if self.require_lowercase && !password.chars().any(char::is_lowercase) {
            failed.push("a lowercase letter".to_string());
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            failed.push("a digit".to_string());
        }
        if self.require_special
            && !password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace())
        {
            failed.push("a special character".to_string());
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "password must contain {}",
                failed.join(", ")
            )))
        }
    }
}
