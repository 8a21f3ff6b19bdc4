//! Agent configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Result;

/// Configuration for constructing an [`Agent`](crate::agent::Agent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Gemini API key
    #[serde(default)]
    pub api_key: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// System instruction sent (or cached) with every call
    #[serde(default)]
    pub system_instruction: String,

    /// Display name for the server-side context cache
    #[serde(default = "default_cache_display_name")]
    pub cache_display_name: String,

    /// Time-to-live requested for the context cache
    #[serde(default = "default_cache_ttl", with = "duration_secs")]
    pub cache_ttl: Duration,

    /// Minimum system-instruction token count before caching is worthwhile
    #[serde(default = "default_min_cache_tokens")]
    pub min_cache_tokens: usize,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_cache_display_name() -> String {
    "courier-system-instruction".to_string()
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_min_cache_tokens() -> usize {
    1024
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            system_instruction: String::new(),
            cache_display_name: default_cache_display_name(),
            cache_ttl: default_cache_ttl(),
            min_cache_tokens: default_min_cache_tokens(),
        }
    }
}

impl AgentConfig {
    /// Trim all string fields and reject missing required values.
    ///
    /// Construction is fail-fast: an agent built from an invalid config
    /// never comes into existence.
    pub fn validated(mut self) -> Result<Self> {
        self.api_key = self.api_key.trim().to_string();
        self.model = self.model.trim().to_string();
        self.system_instruction = self.system_instruction.trim().to_string();
        self.cache_display_name = self.cache_display_name.trim().to_string();

        if self.api_key.is_empty() {
            return Err(Error::Config("api_key is required".to_string()));
        }
        if self.model.is_empty() {
            return Err(Error::Config("model is required".to_string()));
        }
        if self.system_instruction.is_empty() {
            return Err(Error::Config("system_instruction is required".to_string()));
        }
        if self.cache_display_name.is_empty() {
            return Err(Error::Config("cache_display_name is required".to_string()));
        }
        if self.cache_ttl < Duration::from_secs(60) {
            return Err(Error::Config(
                "cache_ttl must be at least 60 seconds".to_string(),
            ));
        }

        Ok(self)
    }
}

/// Serialize the cache TTL as whole seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
