//! Provider configuration and backend family tags.
//!
//! ```rust
//! use sbprovider::{ProviderConfig, ProviderFamily};
//!
//! let config = ProviderConfig::new(ProviderFamily::OpenAi, "primary", "https://api.openai.com/v1")
//!     .with_api_key("sk-live-123")
//!     .with_default_model("gpt-4o-mini")
//!     .with_models(vec!["gpt-4o-mini".into(), "gpt-4o".into()]);
//!
//! assert!(config.enabled);
//! assert_eq!(ProviderFamily::from_tag("no-such-family"), ProviderFamily::Generic);
//! ```

use std::fmt::{Display, Formatter};
use std::time::Duration;

use sbcommon::MetadataMap;
use serde::{Deserialize, Serialize};

/// Name that claims the registry default slot regardless of registration
/// order.
pub const DEFAULT_PROVIDER_MARKER: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFamily {
    OpenAi,
    Anthropic,
    Gemini,
    Generic,
}

impl ProviderFamily {
    /// Parses a family tag. Unrecognized tags map to [`ProviderFamily::Generic`]
    /// so registration never fails on the tag alone.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "openai" => Self::OpenAi,
            "anthropic" => Self::Anthropic,
            "gemini" => Self::Gemini,
            _ => Self::Generic,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Generic => "generic",
        }
    }
}

impl Display for ProviderFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry-owned configuration for one adapter instance. Adapters read it
/// but never mutate it; the runtime-flippable enabled flag lives on the
/// adapter itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub family: ProviderFamily,
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub default_model: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "MetadataMap::is_empty")]
    pub extra_headers: MetadataMap,
    /// Adapter-specific knobs, e.g. a non-standard endpoint path for the
    /// generic family.
    #[serde(default, skip_serializing_if = "MetadataMap::is_empty")]
    pub capabilities: MetadataMap,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_timeout() -> Duration {
    Duration::from_secs(90)
}

fn default_max_retries() -> u32 {
    3
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    pub fn new(
        family: ProviderFamily,
        name: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            family,
            name: name.into(),
            base_url: base_url.into(),
            api_key: String::new(),
            default_model: String::new(),
            models: Vec::new(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            extra_headers: MetadataMap::new(),
            capabilities: MetadataMap::new(),
            enabled: true,
        }
    }

    /// Same constructor surface, but taking a free-form family tag as the
    /// registration boundary does.
    pub fn from_tag(
        tag: &str,
        name: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self::new(ProviderFamily::from_tag(tag), name, base_url)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_default_model(mut self, default_model: impl Into<String>) -> Self {
        self.default_model = default_model.into();
        self
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_capability(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.capabilities.insert(key.into(), value.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Models advertised by this provider, default model included.
    pub fn all_models(&self) -> Vec<String> {
        let mut models = self.models.clone();
        if !self.default_model.is_empty() && !models.contains(&self.default_model) {
            models.push(self.default_model.clone());
        }
        models
    }
}
