//! Typed configuration.
//!
//! [`DispatcherConfig`] is what a [`Dispatcher`](crate::dispatcher::Dispatcher)
//! needs; it can be built in code, read from TOML, or taken from the
//! environment as part of [`Config`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Error, Result};

/// When a handler invocation counts as finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// Call the handler and poll its future once on the worker, spawn it if
    /// it suspended, move on. The pending count drops as soon as the handler
    /// has been called; effects after a suspension may complete out of order.
    #[default]
    FireAndForget,
    /// Block the worker loop on each handler future before moving on, so
    /// effects complete in dispatch order.
    AwaitCompletion,
}

impl fmt::Display for CompletionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionMode::FireAndForget => f.write_str("fire_and_forget"),
            CompletionMode::AwaitCompletion => f.write_str("await_completion"),
        }
    }
}

impl FromStr for CompletionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fire_and_forget" => Ok(CompletionMode::FireAndForget),
            "await_completion" => Ok(CompletionMode::AwaitCompletion),
            other => Err(Error::Config(format!(
                "unknown completion mode {other:?} (expected fire_and_forget or await_completion)"
            ))),
        }
    }
}

/// Per-instance dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Label carried on every span, log line and metric of this instance.
    pub name: String,
    pub completion: CompletionMode,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            name: "dispatcher".to_string(),
            completion: CompletionMode::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn completion(mut self, completion: CompletionMode) -> Self {
        self.completion = completion;
        self
    }

    /// Parse a `[dispatcher]`-less TOML table, e.g.
    ///
    /// ```toml
    /// name = "mailer"
    /// completion = "await_completion"
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("dispatcher name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Process-level configuration for the stress harness.
#[derive(Debug)]
pub struct Config {
    pub dispatcher: DispatcherConfig,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Everything is optional; values that are present but malformed fail
    /// fast. In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let mut dispatcher = DispatcherConfig::default();
        if let Some(name) = optional_var("DISPATCHER_NAME") {
            dispatcher.name = name;
        }
        if let Some(mode) = optional_var("DISPATCHER_COMPLETION") {
            dispatcher.completion = mode.parse()?;
        }
        dispatcher.validate()?;

        Ok(Self {
            dispatcher,
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
