//! # Encryption Configuration
//!
//! The configuration tree names key provider blocks, method blocks and targets:
//!
//! ```json
//! {
//!   "key_provider": { "main": { "type": "static", "config": { "passphrase": "..." } } },
//!   "method":       { "gcm":  { "type": "aes_gcm" } },
//!   "target": {
//!     "state": {
//!       "primary":  { "key_provider": "main", "method": "gcm" },
//!       "fallback": [{ "key_provider": "old", "method": "gcm" }]
//!     }
//!   }
//! }
//! ```
//!
//! Block bodies (`config`) are plugin-shaped and stay opaque here; they are handed to the
//! plugin's [`KeyProviderConfig::populate`](crate::keyprovider::KeyProviderConfig::populate)
//! or [`MethodConfig::populate`](crate::method::MethodConfig::populate) at build time.
//! References between targets and blocks are resolved by the builder, after merging.

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{BoxError, EncryptionError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Target protecting state snapshots.
pub const STATE: &str = "state";

/// Target protecting execution plans.
pub const PLAN: &str = "plan";

/// The parsed encryption configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptionConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub key_provider: BTreeMap<String, PluginBlock>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub method: BTreeMap<String, PluginBlock>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub target: BTreeMap<String, TargetConfig>,
}

/// A named key provider or method block: the plugin ID plus its opaque body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<PairingRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback: Vec<PairingRef>,
}

/// Names one key provider block and one method block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PairingRef {
    pub key_provider: String,
    pub method: String,
}

impl PairingRef {
    pub fn new(key_provider: impl Into<String>, method: impl Into<String>) -> Self {
        Self { key_provider: key_provider.into(), method: method.into() }
    }
}

/// Text grammars accepted for encryption configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSyntax {
    Json,
    Toml,
}

impl ConfigSyntax {
    /// JSON when the first non-blank character opens an object, TOML otherwise.
    ///
    /// A TOML document can never start with `{`, so the two cannot be confused.
    #[must_use]
    pub fn detect(text: &str) -> Self {
        if text.trim_start().starts_with('{') { Self::Json } else { Self::Toml }
    }
}

impl fmt::Display for ConfigSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("JSON"),
            Self::Toml => f.write_str("TOML"),
        }
    }
}

impl EncryptionConfig {
    /// Parses configuration text and validates its structure.
    ///
    /// The grammar is detected with [`ConfigSyntax::detect`], so the same text that would
    /// be accepted as a configuration file is accepted here.
    ///
    /// `source_name` is used as the address of syntax errors (a file name or the
    /// environment variable name). The configuration is returned only when no error
    /// diagnostic was produced.
    #[must_use]
    pub fn parse(source_name: &str, text: &str) -> (Option<Self>, Diagnostics) {
        Self::parse_as(source_name, text, ConfigSyntax::detect(text))
    }

    /// Parses configuration text in an explicit grammar and validates its structure.
    #[must_use]
    pub fn parse_as(
        source_name: &str,
        text: &str,
        syntax: ConfigSyntax,
    ) -> (Option<Self>, Diagnostics) {
        let parsed = match syntax {
            ConfigSyntax::Json => serde_json::from_str::<Self>(text).map_err(BoxError::from),
            ConfigSyntax::Toml => toml::from_str::<Self>(text).map_err(BoxError::from),
        };

        match parsed {
            Ok(config) => config.validated(),
            Err(err) => {
                let diag = Diagnostic::error(
                    "Invalid encryption configuration",
                    Some(source_name.to_owned()),
                    EncryptionError::invalid_configuration_caused(
                        format!("configuration could not be parsed as {syntax}"),
                        err,
                    ),
                );
                (None, diag.into())
            },
        }
    }

    /// Builds a configuration from an already structured value.
    pub fn from_value(source_name: &str, value: Value) -> (Option<Self>, Diagnostics) {
        match serde_json::from_value::<Self>(value) {
            Ok(config) => config.validated(),
            Err(err) => {
                let diag = Diagnostic::error(
                    "Invalid encryption configuration",
                    Some(source_name.to_owned()),
                    EncryptionError::invalid_configuration_caused(
                        "configuration does not match the expected shape",
                        err,
                    ),
                );
                (None, diag.into())
            },
        }
    }

    fn validated(self) -> (Option<Self>, Diagnostics) {
        let diags = self.validate();
        if diags.has_errors() { (None, diags) } else { (Some(self), diags) }
    }

    /// Structural validation: names and plugin IDs are well formed, targets are usable.
    ///
    /// References from targets to blocks are not checked here, since an override may
    /// legitimately refer to blocks declared only in the base configuration.
    #[must_use]
    pub fn validate(&self) -> Diagnostics {
        let mut diags = Diagnostics::new();

        for (section, blocks) in [("key_provider", &self.key_provider), ("method", &self.method)] {
            for (name, block) in blocks {
                let address = format!("{section}.{name}");
                if !is_identifier(name) {
                    diags.push(invalid_name(&address, name));
                }
                if block.kind.trim().is_empty() {
                    diags.push(Diagnostic::error(
                        "Missing plugin type",
                        Some(address.clone()),
                        EncryptionError::invalid_configuration("the `type` field must not be empty"),
                    ));
                }
                if !matches!(block.config, Value::Null | Value::Object(_)) {
                    diags.push(Diagnostic::error(
                        "Invalid plugin body",
                        Some(address),
                        EncryptionError::invalid_configuration("the `config` field must be an object"),
                    ));
                }
            }
        }

        for (name, target) in &self.target {
            let address = format!("target.{name}");
            if !is_identifier(name) {
                diags.push(invalid_name(&address, name));
            }

            match &target.primary {
                None if target.fallback.is_empty() => diags.push(Diagnostic::warning(
                    "Target has no pairings",
                    Some(address),
                    "neither a primary nor a fallback pairing is configured",
                )),
                None => diags.push(Diagnostic::warning(
                    "Target can only decrypt",
                    Some(address),
                    "no primary pairing is configured, so new data cannot be encrypted",
                )),
                Some(primary) => {
                    for (i, fallback) in target.fallback.iter().enumerate() {
                        if fallback == primary {
                            diags.push(Diagnostic::warning(
                                "Redundant fallback",
                                Some(format!("{address}.fallback[{i}]")),
                                "this fallback is identical to the primary pairing",
                            ));
                        }
                    }
                },
            }
        }

        diags
    }

    /// Right-biased structural merge.
    ///
    /// Key provider blocks, method blocks and targets present in `overrides` replace the
    /// entry of the same name wholesale; everything else is kept from `self`.
    #[must_use]
    pub fn merge(mut self, overrides: Self) -> Self {
        self.key_provider.extend(overrides.key_provider);
        self.method.extend(overrides.method);
        self.target.extend(overrides.target);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.key_provider.is_empty() && self.method.is_empty() && self.target.is_empty()
    }
}

/// Deserializes a plugin block body into the plugin's configuration shape.
///
/// A missing body (`null`) is treated as an empty record.
///
/// # Errors
/// [`EncryptionError::InvalidConfiguration`] if the body does not match `T`.
pub fn populate_from<T: DeserializeOwned>(body: &Value) -> Result<T, EncryptionError> {
    let body = match body {
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(body).map_err(|err| {
        EncryptionError::invalid_configuration_caused("plugin configuration is malformed", err)
    })
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn invalid_name(address: &str, name: &str) -> Diagnostic {
    Diagnostic::error(
        "Invalid block name",
        Some(address.to_owned()),
        EncryptionError::invalid_configuration(format!(
            "'{name}' must start with a letter or underscore and use only [A-Za-z0-9_-]"
        )),
    )
}
