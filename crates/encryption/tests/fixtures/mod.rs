#![allow(dead_code, unreachable_pub)]

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use sealstate_encryption::prelude::*;
use sealstate_encryption::{
    LockingRegistry, Method, MethodConfig, MethodDescriptor, MethodId, Output,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub const KEY_A: &str = "a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1";
pub const KEY_B: &str = "b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2";

pub const RECORDING: MethodId = MethodId::new("recording");

/// Shared, ordered log of method invocations.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Parses a configuration value, panicking on any error diagnostic.
///
/// # Panics
/// * If the value is not a valid configuration.
#[must_use]
pub fn config(value: Value) -> EncryptionConfig {
    let (config, diags) = EncryptionConfig::from_value("fixture", value);
    assert!(!diags.has_errors(), "fixture configuration is invalid:\n{diags}");
    config.expect("configuration without errors")
}

/// Builds an engine with the built-in plugins, panicking on any error diagnostic.
///
/// # Panics
/// * If any target fails to build.
#[must_use]
pub fn engine(value: Value) -> Encryption {
    let (encryption, diags) = Builder::new(&setup::default_registry()).build(&config(value));
    assert!(!diags.has_errors(), "fixture engine failed to build:\n{diags}");
    encryption
}

/// Returns a copy of `envelope` whose ciphertext byte at `position(len)` is XOR-ed with
/// `mask`. The envelope is edited through its persisted JSON form.
///
/// # Panics
/// * If the envelope does not round trip through JSON.
#[must_use]
pub fn tampered(envelope: &Envelope, position: impl FnOnce(usize) -> usize, mask: u8) -> Envelope {
    let mut value: Value = serde_json::from_slice(&envelope.to_vec().unwrap()).unwrap();
    let mut ciphertext = STANDARD.decode(value["ciphertext"].as_str().unwrap()).unwrap();

    let index = position(ciphertext.len());
    ciphertext[index] ^= mask;

    value["ciphertext"] = Value::String(STANDARD.encode(&ciphertext));
    Envelope::from_slice(&serde_json::to_vec(&value).unwrap()).unwrap()
}

/// A registry with the built-ins plus the `recording` method writing to `log`.
///
/// # Panics
/// * If the recording method cannot be registered.
#[must_use]
pub fn recording_registry(log: &CallLog) -> LockingRegistry {
    let registry = setup::default_registry();
    registry
        .register_method(Arc::new(RecordingDescriptor { log: Arc::clone(log) }))
        .expect("recording method registers once");
    registry
}

/// What a `recording` method does when asked to decrypt.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    Open,
    WrongKey,
    Broken,
}

/// A method that logs every call and either returns the ciphertext unchanged or fails
/// with a chosen error kind.
#[derive(Debug)]
pub struct RecordingDescriptor {
    pub log: CallLog,
}

impl MethodDescriptor for RecordingDescriptor {
    fn id(&self) -> MethodId {
        RECORDING
    }

    fn config_struct(&self) -> Box<dyn MethodConfig> {
        Box::new(RecordingConfig { log: Arc::clone(&self.log), settings: Settings::default() })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Settings {
    label: String,
    #[serde(default)]
    outcome: Outcome,
}

#[derive(Debug)]
struct RecordingConfig {
    log: CallLog,
    settings: Settings,
}

impl MethodConfig for RecordingConfig {
    fn populate(&mut self, body: &Value) -> Result<(), EncryptionError> {
        self.settings = serde_json::from_value(body.clone()).map_err(|err| {
            EncryptionError::invalid_configuration_caused("recording settings are malformed", err)
        })?;
        Ok(())
    }

    fn build(&self) -> Result<Box<dyn Method>, EncryptionError> {
        Ok(Box::new(RecordingMethod {
            log: Arc::clone(&self.log),
            label: self.settings.label.clone(),
            outcome: self.settings.outcome,
        }))
    }
}

#[derive(Debug)]
struct RecordingMethod {
    log: CallLog,
    label: String,
    outcome: Outcome,
}

impl Method for RecordingMethod {
    fn encrypt(&self, plaintext: &[u8], _key: &Output) -> Result<Vec<u8>, EncryptionError> {
        self.log.lock().push(format!("encrypt:{}", self.label));
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8], _key: &Output) -> Result<Vec<u8>, EncryptionError> {
        self.log.lock().push(format!("decrypt:{}", self.label));
        match self.outcome {
            Outcome::Open => Ok(ciphertext.to_vec()),
            Outcome::WrongKey => Err(EncryptionError::decryption("tag mismatch")),
            Outcome::Broken => {
                Err(EncryptionError::invalid_configuration("recording method is broken"))
            },
        }
    }
}
