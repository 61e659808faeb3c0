pub mod fixtures;

use fixtures::*;
use sealstate_encryption::prelude::*;
use sealstate_encryption::{ENCRYPTION_CONFIG_ENV, KeyMeta, RegistryError};
use serde_json::json;
use std::sync::Arc;
use std::thread;

#[test]
fn test_static_passphrase_aes_gcm_round_trip_and_bit_flip() {
    let encryption = engine(json!({
        "key_provider": { "static": { "type": "static", "config": { "passphrase": "correct horse battery staple" } } },
        "method": { "aesgcm": { "type": "aes_gcm" } },
        "target": { "state": { "primary": { "key_provider": "static", "method": "aesgcm" } } }
    }));

    let envelope = encryption.encrypt(STATE, b"hello world").expect("encrypt");
    assert!(envelope.meta().get("salt").is_some(), "passphrase salt must travel in the envelope");
    assert_eq!(encryption.decrypt(STATE, &envelope).expect("decrypt"), b"hello world");

    let broken = tampered(&envelope, |len| len / 2, 0b0000_0100);
    assert_ne!(broken.ciphertext(), envelope.ciphertext());

    let err = encryption.decrypt(STATE, &broken).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
}

#[test]
fn test_passphrase_costs_travel_with_the_envelope() {
    let pairing = json!({ "state": { "primary": { "key_provider": "pass", "method": "gcm" } } });
    let tuned = engine(json!({
        "key_provider": { "pass": { "type": "static", "config": {
            "passphrase": "tuned passphrase",
            "kdf": { "memory_kib": 128, "iterations": 3 }
        } } },
        "method": { "gcm": { "type": "aes_gcm" } },
        "target": pairing
    }));

    let bytes = tuned.encrypt(STATE, b"tuned").unwrap().to_vec().unwrap();
    let envelope = Envelope::from_slice(&bytes).unwrap();
    assert_eq!(
        envelope.meta().get("kdf"),
        Some(&json!({ "algorithm": "argon2id", "memory_kib": 128, "iterations": 3, "parallelism": 1 }))
    );

    // Configured costs changed since the envelope was written.
    let retuned = engine(json!({
        "key_provider": { "pass": { "type": "static", "config": { "passphrase": "tuned passphrase" } } },
        "method": { "gcm": { "type": "aes_gcm" } },
        "target": pairing
    }));
    assert_eq!(retuned.decrypt(STATE, &envelope).unwrap(), b"tuned");
    assert_ne!(retuned.encrypt(STATE, b"new").unwrap().meta(), envelope.meta());
}

#[test]
fn test_rotation_keeps_old_envelopes_readable() {
    let before = json!({
        "key_provider": { "b": { "type": "static", "config": { "key": KEY_B } } },
        "method": { "gcm": { "type": "aes_gcm" } },
        "target": { "state": { "primary": { "key_provider": "b", "method": "gcm" } } }
    });
    let old_envelope = engine(before).encrypt(STATE, b"written before rotation").unwrap();

    let after = engine(json!({
        "key_provider": {
            "a": { "type": "static", "config": { "key": KEY_A } },
            "b": { "type": "static", "config": { "key": KEY_B } }
        },
        "method": { "gcm": { "type": "aes_gcm" } },
        "target": {
            "state": {
                "primary": { "key_provider": "a", "method": "gcm" },
                "fallback": [{ "key_provider": "b", "method": "gcm" }]
            }
        }
    }));

    assert_eq!(after.decrypt(STATE, &old_envelope).unwrap(), b"written before rotation");

    // New writes use the new primary and no longer open under the old key alone.
    let new_envelope = after.encrypt(STATE, b"written after rotation").unwrap();
    let old_only = engine(json!({
        "key_provider": { "b": { "type": "static", "config": { "key": KEY_B } } },
        "method": { "gcm": { "type": "aes_gcm" } },
        "target": { "state": { "primary": { "key_provider": "b", "method": "gcm" } } }
    }));
    assert!(old_only.decrypt(STATE, &new_envelope).unwrap_err().is_decryption_failure());
}

#[test]
fn test_method_migration_via_fallback() {
    let chacha = engine(json!({
        "key_provider": { "k": { "type": "static", "config": { "key": KEY_A } } },
        "method": { "chacha": { "type": "chacha20_poly1305" } },
        "target": { "plan": { "primary": { "key_provider": "k", "method": "chacha" } } }
    }));
    let envelope = chacha.plan().unwrap().encrypt(b"plan").unwrap();

    let migrated = engine(json!({
        "key_provider": { "k": { "type": "static", "config": { "key": KEY_A } } },
        "method": {
            "gcm": { "type": "aes_gcm" },
            "chacha": { "type": "chacha20_poly1305" }
        },
        "target": {
            "plan": {
                "primary": { "key_provider": "k", "method": "gcm" },
                "fallback": [{ "key_provider": "k", "method": "chacha" }]
            }
        }
    }));
    assert_eq!(migrated.plan().unwrap().decrypt(&envelope).unwrap(), b"plan");
}

fn recording_target(log: &CallLog, outcomes: &[(&str, &str)]) -> Encryption {
    let mut methods = serde_json::Map::new();
    let mut pairings = Vec::new();
    for (label, outcome) in outcomes {
        methods.insert(
            (*label).to_owned(),
            json!({ "type": "recording", "config": { "label": label, "outcome": outcome } }),
        );
        pairings.push(json!({ "key_provider": "k", "method": label }));
    }
    let primary = pairings.remove(0);

    let config = config(json!({
        "key_provider": { "k": { "type": "static", "config": { "key": KEY_A } } },
        "method": methods,
        "target": { "state": { "primary": primary, "fallback": pairings } }
    }));
    let (encryption, diags) = Builder::new(&recording_registry(log)).build(&config);
    assert!(!diags.has_errors(), "{diags}");
    encryption
}

fn recording_envelope() -> Envelope {
    Envelope::new("recording", "static", KeyMeta::new(), b"opaque".to_vec())
}

#[test]
fn test_fallbacks_are_tried_in_order_and_stop_at_first_success() {
    let log = CallLog::default();
    let encryption = recording_target(
        &log,
        &[("primary", "wrong_key"), ("first", "wrong_key"), ("second", "open"), ("third", "open")],
    );

    let plaintext = encryption.decrypt(STATE, &recording_envelope()).unwrap();

    assert_eq!(plaintext, b"opaque");
    assert_eq!(*log.lock(), vec!["decrypt:primary", "decrypt:first", "decrypt:second"]);
}

#[test]
fn test_broken_pairing_stops_the_chain() {
    let log = CallLog::default();
    let encryption =
        recording_target(&log, &[("primary", "wrong_key"), ("broken", "broken"), ("good", "open")]);

    let err = encryption.decrypt(STATE, &recording_envelope()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    assert_eq!(*log.lock(), vec!["decrypt:primary", "decrypt:broken"]);
}

#[test]
fn test_exhausted_chain_reports_decryption_failure() {
    let log = CallLog::default();
    let encryption = recording_target(&log, &[("primary", "wrong_key"), ("old", "wrong_key")]);

    let err = encryption.decrypt(STATE, &recording_envelope()).unwrap_err();

    assert!(err.is_decryption_failure());
    assert!(err.to_string().contains("no configured pairing"));
    assert_eq!(log.lock().len(), 2);
}

#[test]
fn test_envelope_without_ids_is_tried_against_every_pairing() {
    let log = CallLog::default();
    let encryption = recording_target(&log, &[("primary", "wrong_key"), ("old", "open")]);

    let anonymous = Envelope::new("", "", KeyMeta::new(), b"legacy".to_vec());
    assert_eq!(encryption.decrypt(STATE, &anonymous).unwrap(), b"legacy");
    assert_eq!(*log.lock(), vec!["decrypt:primary", "decrypt:old"]);
}

#[test]
fn test_unknown_key_provider_type_isolated_to_its_target() {
    let config = config(json!({
        "key_provider": {
            "kms": { "type": "aws_kms", "config": { "kms_key_id": "alias/state" } },
            "local": { "type": "static", "config": { "key": KEY_A } }
        },
        "method": { "gcm": { "type": "aes_gcm" } },
        "target": {
            "state": { "primary": { "key_provider": "kms", "method": "gcm" } },
            "plan": { "primary": { "key_provider": "local", "method": "gcm" } }
        }
    }));

    let (encryption, diags) = Builder::new(&setup::default_registry()).build(&config);

    let errors: Vec<_> = diags.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].address(), Some("target.state.primary"));
    assert_eq!(errors[0].error_ref().map(EncryptionError::kind), Some(ErrorKind::InvalidConfiguration));

    assert_eq!(
        encryption.encrypt(STATE, b"x").unwrap_err().kind(),
        ErrorKind::InvalidConfiguration
    );
    let envelope = encryption.encrypt(PLAN, b"plan").unwrap();
    assert_eq!(encryption.decrypt(PLAN, &envelope).unwrap(), b"plan");
}

#[test]
fn test_duplicate_registration_keeps_first() {
    let registry = setup::default_registry();

    let err = setup::register_builtins(&registry).unwrap_err();
    assert!(matches!(err, RegistryError::AlreadyRegistered { .. }));
    assert!(registry.key_provider("static").is_some());

    let (encryption, diags) = Builder::new(&registry).build(&config(json!({
        "key_provider": { "k": { "type": "static", "config": { "key": KEY_A } } },
        "method": { "gcm": { "type": "aes_gcm" } },
        "target": { "state": { "primary": { "key_provider": "k", "method": "gcm" } } }
    })));
    assert!(diags.is_empty());
    assert!(encryption.can_encrypt(STATE));
}

#[test]
fn test_registrations_after_snapshot_are_invisible_to_the_builder() {
    let registry = setup::default_registry();
    let builder = Builder::new(&registry);

    let log = CallLog::default();
    registry
        .register_method(Arc::new(RecordingDescriptor { log: Arc::clone(&log) }))
        .unwrap();

    let (_, diags) = builder.build(&config(json!({
        "key_provider": { "k": { "type": "static", "config": { "key": KEY_A } } },
        "method": { "rec": { "type": "recording", "config": { "label": "rec" } } },
        "target": { "state": { "primary": { "key_provider": "k", "method": "rec" } } }
    })));
    assert!(diags.has_errors());

    let (_, diags) = Builder::new(&registry).build(&config(json!({
        "key_provider": { "k": { "type": "static", "config": { "key": KEY_A } } },
        "method": { "rec": { "type": "recording", "config": { "label": "rec" } } },
        "target": { "state": { "primary": { "key_provider": "k", "method": "rec" } } }
    })));
    assert!(!diags.has_errors());
}

#[test]
fn test_env_override_merges_over_base() {
    let base = config(json!({
        "key_provider": { "old": { "type": "static", "config": { "key": KEY_B } } },
        "method": { "gcm": { "type": "aes_gcm" } },
        "target": { "state": { "primary": { "key_provider": "old", "method": "gcm" } } }
    }));
    let overrides = json!({
        "key_provider": { "new": { "type": "static", "config": { "key": KEY_A } } },
        "target": {
            "state": {
                "primary": { "key_provider": "new", "method": "gcm" },
                "fallback": [{ "key_provider": "old", "method": "gcm" }]
            }
        }
    })
    .to_string();

    let legacy = engine(json!({
        "key_provider": { "old": { "type": "static", "config": { "key": KEY_B } } },
        "method": { "gcm": { "type": "aes_gcm" } },
        "target": { "state": { "primary": { "key_provider": "old", "method": "gcm" } } }
    }))
    .encrypt(STATE, b"legacy")
    .unwrap();

    let (encryption, diags) =
        setup::encryption_with_registry(&setup::default_registry(), base, Some(&overrides))
            .unwrap();
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(encryption.decrypt(STATE, &legacy).unwrap(), b"legacy");
    assert_eq!(encryption.key_meta("new"), None);

    encryption.encrypt(STATE, b"fresh").unwrap();
    assert_eq!(encryption.key_meta("new"), Some(KeyMeta::new()));
}

#[test]
fn test_broken_env_override_is_never_ignored() {
    let base = config(json!({
        "key_provider": { "k": { "type": "static", "config": { "key": KEY_A } } },
        "method": { "gcm": { "type": "aes_gcm" } },
        "target": { "state": { "primary": { "key_provider": "k", "method": "gcm" } } }
    }));

    let diags = setup::encryption_with_registry(
        &setup::default_registry(),
        base,
        Some(r#"{ "target": { "state": { "primary": { "key_provider": "k" } } } }"#),
    )
    .unwrap_err();

    assert!(diags.has_errors());
    assert!(diags.to_string().contains(ENCRYPTION_CONFIG_ENV));
}

#[test]
fn test_concurrent_encrypt_and_decrypt() {
    let encryption = engine(json!({
        "key_provider": { "k": { "type": "static", "config": { "passphrase": "shared" } } },
        "method": { "gcm": { "type": "aes_gcm" } },
        "target": { "state": { "primary": { "key_provider": "k", "method": "gcm" } } }
    }));

    let handles: Vec<_> = (0..8u8)
        .map(|i| {
            let encryption = encryption.clone();
            thread::spawn(move || {
                let payload = vec![i; 64];
                let envelope = encryption.encrypt(STATE, &payload).unwrap();
                assert_eq!(encryption.decrypt(STATE, &envelope).unwrap(), payload);
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker panicked");
    }
}
