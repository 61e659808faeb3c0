use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const KEY: &str = "0f0e0d0c0b0a09080706050403020100f0e0d0c0b0a090807060504030201000";

const CONFIG: &str = r#"{
    "key_provider": { "main": { "type": "static", "config": { "passphrase": "correct horse battery staple" } } },
    "method": { "aesgcm": { "type": "aes_gcm" } },
    "target": {
        "state": { "primary": { "key_provider": "main", "method": "aesgcm" } },
        "plan": { "fallback": [{ "key_provider": "main", "method": "aesgcm" }] }
    }
}"#;

fn sealstate() -> Command {
    let mut cmd = Command::cargo_bin("sealstate").unwrap();
    cmd.env_remove("TF_ENCRYPTION").env_remove("RUST_LOG");
    cmd
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn encrypt_file(config: &Path, input: &Path, output: &Path) {
    sealstate()
        .args(["encrypt", "--target", "state", "--config"])
        .arg(config)
        .arg("--input")
        .arg(input)
        .arg("--output")
        .arg(output)
        .assert()
        .success();
}

#[test]
fn round_trip_through_files() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "encryption.json", CONFIG);
    let input = write(&dir, "state.json", r#"{"resources":[]}"#);
    let sealed = dir.path().join("state.enc");

    encrypt_file(&config, &input, &sealed);

    let envelope = fs::read_to_string(&sealed).unwrap();
    assert!(envelope.contains(r#""method":"aes_gcm""#));
    assert!(envelope.contains(r#""salt""#));
    assert!(!envelope.contains("resources"));

    sealstate()
        .args(["decrypt", "--target", "state", "--config"])
        .arg(&config)
        .arg("--input")
        .arg(&sealed)
        .assert()
        .success()
        .stdout(r#"{"resources":[]}"#);
}

#[test]
fn stdin_to_stdout() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "encryption.json", CONFIG);

    let output = sealstate()
        .args(["encrypt", "-t", "state", "-c"])
        .arg(&config)
        .write_stdin("plaintext from a pipe")
        .output()
        .unwrap();
    assert!(output.status.success());

    sealstate()
        .args(["decrypt", "-t", "state", "-c"])
        .arg(&config)
        .write_stdin(output.stdout)
        .assert()
        .success()
        .stdout("plaintext from a pipe");
}

#[test]
fn validate_lists_targets_and_warnings() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "encryption.json", CONFIG);

    sealstate()
        .args(["validate", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("plan: decrypt only"))
        .stdout(predicate::str::contains("state: encrypt/decrypt"))
        .stderr(predicate::str::contains("Warning: Target can only decrypt"));
}

#[test]
fn validate_fails_on_unknown_plugin_type() {
    let dir = TempDir::new().unwrap();
    let config = write(
        &dir,
        "encryption.json",
        r#"{
            "key_provider": { "vault": { "type": "vault" } },
            "method": { "gcm": { "type": "aes_gcm" } },
            "target": { "state": { "primary": { "key_provider": "vault", "method": "gcm" } } }
        }"#,
    );

    sealstate()
        .args(["validate", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: Invalid encryption pairing"))
        .stderr(predicate::str::contains("unknown key provider type 'vault'"));
}

#[test]
fn malformed_config_file_fails() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "encryption.json", r#"{ "method": { "gcm": { "kind": "aes_gcm" } } }"#);

    sealstate()
        .args(["validate", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid encryption configuration"));
}

#[test]
fn environment_override_configures_encryption() {
    let dir = TempDir::new().unwrap();
    let input = write(&dir, "state.json", "from the environment");
    let sealed = dir.path().join("state.enc");
    let overrides = format!(
        r#"{{
            "key_provider": {{ "env": {{ "type": "static", "config": {{ "key": "{KEY}" }} }} }},
            "method": {{ "chacha": {{ "type": "chacha20_poly1305" }} }},
            "target": {{ "state": {{ "primary": {{ "key_provider": "env", "method": "chacha" }} }} }}
        }}"#
    );

    sealstate()
        .env("TF_ENCRYPTION", &overrides)
        .args(["encrypt", "--target", "state", "--input"])
        .arg(&input)
        .arg("--output")
        .arg(&sealed)
        .assert()
        .success();

    sealstate()
        .env("TF_ENCRYPTION", &overrides)
        .args(["decrypt", "--target", "state", "--input"])
        .arg(&sealed)
        .assert()
        .success()
        .stdout("from the environment");

    sealstate()
        .args(["decrypt", "--target", "state", "--input"])
        .arg(&sealed)
        .assert()
        .failure();
}

#[test]
fn environment_override_replaces_file_target() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "encryption.json", CONFIG);
    let input = write(&dir, "state.json", "rotated");
    let sealed = dir.path().join("state.enc");
    let overrides = format!(
        r#"{{
            "key_provider": {{ "next": {{ "type": "static", "config": {{ "key": "{KEY}" }} }} }},
            "target": {{ "state": {{
                "primary": {{ "key_provider": "next", "method": "aesgcm" }},
                "fallback": [{{ "key_provider": "main", "method": "aesgcm" }}]
            }} }}
        }}"#
    );

    sealstate()
        .env("TF_ENCRYPTION", &overrides)
        .args(["encrypt", "--target", "state", "--config"])
        .arg(&config)
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&sealed)
        .assert()
        .success();

    // A raw key carries no salt, unlike the passphrase key of the file configuration.
    let envelope: serde_json::Value = serde_json::from_slice(&fs::read(&sealed).unwrap()).unwrap();
    assert_eq!(envelope["key_provider"], "static");
    assert!(envelope["meta"].get("salt").is_none());

    // The file configuration alone does not know the new key.
    sealstate()
        .args(["decrypt", "--target", "state", "--config"])
        .arg(&config)
        .arg("--input")
        .arg(&sealed)
        .assert()
        .failure()
        .stderr(predicate::str::contains("could open the data"));
}

#[test]
fn broken_environment_override_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "encryption.json", CONFIG);

    sealstate()
        .env("TF_ENCRYPTION", "{ not json")
        .args(["validate", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("on TF_ENCRYPTION"));
}

#[test]
fn unknown_target_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "encryption.json", CONFIG);

    sealstate()
        .args(["encrypt", "--target", "backup", "--config"])
        .arg(&config)
        .write_stdin("data")
        .assert()
        .failure()
        .stderr(predicate::str::contains("backup"));
}

#[test]
fn toml_file_with_toml_environment_override() {
    let dir = TempDir::new().unwrap();
    let config = write(
        &dir,
        "encryption.toml",
        "[key_provider.main]\ntype = \"static\"\nconfig = { passphrase = \"p\", kdf = { memory_kib = 64, iterations = 1 } }\n\n[method.gcm]\ntype = \"aes_gcm\"\n",
    );
    let overrides = "[target.state.primary]\nkey_provider = \"main\"\nmethod = \"gcm\"\n";

    sealstate()
        .env("TF_ENCRYPTION", overrides)
        .args(["validate", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout("state: encrypt/decrypt\n");
}
