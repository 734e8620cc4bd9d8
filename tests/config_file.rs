//! Integration tests for loading configuration files from disk.
//!
//! Environment access goes through `Config::resolve_with` with a closure,
//! so these tests never touch global process state.

use std::collections::HashMap;
use std::io::Write;

use msgbridge::config::{Config, ConfigError, KeySource, Overrides, Preset, RawConfig};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[test]
fn test_load_zai_file_with_expanded_key() {
    let file = write_config(
        r#"
        [provider]
        preset = "zai"
        api_key = "${ZAI_TOKEN}"

        [auth]
        required = true
        token = "${PROXY_SECRET}"
        "#,
    );

    let raw = RawConfig::from_file(file.path()).unwrap();
    let (config, source) = Config::resolve_with(
        raw,
        &Overrides::default(),
        lookup(&[("ZAI_TOKEN", "z-123"), ("PROXY_SECRET", "p-456")]),
    )
    .unwrap();

    assert_eq!(config.provider.name, "Z.AI");
    assert_eq!(config.provider.url, "https://api.z.ai/api/paas/v4");
    assert_eq!(
        config.provider.completions_url(),
        "https://api.z.ai/api/paas/v4/chat/completions"
    );
    assert_eq!(config.server.listen_addr(), "127.0.0.1:9000");
    assert_eq!(config.provider.api_key.expose_secret(), "z-123");
    assert_eq!(source, KeySource::EnvExpanded);
    assert_eq!(config.auth.enforced_token(), Some("p-456"));
}

#[test]
fn test_cli_overrides_win_over_file() {
    let file = write_config(
        r#"
        [server]
        port = 7000

        [provider]
        preset = "zai"
        api_key = "literal-key"
        "#,
    );

    let overrides = Overrides {
        preset: Some(Preset::Custom),
        name: Some("Local".to_string()),
        url: Some("http://localhost:8000/v1".to_string()),
        port: Some(7100),
        ..Default::default()
    };
    let raw = RawConfig::from_file(file.path()).unwrap();
    let (config, source) = Config::resolve_with(raw, &overrides, lookup(&[])).unwrap();

    assert_eq!(config.provider.name, "Local");
    assert_eq!(config.provider.url, "http://localhost:8000/v1");
    assert_eq!(config.server.port, 7100);
    assert_eq!(source, KeySource::Literal);
}

#[test]
fn test_missing_env_reference_fails() {
    let file = write_config(
        r#"
        [provider]
        api_key = "${NOT_SET_ANYWHERE}"
        "#,
    );

    let raw = RawConfig::from_file(file.path()).unwrap();
    let err = Config::resolve_with(raw, &Overrides::default(), lookup(&[])).unwrap_err();
    match err {
        ConfigError::EnvVar { var, field, .. } => {
            assert_eq!(var, "NOT_SET_ANYWHERE");
            assert_eq!(field, "provider.api_key");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_invalid_toml_fails() {
    let file = write_config("[provider\nname = ");
    let err = RawConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = Config::load(Some(path.as_path()), &Overrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn test_shipped_example_config_loads() {
    let raw = RawConfig::from_file("msgbridge.example.toml").unwrap();
    let (config, source) =
        Config::resolve_with(raw, &Overrides::default(), lookup(&[("XAI_API_KEY", "xai-key")]))
            .unwrap();

    assert_eq!(config.provider.name, "X.AI");
    assert_eq!(config.server.port, 9001);
    assert_eq!(source, KeySource::EnvExpanded);
    assert!(config.auth.enforced_token().is_none());
}
