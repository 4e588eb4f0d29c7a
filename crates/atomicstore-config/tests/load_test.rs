#![allow(clippy::unwrap_used)]

use atomicstore::{Store, StoreConfig};
use atomicstore_config::{Config, ConfigError, load_config_from, save_config_to};
use pretty_assertions::assert_eq;

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn file_values_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "lockable = false\nlabel = \"sessions\"\n").unwrap();

    let config = load_config_from(&path).unwrap();
    assert_eq!(
        config,
        Config {
            lockable: false,
            label: "sessions".into(),
        }
    );
}

#[test]
fn partial_file_keeps_remaining_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "label = \"cache\"\n").unwrap();

    let config = load_config_from(&path).unwrap();
    assert!(config.lockable);
    assert_eq!(config.label, "cache");
}

#[test]
fn malformed_file_is_a_figment_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "lockable = \"sometimes\"\n").unwrap();

    assert!(matches!(
        load_config_from(&path),
        Err(ConfigError::Figment(_))
    ));
}

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("dir").join("config.toml");
    let config = Config {
        lockable: false,
        label: "jobs".into(),
    };

    save_config_to(&config, &path).unwrap();
    assert_eq!(load_config_from(&path).unwrap(), config);
}

#[test]
fn loaded_config_builds_a_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "lockable = false\nlabel = \"orders\"\n").unwrap();

    let store_config = load_config_from(&path).unwrap().to_store_config().unwrap();
    assert_eq!(store_config, StoreConfig::new(false).with_label("orders"));

    let store: Store<u32> = Store::with_config(store_config);
    assert!(!store.is_lockable());
    assert_eq!(store.label(), "orders");
}
