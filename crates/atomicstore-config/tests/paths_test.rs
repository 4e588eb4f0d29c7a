// Canonical-path loading and environment overrides, run inside figment jails
// so the process environment is restored after each test.

#![cfg(target_os = "linux")]

use atomicstore_config::{
    Config, config_path, load_config, load_config_or_default, save_config,
};
use figment::Jail;
use pretty_assertions::assert_eq;

fn point_xdg_at_jail(jail: &mut Jail) {
    let root = jail.directory().display().to_string();
    jail.set_env("XDG_CONFIG_HOME", &root);
    jail.set_env("HOME", &root);
}

#[test]
fn config_path_follows_xdg_config_home() {
    Jail::expect_with(|jail| {
        point_xdg_at_jail(jail);
        assert_eq!(
            config_path(),
            jail.directory().join("atomicstore").join("config.toml")
        );
        Ok(())
    });
}

#[test]
fn save_then_load_uses_canonical_path() {
    Jail::expect_with(|jail| {
        point_xdg_at_jail(jail);
        let config = Config {
            lockable: false,
            label: "canonical".into(),
        };

        save_config(&config).map_err(|e| e.to_string())?;
        assert!(config_path().is_file());
        assert_eq!(load_config().map_err(|e| e.to_string())?, config);
        Ok(())
    });
}

#[test]
fn environment_overrides_file_values() {
    Jail::expect_with(|jail| {
        point_xdg_at_jail(jail);
        save_config(&Config {
            lockable: true,
            label: "from-file".into(),
        })
        .map_err(|e| e.to_string())?;

        jail.set_env("ATOMICSTORE_LABEL", "from-env");
        jail.set_env("ATOMICSTORE_LOCKABLE", "false");

        assert_eq!(
            load_config().map_err(|e| e.to_string())?,
            Config {
                lockable: false,
                label: "from-env".into(),
            }
        );
        Ok(())
    });
}

#[test]
fn malformed_canonical_file_falls_back_to_defaults() {
    Jail::expect_with(|jail| {
        point_xdg_at_jail(jail);
        let path = config_path();
        std::fs::create_dir_all(path.parent().ok_or("config path has no parent")?)
            .map_err(|e| e.to_string())?;
        std::fs::write(&path, "lockable = \"sometimes\"\n").map_err(|e| e.to_string())?;

        assert!(load_config().is_err());
        assert_eq!(load_config_or_default(), Config::default());
        Ok(())
    });
}

#[test]
fn missing_canonical_file_yields_defaults() {
    Jail::expect_with(|jail| {
        point_xdg_at_jail(jail);
        assert!(!config_path().exists());
        assert_eq!(load_config_or_default(), Config::default());
        Ok(())
    });
}
