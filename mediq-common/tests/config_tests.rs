//! Configuration loading and root folder resolution tests
//!
//! Tests that manipulate MEDIQ_* environment variables are marked #[serial]
//! so they do not race each other.

use mediq_common::config::{
    ensure_root_folder, load_or_default, load_toml_config, resolve_config_path, resolve_root_folder,
    write_toml_config, BootstrapConfig, LoggingConfig, CONFIG_ENV_VAR, ROOT_FOLDER_ENV_VAR,
};
use mediq_common::Error;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_bootstrap_defaults() {
    let config = BootstrapConfig::default();
    assert_eq!(config.port, 5731);
    assert_eq!(config.database_path, PathBuf::from("mediq.db"));
    assert_eq!(config.logging.level, "info");
    assert!(config.root_folder.is_none());
}

#[test]
fn test_partial_toml_fills_defaults() {
    let config: BootstrapConfig = toml::from_str("port = 8080\n").unwrap();
    assert_eq!(config.port, 8080);
    assert_eq!(config.database_path, PathBuf::from("mediq.db"));
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_database_path_relative_to_root() {
    let config = BootstrapConfig::default();
    let resolved = config.database_path_in(Path::new("/srv/mediq"));
    assert_eq!(resolved, PathBuf::from("/srv/mediq/mediq.db"));

    let absolute = BootstrapConfig {
        database_path: PathBuf::from("/var/db/content.db"),
        ..BootstrapConfig::default()
    };
    assert_eq!(
        absolute.database_path_in(Path::new("/srv/mediq")),
        PathBuf::from("/var/db/content.db")
    );
}

#[test]
fn test_write_then_load_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("mediq-ei.toml");

    let config = BootstrapConfig {
        database_path: PathBuf::from("content.db"),
        port: 6000,
        root_folder: Some(PathBuf::from("/data")),
        logging: LoggingConfig {
            level: "debug".to_string(),
            file: None,
        },
    };
    write_toml_config(&config, &path).unwrap();

    let loaded: BootstrapConfig = load_toml_config(&path).unwrap();
    assert_eq!(loaded.port, 6000);
    assert_eq!(loaded.logging.level, "debug");
    assert_eq!(loaded.root_folder, Some(PathBuf::from("/data")));
    assert!(!path.with_extension("toml.tmp").exists());
}

#[test]
fn test_missing_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent.toml");
    let config: BootstrapConfig = load_or_default(Some(&path)).unwrap();
    assert_eq!(config.port, 5731);
}

#[test]
fn test_malformed_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "port = \"not a number\"").unwrap();

    let result: mediq_common::Result<BootstrapConfig> = load_or_default(Some(&path));
    assert!(matches!(result, Err(Error::ConfigParse { .. })));
}

#[test]
#[serial]
fn test_cli_config_path_wins_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");
    let resolved = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")), "mediq-ei");
    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-cli.toml")));

    let resolved = resolve_config_path(None, "mediq-ei");
    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-env.toml")));
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_root_folder_priority() {
    env::remove_var(ROOT_FOLDER_ENV_VAR);

    let from_config = resolve_root_folder(None, Some(Path::new("/cfg/root")));
    assert_eq!(from_config, PathBuf::from("/cfg/root"));

    env::set_var(ROOT_FOLDER_ENV_VAR, "/env/root");
    let from_env = resolve_root_folder(None, Some(Path::new("/cfg/root")));
    assert_eq!(from_env, PathBuf::from("/env/root"));

    let from_cli = resolve_root_folder(Some(Path::new("/cli/root")), Some(Path::new("/cfg/root")));
    assert_eq!(from_cli, PathBuf::from("/cli/root"));
    env::remove_var(ROOT_FOLDER_ENV_VAR);

    let fallback = resolve_root_folder(None, None);
    assert!(!fallback.as_os_str().is_empty());
}

#[test]
fn test_ensure_root_folder_creates_and_rejects_files() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("data").join("mediq");
    ensure_root_folder(&root).unwrap();
    assert!(root.is_dir());

    let file = temp_dir.path().join("not-a-dir");
    std::fs::write(&file, "x").unwrap();
    assert!(matches!(
        ensure_root_folder(&file),
        Err(Error::RootFolderNotDirectory(_))
    ));
}
