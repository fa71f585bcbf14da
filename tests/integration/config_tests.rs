use dedupstore::config::{Config, ENV_PREFIX};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use tempfile::tempdir;

#[test]
fn test_env_overrides_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "version_prefix = \"rev\"\nversion_digits = 3\nverify = false\n",
    )
    .unwrap();

    std::env::set_var("DEDUPSTORE_VERIFY", "true");
    let config: Config = Config::figment(Some(&path)).extract().unwrap();
    std::env::remove_var("DEDUPSTORE_VERIFY");

    assert_eq!(config.version_prefix, "rev");
    assert_eq!(config.version_digits, 3);
    assert!(config.verify);
    assert!(config.skip_zero_len);
}

#[test]
fn test_env_only() {
    std::env::set_var("DEDUPSTORE_REPORT_FREQUENCY", "50");
    std::env::set_var("DEDUPSTORE_SKIP_HIDDEN_DIRS", "true");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .unwrap();

    std::env::remove_var("DEDUPSTORE_REPORT_FREQUENCY");
    std::env::remove_var("DEDUPSTORE_SKIP_HIDDEN_DIRS");

    assert_eq!(config.report_frequency, 50);
    assert!(config.skip_hidden_dirs);
    assert!(!config.skip_hidden_files);
}

#[test]
fn test_load_from_rejects_bad_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "version_digits = \"many\"").unwrap();

    assert!(Config::load_from(&path).is_err());
}

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "verify = true\n").unwrap();

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .extract()
        .unwrap();
    assert!(config.verify);
    assert_eq!(config.version_prefix, "v");
    assert_eq!(config.version_digits, 4);
}
