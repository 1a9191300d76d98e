use fmrepo_core::{Config, FmError, RepositoryRegistry, RepositoryTarget};
use std::fs;
use std::path::PathBuf;

const SITE_CONFIG: &str = r#"
default:
  development: /sites/dev
  test: "<tmp>"
places:
  production: /srv/places
  staging: ~
"#;

#[test]
fn load_yaml_reads_role_environment_targets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".fmrepo.yml");
    fs::write(&path, SITE_CONFIG).unwrap();

    let mut config = Config::new();
    config.load_yaml(&path).unwrap();

    assert_eq!(
        config.target("default", "development"),
        Some(&RepositoryTarget::Path(PathBuf::from("/sites/dev")))
    );
    assert_eq!(
        config.target("default", "test"),
        Some(&RepositoryTarget::Temporary)
    );
    assert_eq!(
        config.target("places", "production"),
        Some(&RepositoryTarget::Path(PathBuf::from("/srv/places")))
    );
    assert_eq!(config.target("places", "staging"), None);
    assert_eq!(config.roles().collect::<Vec<_>>(), vec!["default", "places"]);
}

#[test]
fn load_yaml_merges_into_existing_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("site.yml");
    fs::write(&path, SITE_CONFIG).unwrap();

    let mut config = Config::new()
        .with("default", "development", "/old/dev")
        .with("default", "qa", "/sites/qa");
    config.load_yaml(&path).unwrap();

    assert_eq!(
        config.target("default", "development"),
        Some(&RepositoryTarget::Path(PathBuf::from("/sites/dev")))
    );
    assert_eq!(
        config.target("default", "qa"),
        Some(&RepositoryTarget::Path(PathBuf::from("/sites/qa")))
    );
    assert_eq!(config.environments("default").map(|envs| envs.len()), Some(3));
}

#[test]
fn missing_file_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::new().with("default", "test", "/sites/test");

    config.load_yaml(dir.path().join("absent.yml")).unwrap();

    assert_eq!(config, Config::new().with("default", "test", "/sites/test"));
}

#[test]
fn syntax_errors_and_bad_targets_are_configuration_errors() {
    let dir = tempfile::tempdir().unwrap();
    let broken = dir.path().join("broken.yml");
    fs::write(&broken, "default: [unclosed\n").unwrap();
    let numeric = dir.path().join("numeric.yml");
    fs::write(&numeric, "default:\n  test: 42\n").unwrap();

    let err = Config::new().load_yaml(&broken).map(|_| ()).unwrap_err();
    assert!(matches!(err, FmError::Configuration(_)));
    assert!(err.to_string().contains("broken.yml"));

    let err = Config::new().load_yaml(&numeric).map(|_| ()).unwrap_err();
    assert!(matches!(err, FmError::Configuration(_)));
    assert!(err.to_string().contains("number"));
}

#[test]
fn loaded_config_drives_registry_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let site = dir.path().join("site");
    let path = dir.path().join(".fmrepo.yml");
    fs::write(
        &path,
        format!("default:\n  test: {}\n  ci: \"<tmp>\"\n", site.display()),
    )
    .unwrap();

    let mut config = Config::new();
    config.load_yaml(&path).unwrap();
    let registry = RepositoryRegistry::new(config);

    assert_eq!(registry.fetch("default", "test").unwrap().root(), site.as_path());
    let temporary = registry.fetch("default", "ci").unwrap();
    assert!(temporary.root().is_dir());
    registry.reset();
    assert!(!temporary.root().exists());
}
