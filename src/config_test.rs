//! Tests for [`RunConfiguration`] and [`InheritedBool`].

use crate::config::{InheritedBool, RunConfiguration};
use crate::error::ConfigError;
use tempfile::TempDir;

#[test]
fn test_inherited_bool_resolve() {
  assert!(InheritedBool::Inherit.resolve(true));
  assert!(!InheritedBool::Inherit.resolve(false));
  assert!(InheritedBool::Enable.resolve(false));
  assert!(!InheritedBool::Disable.resolve(true));
}

#[test]
fn test_default_is_valid() {
  let config = RunConfiguration::default();
  assert!(config.validate().is_ok());
  assert!(config.load_from_cache);
  assert!(!config.store_to_disk);
  assert_eq!(config.num_threads, 1);
}

#[test]
fn test_validate_rejects_zero_threads() {
  let config = RunConfiguration::default().with_num_threads(0);
  assert!(matches!(config.validate(), Err(ConfigError::InvalidThreadCount(0))));
}

#[test]
fn test_validate_requires_output_path_for_disk() {
  let config = RunConfiguration::default().with_store_to_disk(true);
  assert!(matches!(config.validate(), Err(ConfigError::MissingOutputPath)));
}

#[test]
fn test_node_exclusions() {
  let config = RunConfiguration::default()
    .with_output_path("/tmp/out")
    .with_store_to_cache(true)
    .with_disabled_store_to_cache("a")
    .with_disabled_store_to_disk("b");
  assert!(!config.stores_to_cache(&"a".into()));
  assert!(config.stores_to_cache(&"b".into()));
  assert!(config.stores_to_disk(&"a".into()));
  assert!(!config.stores_to_disk(&"b".into()));
}

#[test]
fn test_json_file_round_trip() {
  let dir = TempDir::new().unwrap();
  let path = dir.path().join("config.json");
  let config = RunConfiguration::default()
    .with_output_path(dir.path().join("out"))
    .with_continue_on_failure(InheritedBool::Enable)
    .with_disabled_store_to_disk("preview");
  config.save_json_file(&path).unwrap();
  assert_eq!(RunConfiguration::from_json_file(&path).unwrap(), config);
}

#[test]
fn test_missing_fields_take_defaults() {
  let config: RunConfiguration = serde_json::from_str(r#"{ "num_threads": 4, "silent": true }"#).unwrap();
  assert_eq!(config.num_threads, 4);
  assert!(config.silent);
  assert!(config.load_from_cache);
  assert_eq!(config.continue_on_failure, InheritedBool::Inherit);
}

#[test]
fn test_from_missing_file_fails() {
  let dir = TempDir::new().unwrap();
  assert!(matches!(
    RunConfiguration::from_json_file(dir.path().join("missing.json")),
    Err(ConfigError::Io(_))
  ));
}
