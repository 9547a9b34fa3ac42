/// Integration tests for YAML configuration loading.
#[path = "../src/config.rs"]
mod config;

use config::Settings;
use std::io::Write;
use tempfile::NamedTempFile;

fn yaml_file(contents: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().expect("tempfile");
    f.write_all(contents.as_bytes()).expect("write yaml");
    f
}

#[test]
fn missing_file_yields_defaults() {
    let settings = Settings::from_file("/definitely/not/here.yaml").unwrap();
    assert_eq!(settings.feed.max_visible_positions, 5);
    assert_eq!(settings.feed.tick_interval_ms, 100);
    assert_eq!(settings.throttle.daily_trades_min_interval_ms, 15_000);
    assert!((settings.feed.backfill_probability - 0.3).abs() < 1e-12);
}

#[test]
fn partial_yaml_overrides_only_named_fields() {
    let f = yaml_file(
        "feed:\n  max_visible_positions: 3\n  seed: 99\napi:\n  base_url: https://example.test/api\n",
    );
    let settings = Settings::from_file(f.path().to_str().unwrap()).unwrap();
    assert_eq!(settings.feed.max_visible_positions, 3);
    assert_eq!(settings.feed.seed, Some(99));
    assert_eq!(settings.feed.snap_progress, 0.98);
    assert_eq!(settings.api.base_url, "https://example.test/api");
    assert_eq!(settings.api.daily_trades_path, "/daily-trades");
    assert!(settings.validate().is_ok());
}

#[test]
fn token_is_never_read_from_yaml() {
    let f = yaml_file("api_token: leaked\n");
    let settings = Settings::from_file(f.path().to_str().unwrap()).unwrap();
    assert!(settings.api_token.is_none());
    assert!(!settings.has_credentials());
}

#[test]
fn malformed_yaml_is_an_error() {
    let f = yaml_file("feed: [not, a, map\n");
    assert!(Settings::from_file(f.path().to_str().unwrap()).is_err());
}

#[test]
fn invalid_values_fail_validation() {
    let f = yaml_file("feed:\n  backfill_probability: -0.1\n");
    let settings = Settings::from_file(f.path().to_str().unwrap()).unwrap();
    assert!(settings.validate().is_err());
}
