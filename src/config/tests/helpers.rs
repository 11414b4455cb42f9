//! Shared fixtures and helper functions for config tests.

use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::MergeComposer;
use ortho_config::serde_json::json;
use rstest::fixture;

use crate::config::AppConfig;

/// Fixture providing an `AppConfig` parsed from a full TOML example.
#[fixture]
pub fn app_config_from_full_toml() -> AppConfig {
    let toml = r#"
        engine_socket = "unix:///run/podman/podman.sock"
        image = "ghcr.io/example/org-sandbox:latest"

        [sandbox]
        instance_name = "notes-sandbox"
        mount_path = "/mnt/notes"
        build_context = "/opt/tanglebox/image"
        remove_stale = true

        [document]
        extension = "org"

        [engine]
        program = "emacs-29"
        preamble = ["(require 'org)"]
        failure_markers = ["Lisp error"]

        [monitor]
        debounce_secs = 2
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Fixture providing an `AppConfig` parsed from a minimal TOML example.
#[fixture]
pub fn app_config_from_partial_toml() -> AppConfig {
    let toml = r#"
        engine_socket = "unix:///tmp/docker.sock"
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = ortho_config::serde_json::to_value(AppConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Creates a composer with defaults, a file layer and an environment layer.
pub fn create_composer_with_file_and_env() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = create_composer_with_defaults()?;
    composer.push_file(
        json!({
            "engine_socket": "unix:///from/file.sock",
            "image": "file-image:latest",
            "monitor": { "debounce_secs": 9 }
        }),
        Some(Utf8PathBuf::from("/tmp/config.toml")),
    );
    composer.push_environment(json!({
        "engine_socket": "unix:///from/env.sock",
        "monitor": { "debounce_secs": 3 }
    }));
    Ok(composer)
}

/// Helper: Merges layers from a composer into `AppConfig`.
pub fn merge_config(composer: MergeComposer) -> Result<AppConfig, Arc<ortho_config::OrthoError>> {
    AppConfig::merge_from_layers(composer.layers())
}

/// Helper: Asserts that a config carries the application defaults.
pub fn assert_config_has_defaults(config: &AppConfig) {
    assert!(config.engine_socket.is_none(), "engine_socket should be None");
    assert!(config.image.is_none(), "image should be None");
    assert_eq!(config.sandbox.instance_name, "tanglebox");
    assert_eq!(config.sandbox.mount_path, Utf8PathBuf::from("/mnt/org"));
    assert!(!config.sandbox.remove_stale, "remove_stale should be false");
    assert_eq!(config.document.extension, "org");
    assert_eq!(config.engine.program, "emacs");
    assert_eq!(config.monitor.debounce_secs, 5);
}
