//! Configuration loading with layered precedence.
//!
//! This module loads configuration with the precedence order (lowest to
//! highest): application defaults, configuration file, environment variables,
//! command-line arguments.
//!
//! Layers are composed manually with `MergeComposer` because the `Cli` struct
//! owns subcommand dispatch, while `AppConfig` only holds configuration values.
//! Manual composition also lets the environment layer fail fast: typed
//! variables such as `TANGLEBOX_SANDBOX_REMOVE_STALE=maybe` return an error
//! rather than silently falling back to defaults.
//!
//! String fields (e.g., `TANGLEBOX_ENGINE_SOCKET`) are always accepted.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli, Commands, MonitorArgs};
use crate::error::{ConfigError, Result};

// ============================================================================
// Environment Variable Specification Table
// ============================================================================

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Boolean value (`true`/`false`). Invalid values return an error.
    Bool,
    /// Unsigned 64-bit integer. Invalid values return an error.
    U64,
}

/// Specification for a single environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name (e.g., `TANGLEBOX_ENGINE_SOCKET`).
    env_var: &'static str,
    /// The JSON path segments (e.g., `["sandbox", "remove_stale"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

/// Table of all environment variables and their JSON paths.
const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    // Top-level fields
    EnvVarSpec {
        env_var: "TANGLEBOX_ENGINE_SOCKET",
        path: &["engine_socket"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "TANGLEBOX_IMAGE",
        path: &["image"],
        var_type: EnvVarType::String,
    },
    // Sandbox fields
    EnvVarSpec {
        env_var: "TANGLEBOX_SANDBOX_INSTANCE_NAME",
        path: &["sandbox", "instance_name"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "TANGLEBOX_SANDBOX_MOUNT_PATH",
        path: &["sandbox", "mount_path"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "TANGLEBOX_SANDBOX_BUILD_CONTEXT",
        path: &["sandbox", "build_context"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "TANGLEBOX_SANDBOX_REMOVE_STALE",
        path: &["sandbox", "remove_stale"],
        var_type: EnvVarType::Bool,
    },
    // Document fields
    EnvVarSpec {
        env_var: "TANGLEBOX_DOCUMENT_EXTENSION",
        path: &["document", "extension"],
        var_type: EnvVarType::String,
    },
    // Engine fields
    EnvVarSpec {
        env_var: "TANGLEBOX_ENGINE_PROGRAM",
        path: &["engine", "program"],
        var_type: EnvVarType::String,
    },
    // Monitor fields
    EnvVarSpec {
        env_var: "TANGLEBOX_MONITOR_DEBOUNCE_SECS",
        path: &["monitor", "debounce_secs"],
        var_type: EnvVarType::U64,
    },
];

/// Returns the list of environment variable names recognised by the config loader.
///
/// This is primarily useful for tests that need to clear all `TANGLEBOX_*` environment
/// variables to ensure isolation. Using this function instead of a hard-coded list
/// ensures the test stays in sync with the loader's actual environment variable
/// mappings.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Load a configuration file and push it to the composer.
///
/// Uses `cap_std::fs_utf8` for capability-oriented filesystem access as per
/// project conventions. The function opens the parent directory of the config
/// file and reads from there.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    // Open the parent directory using ambient authority, then read the file.
    let current_dir = Utf8PathBuf::from(".");
    let parent = path.parent().unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Load configuration with full layer precedence.
///
/// This function loads configuration from all available sources:
/// 1. Application defaults defined in the struct
/// 2. Configuration file (discovered via XDG paths or `TANGLEBOX_CONFIG_PATH`)
/// 3. Environment variables prefixed with `TANGLEBOX_`
/// 4. Command-line arguments (from the provided `Cli`)
///
/// Later sources override earlier ones.
///
/// # Errors
///
/// Returns `ConfigError` if configuration loading fails due to:
/// - Malformed configuration files
/// - Invalid typed environment variable values (e.g., non-boolean for
///   `TANGLEBOX_SANDBOX_REMOVE_STALE`)
/// - An explicit `--config` path that does not exist
/// - Values rejected by [`AppConfig::validate`]
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    // Layer 1: Defaults (serialised from AppConfig::default()).
    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    // Layer 2: Configuration file.
    // An explicit --config path must exist; otherwise discover via XDG paths.
    let config_path: Option<Utf8PathBuf> = match cli.config.clone() {
        Some(path) if !path.exists() => {
            return Err(ConfigError::FileNotFound {
                path: path.into_std_path_buf(),
            }
            .into());
        }
        Some(path) => Some(path),
        None => {
            let discovery = ConfigDiscovery::builder("tanglebox")
                .env_var("TANGLEBOX_CONFIG_PATH")
                .config_file_name("config.toml")
                .dotfile_name(".tanglebox.toml")
                .build();
            discovery
                .candidates()
                .into_iter()
                .filter(|p| p.exists())
                .find_map(|p| Utf8PathBuf::try_from(p).ok())
        }
    };

    if let Some(ref path) = config_path {
        load_config_file(path, &mut composer)?;
    }

    // Layer 3: Environment variables.
    let env_values = collect_env_vars()?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    // Layer 4: CLI overrides.
    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    // Merge all layers into the final configuration.
    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.validate()?;

    Ok(config)
}

/// Collect environment variables with the `TANGLEBOX_` prefix into a JSON value.
///
/// This function uses a data-driven approach: all environment variable mappings
/// are defined in [`ENV_VAR_SPECS`]. Adding or changing mappings requires only
/// a single-line change in that table.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if a typed environment variable (bool, u64)
/// has an unparseable value. This fail-fast approach ensures misconfigurations are
/// visible to users.
fn collect_env_vars() -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Ok(raw_value) = std::env::var(spec.env_var) else {
            continue;
        };

        // Parse the value according to its expected type.
        // Invalid values return an error immediately (fail-fast).
        let json_value = match spec.var_type {
            EnvVarType::String => Value::String(raw_value),
            EnvVarType::Bool => match raw_value.parse::<bool>() {
                Ok(b) => Value::Bool(b),
                Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        field: spec.env_var.to_owned(),
                        reason: format!("expected bool (true/false), got '{raw_value}'"),
                    }
                    .into());
                }
            },
            EnvVarType::U64 => match raw_value.parse::<u64>() {
                Ok(n) => Value::Number(n.into()),
                Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        field: spec.env_var.to_owned(),
                        reason: format!("expected unsigned integer, got '{raw_value}'"),
                    }
                    .into());
                }
            },
        };

        // Insert at the appropriate path (supports arbitrary nesting depth).
        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

/// Insert a value at a nested path in a JSON map.
///
/// For a path like `["sandbox", "remove_stale"]`, this creates the intermediate
/// `sandbox` object if needed and inserts `remove_stale` within it.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    // Navigate to the parent object, creating intermediate objects as needed.
    let mut current = root;
    for &segment in parents {
        // Ensure the entry is an object; if it's not (shouldn't happen with our
        // controlled path specs), skip this insertion.
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    // Insert the final field.
    current.insert(field.to_owned(), value);
}

/// Build a JSON value containing CLI overrides.
fn build_cli_overrides(cli: &Cli) -> serde_json::Value {
    let mut overrides = serde_json::Map::new();

    if let Some(ref socket) = cli.engine_socket {
        overrides.insert(
            "engine_socket".to_owned(),
            serde_json::Value::String(socket.clone()),
        );
    }

    if let Some(ref image) = cli.image {
        overrides.insert("image".to_owned(), serde_json::Value::String(image.clone()));
    }

    if let Commands::Monitor(MonitorArgs {
        debounce_secs: Some(secs),
        ..
    }) = cli.command
    {
        let mut monitor = serde_json::Map::new();
        monitor.insert("debounce_secs".to_owned(), serde_json::Value::from(secs));
        overrides.insert("monitor".to_owned(), serde_json::Value::Object(monitor));
    }

    if overrides.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::Value::Object(overrides)
    }
}
