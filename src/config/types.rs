//! Configuration data types for tanglebox.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

use crate::error::ConfigError;

/// Image tag used when no `image` is configured.
pub const DEFAULT_IMAGE: &str = "localbuild:tanglebox";

/// Sandbox instance configuration.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Name given to the ephemeral sandbox instance.
    #[default = "tanglebox"]
    pub instance_name: String,

    /// Path inside the sandbox where the project folder is mounted.
    #[default(Utf8PathBuf::from("/mnt/org"))]
    pub mount_path: Utf8PathBuf,

    /// Directory holding the `Dockerfile` used to build a missing image.
    #[default(Utf8PathBuf::from("."))]
    pub build_context: Utf8PathBuf,

    /// Force-remove a stale instance with the same name before creating one.
    pub remove_stale: bool,
}

/// Literate document configuration.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Extension (without the dot) that marks a literate document.
    #[default = "org"]
    pub extension: String,
}

/// Document-processing engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable inside the sandbox.
    #[default = "emacs"]
    pub program: String,

    /// Emacs Lisp forms evaluated before every engine action.
    #[default(default_preamble())]
    pub preamble: Vec<String>,

    /// Output fragments that mark an engine-level failure.
    #[default(default_failure_markers())]
    pub failure_markers: Vec<String>,
}

/// Change monitor configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds during which repeated changes to one file are suppressed.
    #[default = 5]
    pub debounce_secs: u64,
}

impl MonitorConfig {
    /// Return the debounce retention interval.
    #[must_use]
    pub const fn debounce_interval(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `TANGLEBOX_CONFIG_PATH` environment variable
/// 2. `.tanglebox.toml` in the current working directory
/// 3. `.tanglebox.toml` in the home directory
/// 4. `~/.config/tanglebox/config.toml` (XDG default)
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "TANGLEBOX",
    post_merge_hook,
    discovery(
        app_name = "tanglebox",
        env_var = "TANGLEBOX_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".tanglebox.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// The container engine socket path or URL.
    pub engine_socket: Option<String>,

    /// The sandbox image tag.
    pub image: Option<String>,

    /// Sandbox instance configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub sandbox: SandboxConfig,

    /// Literate document configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub document: DocumentConfig,

    /// Engine configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub engine: EngineConfig,

    /// Change monitor configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub monitor: MonitorConfig,
}

impl AppConfig {
    /// Return the configured image tag, falling back to [`DEFAULT_IMAGE`].
    #[must_use]
    pub fn image_tag(&self) -> &str {
        self.image
            .as_deref()
            .map(str::trim)
            .filter(|image| !image.is_empty())
            .unwrap_or(DEFAULT_IMAGE)
    }

    /// Validate values that the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when a required string is empty
    /// and `ConfigError::InvalidValue` when a value is out of range.
    pub fn validate(&self) -> crate::error::Result<()> {
        let required = [
            ("sandbox.instance_name", self.sandbox.instance_name.as_str()),
            ("document.extension", self.document.extension.as_str()),
            ("engine.program", self.engine.program.as_str()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ConfigError::MissingRequired {
                field: String::from(*field),
            }
            .into());
        }

        if self.document.extension.starts_with('.') {
            return Err(invalid("document.extension", "must not start with a dot"));
        }
        if !self.sandbox.mount_path.is_absolute() {
            return Err(invalid("sandbox.mount_path", "must be an absolute path"));
        }
        if self.monitor.debounce_secs == 0 {
            return Err(invalid("monitor.debounce_secs", "must be greater than zero"));
        }
        Ok(())
    }
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        self.document.extension = self.document.extension.trim().to_owned();
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> crate::error::TangleboxError {
    ConfigError::InvalidValue {
        field: String::from(field),
        reason: String::from(reason),
    }
    .into()
}

fn default_preamble() -> Vec<String> {
    [
        "(require 'org)",
        "(setq make-backup-files nil)",
        "(setq python-indent-guess-indent-offset t)",
        "(setq python-indent-guess-indent-offset-verbose nil)",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_failure_markers() -> Vec<String> {
    [
        "Debugger entered",
        "Lisp error",
        "Symbol's function definition is void",
        "Symbol\u{2019}s function definition is void",
        "Wrong type argument",
        "Cannot open load file",
        "No such file or directory",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
