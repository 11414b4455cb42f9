//! Configuration system for tanglebox.
//!
//! This module provides the configuration structures and CLI definitions for the
//! tanglebox application. Configuration loading and precedence merging is
//! handled by the `ortho_config` crate: CLI flags override environment
//! variables, which override configuration files, which override defaults.
//!
//! The configuration file is expected at `~/.config/tanglebox/config.toml` by
//! default.
//!
//! # Example Configuration
//!
//! ```toml
//! engine_socket = "unix:///run/user/1000/podman/podman.sock"
//! image = "localbuild:tanglebox"
//!
//! [sandbox]
//! instance_name = "tanglebox"
//! mount_path = "/mnt/org"
//! build_context = "/home/user/.config/tanglebox/image"
//! remove_stale = false
//!
//! [document]
//! extension = "org"
//!
//! [engine]
//! program = "emacs"
//!
//! [monitor]
//! debounce_secs = 5
//! ```

mod cli;
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{BatchArgs, Cli, Commands, MonitorArgs};
pub use loader::{env_var_names, load_config};
pub use types::{
    AppConfig, DEFAULT_IMAGE, DocumentConfig, EngineConfig, MonitorConfig, SandboxConfig,
};
