//! Literate Org documents kept in sync with their generated sources.
//!
//! `tanglebox` drives Emacs Org-mode inside a disposable container. A batch
//! tangles documents into source files, detangles edited source files back
//! into their documents, or evaluates every code block of a document. Each
//! batch gets its own sandbox instance with the project folder bound into it,
//! and the instance is removed when the batch ends, whatever the outcome.
//!
//! A change monitor watches a project tree and runs a single-file batch for
//! every modified file, debouncing bursts of notifications for the same path.
//!
//! # Modules
//!
//! - [`api`]: Command entry points used by the binary and by embedders
//! - [`batch`]: Per-folder orchestration of engine actions
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`engine`]: Container engine connection, image, sandbox and exec handling
//! - [`error`]: Semantic error types for the application
//! - [`monitor`]: Debounced filesystem change monitor

pub mod api;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod monitor;
