//! # Observability Module
//!
//! Structured logging for the Cairn node: JSON or pretty output with an
//! `EnvFilter` driven level.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cairn_node::observability::init_logging;
//!
//! init_logging("info", false);
//! ```

mod logging;

pub use logging::{init_logging, LogFormat};
