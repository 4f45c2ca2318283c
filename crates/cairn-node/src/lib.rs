//! # Cairn Node
//!
//! Runs the Cairn control plane: loads [`settings::Settings`], builds the
//! repository registry, permission resolver and federation component
//! once, and drives the background tasks that keep them current.
//!
//! ## Modules
//!
//! - [`settings`] - YAML file and `CAIRN_` environment settings
//! - [`observability`] - Structured logging
//! - [`scheduler`] - Periodic background tasks
//!
//! ## Example
//!
//! ```rust,no_run
//! use cairn_node::{settings::Settings, Node};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let settings = Settings::load(None)?;
//! let node = Node::build(settings)?;
//! let scheduler = node.start()?;
//! tokio::signal::ctrl_c().await?;
//! scheduler.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod node;
pub mod observability;
pub mod scheduler;
pub mod settings;

pub use node::{GcTask, Node, PullTask, FEDERATION_STARTUP_DELAY, FEDERATION_TICK};
