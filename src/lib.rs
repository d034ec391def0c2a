//! Usage Overlay Engine
//!
//! State synchronization engine for an in-page overlay that tracks per-model
//! token usage in a chat application and estimates remaining capacity. The
//! crate owns the logic with real ordering and state-machine concerns; the
//! page it reads and the background service it talks to are external
//! collaborators behind traits.
//!
//! ## Core Guarantees
//!
//! - **Singleton bootstrap**: at most one live engine per page session,
//!   guarded both process-wide and through a marker on the page itself
//! - **Ordered updates**: usage snapshots arriving before the presentation
//!   exists are queued and replayed in arrival order, each to completion
//! - **Safe detection**: inferring the active model never fails; missing page
//!   state falls back to the `default` model
//! - **Single active section**: exactly one model section is active at a
//!   time, matching the currently displayed model
//!
//! ## Architecture Overview
//!
//! - [`engine`] - bootstrap guard, poll loop, and collaborator message
//!   handling
//! - [`overlay`] - section state machine and the update pipeline deriving all
//!   displayed values
//! - [`detect`] - active-model detection from the rendered page
//! - [`page`] - host page abstraction and bounded element waiting
//! - [`background`] - request/response protocol with the background service
//! - [`storage`] - persistence proxy (collapsed flag, version marker)
//! - [`models`] - usage snapshots and the model catalog
//! - [`format`] - countdowns, token grouping, and the cost-line reverse parse
//! - [`config`] - local ambient settings and the collaborator-supplied
//!   remote configuration
//! - [`logging`] - structured logging with JSON and pretty-print formats
//! - [`testkit`] - scripted page and collaborator fixtures
//!
//! ## Main Entry Point
//!
//! ```rust
//! use usage_overlay::engine::{EngineMessage, OverlayEngine, ProcessFlag};
//! use usage_overlay::testkit::{sample_page, sample_remote_config, ScriptedBackground};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let page = sample_page();
//! let background = ScriptedBackground::new(sample_remote_config());
//! let flag = ProcessFlag::new();
//!
//! let (tx, rx) = tokio::sync::mpsc::channel::<EngineMessage>(100);
//! if let Some(engine) = OverlayEngine::bootstrap(page, background, &flag).await? {
//!     tokio::spawn(engine.run(rx));
//! }
//! # drop(tx);
//! # Ok(())
//! # }
//! ```

pub mod background;
pub mod config;
pub mod detect;
pub mod engine;
pub mod format;
pub mod logging;
pub mod models;
pub mod overlay;
pub mod page;
pub mod storage;
pub mod testkit;

pub use engine::{EngineMessage, OverlayEngine, ProcessFlag};
pub use models::{ModelCatalog, ModelUsage, UsageSnapshot};
