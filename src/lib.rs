//! # Protocol Wizard
//!
//! LLM-backed stages for drafting a systematic-review protocol, with
//! retried provider calls, deterministic fallbacks and reproducible freezing.
//!
//! The wizard runs four stages over one shared [`WizardCtx`]:
//!
//! - **draft** turns a free-text subject into a [`Protocol`];
//! - **refine** sharpens its screening criteria into [`Refinements`];
//! - **queries** writes one native search query per source;
//! - **freeze** merges the refinements, canonicalizes the document and
//!   stamps it with a SHA-256 [`Manifest`].
//!
//! The first three call a model through the [`Dispatcher`], which routes a
//! `provider:model` string to an [`Adapter`](backend::Adapter) and retries
//! failures with backoff. When a call fails or its output is unusable, the
//! stage substitutes a fixed fallback document instead of failing; the
//! outcome's `from_fallback` flag says which happened.
//!
//! ## Core Concepts
//!
//! - **[`Dispatcher`]**: retrying call entry point over an
//!   [`AdapterRegistry`](backend::AdapterRegistry). Never returns an error;
//!   failures are reported in the [`CallResult`].
//! - **[`WizardCtx`]**: settings, dispatcher, prompt templates and an
//!   optional [`EventHandler`].
//! - **[`normalize`]**: fence stripping and JSON / JSON-Lines recovery for
//!   messy model output.
//! - **[`canonical`]**: sorted-key JSON text and its SHA-256 digest.
//!
//! ## Quick Start
//!
//! ```no_run
//! use protocol_wizard::protocol::{DraftRequest, FreezeRequest, RefineRequest};
//! use protocol_wizard::{stages, freeze, Settings, WizardCtx};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = WizardCtx::from_settings(Settings::load()?);
//!
//!     let draft = stages::draft(
//!         &ctx,
//!         DraftRequest::new("Plant disease detection under lab-to-field domain shift"),
//!     )
//!     .await?;
//!     let refined = stages::refine(&ctx, RefineRequest {
//!         protocol: draft.protocol.clone(),
//!         model: None,
//!     })
//!     .await?;
//!
//!     let frozen = freeze(FreezeRequest {
//!         protocol: draft.protocol,
//!         refinements: Some(refined.refinements),
//!     })?;
//!     println!("{}", frozen.manifest.protocol_sha256);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod canonical;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod fallback;
pub mod freeze;
pub mod model;
pub mod normalize;
pub mod prompt;
pub mod protocol;
pub mod stages;
pub mod telemetry;
pub mod types;

pub use backend::{AdapterRegistry, BackoffConfig, GeminiAdapter, MockAdapter, OpenAiAdapter};
pub use config::{CallConfig, Credentials, Settings};
pub use context::{WizardCtx, WizardCtxBuilder};
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use events::{Event, EventHandler, FnEventHandler};
pub use freeze::{freeze, freeze_value, FrozenDocument};
pub use model::{parse_model_string, ModelSpec, Provider};
pub use normalize::ParseError;
pub use protocol::{Manifest, Protocol, Query, Refinements};
pub use stages::FallbackReason;
pub use telemetry::{Telemetry, TelemetrySnapshot};
pub use types::{CallResult, Stage};
