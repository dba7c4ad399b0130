//! # Review Harness
//!
//! A batch pipeline that turns per-site review dumps into canonical,
//! feature-enriched tables.
//!
//! Every review site publishes ratings and dates its own way. Review Harness
//! runs one configuration-driven pipeline per site: ratings and dates are
//! normalized to one representation, invalid records are filtered out, text
//! is cleaned for downstream embedding, and sentence counts plus TF-IDF
//! vectors are derived before the batch is persisted atomically.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────────────────┐   ┌──────────┐
//! │  Sources    │──▶│  Pipeline (one per site)             │──▶│  Sink    │
//! │  CSV/JSON   │   │  normalize → filter → clean → TF-IDF │   │ CSV/SQL  │
//! └─────────────┘   └──────────────────────────────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rh init                 # create the output directory or database
//! rh sources              # show configured and discovered inputs
//! rh process all          # run every configured source
//! rh stats                # summarize what was persisted
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Record types for each pipeline stage |
//! | [`error`] | Configuration and stage errors |
//! | [`rating`] | Rating literal parsing |
//! | [`dates`] | Date resolution, validation, and repair |
//! | [`normalize`] | Field normalization |
//! | [`filter`] | Record validity filter |
//! | [`clean`] | Text cleaning |
//! | [`features`] | Sentence counts and TF-IDF |
//! | [`pipeline`] | Per-source state machine |
//! | [`source`] | Record sources and input discovery |
//! | [`sink`] | Persistence sinks |
//! | [`process`] | Multi-source orchestration |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod clean;
pub mod config;
pub mod dates;
pub mod db;
pub mod error;
pub mod features;
pub mod filter;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod rating;
pub mod sink;
pub mod source;
pub mod sources;
pub mod stats;
