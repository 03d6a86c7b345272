#![deny(warnings, clippy::all, clippy::pedantic)]
#![allow(
    // Acceptable for trait naming consistency (e.g., SceneDao, PgSceneDao)
    clippy::module_name_repetitions,

    // Render geometry mixes f64 seconds with integer frame/pixel counts
    clippy::cast_precision_loss,

    // Necessary for pixel/frame index conversions: usize ↔ u32/i64
    clippy::cast_possible_truncation,

    // Required for signed/unsigned conversions in database queries and pagination
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,

    // Domain logic often requires helper declarations mid-function for readability
    clippy::items_after_statements,

    // Error context via anyhow::Context already provides sufficient documentation
    clippy::missing_errors_doc,

    // Panic paths are defensive (e.g., mutex poisoning), not part of normal flow
    clippy::missing_panics_doc,

    // Technical identifiers (e.g., FFmpeg, yuv420p, RFC1918) don't need markdown formatting
    clippy::doc_markdown,

    // Named format args reduce readability for long messages with many placeholders
    clippy::uninlined_format_args,

    // if-let-else patterns are clearer than map_or for error handling flows
    clippy::option_if_let_else,

    // Pass-by-value necessary for async trait methods (Arc, Config types)
    clippy::needless_pass_by_value,

    // Too noisy: many utility methods return useful values but aren't always used
    clippy::must_use_candidate,

    // Nested conditions improve readability when branches are semantically distinct
    clippy::collapsible_if
)]

pub(crate) mod api;
pub mod app;
pub(crate) mod clients;
pub mod config;
pub mod error;
pub(crate) mod events;
pub(crate) mod media;
pub mod model;
pub mod observability;
pub mod pipeline;
pub mod queue;
pub(crate) mod storage;
pub(crate) mod store;
pub mod util;
pub(crate) mod ws;
