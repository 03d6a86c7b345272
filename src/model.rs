//! Typed domain values shared across phases: the LLM scenario, the resolved
//! scene projects and the enrichment context. The database keeps the raw JSON
//! documents; these types are the validated in-memory view.

pub mod context;
pub mod project;
pub mod scenario;
