//! ==============================================================================
//! bloom_snapper - annotated grow enclosure snapshots
//! ==============================================================================
//!
//! pipeline (one run per capture):
//!
//! ```text
//!     camera ──► photo.jpg
//!                    │
//!     controller ──► annotation ──► EnrichedView ──► composer ──► photo.jpg
//!          (cache fallback)                          (burned-in overlay)
//! ```
//!
//! modules:
//!     - config: toml schema + validation
//!     - domain: registry / snapshot / view value types
//!     - cache: last-known-good controller state on disk
//!     - controller: http client for the grow controller
//!     - annotation: fetch + fallback + resolution into an EnrichedView
//!     - text / composer: overlay rendering
//!     - camera: still capture subprocess
//!
//! ==============================================================================

pub mod annotation;
pub mod cache;
pub mod camera;
pub mod composer;
pub mod config;
pub mod controller;
pub mod domain;
pub mod text;
