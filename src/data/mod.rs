//! Data layer module
//!
//! Holds the post entity model and the in-memory post store:
//! - Post, repost and quote entities
//! - Canonical post cache (volatile)
//! - Materialized per-view arrays

mod models;
mod store;

pub use models::*;
pub use store::{PatchReport, PostStore, ViewItems, ViewKey};
