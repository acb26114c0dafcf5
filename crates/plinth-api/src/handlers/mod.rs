//! HTTP handlers and background job handlers.
//!
//! Request handlers are thin: they extract the caller and input, call one
//! service method and shape the response. Job handlers live in [`jobs`].

pub mod addresses;
pub mod admin;
pub mod auth;
pub mod comments;
pub mod health;
pub mod jobs;
pub mod media;
pub mod menus;
pub mod notifications;
pub mod organizations;
pub mod posts;
pub mod tags;
pub mod taxonomies;
pub mod users;

pub use jobs::{
    MediaCleanupHandler, SearchIndexHandler, SearchReindexHandler, SearchRemoveHandler,
    SendEmailHandler,
};

use serde::Deserialize;
use uuid::Uuid;

/// Body of the `move` endpoints. `null` moves the node to the root.
#[derive(Debug, Deserialize)]
pub struct MoveBody {
    pub parent_id: Option<Uuid>,
}

/// `?max_depth=` on descendant queries.
#[derive(Debug, Default, Deserialize)]
pub struct DepthQuery {
    pub max_depth: Option<i32>,
}
