//! Database layer: error categorization, entity models, and the story store.

pub mod errors;
pub mod handlers;
pub mod models;
