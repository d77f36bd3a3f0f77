//! Story store implementations.
//!
//! The [`StoryStore`] trait is the seam between the pipeline and the record
//! store: `create` writes one story (degrading to the base-field subset when
//! the schema lacks the extended metadata columns), `list` returns a
//! newest-first page. [`Stories`] is the Postgres implementation; tests
//! substitute an in-memory double.

pub mod stories;

pub use stories::{Stories, StoryStore};
