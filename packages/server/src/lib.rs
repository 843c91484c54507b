//! Room and presence chat server library.
//!
//! Rooms and global presence are served by actors (one task per room key and
//! a single presence task). The layers follow the usual split: `domain` holds
//! the model, `usecase` the rules, `actor` the owners of live state,
//! `infrastructure` the stores and external collaborators, and `ui` the axum
//! surface.

pub mod actor;
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

// Re-export entry points
pub use ui::{ServerArgs, ServerError, run};
