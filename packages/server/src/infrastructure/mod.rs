//! Infrastructure layer: storage, external collaborators and DTOs.

pub mod auth;
pub mod directory;
pub mod dto;
pub mod reply;
pub mod repository;
