//! Application services sitting between callers and the engine

pub mod recipe_service;

pub use recipe_service::{RecipeService, WriteBackTarget};
