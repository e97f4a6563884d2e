//! SQLite persistence for match rows.

mod models;
mod repository;
mod schema; // Diesel generated schema - internal use only

pub use repository::SqliteStore;
