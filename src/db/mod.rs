//! Relational store: SQLite via sqlx, with embedded migrations.

pub mod client;
pub mod models;

pub use client::Db;
pub use models::*;
