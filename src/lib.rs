// src/lib.rs
// DOCUMENTATION: Library root shared by the API server and the import-data binary

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
