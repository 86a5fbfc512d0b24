pub mod archive;
pub mod builder;
pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod filetree;
pub mod import;
pub mod manifest;
pub mod model;
pub mod routes;
pub mod store;
