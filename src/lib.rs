pub mod app;
pub mod archive;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod normalize;
pub mod output;
pub mod source;
pub mod store;
