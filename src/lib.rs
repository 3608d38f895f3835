// Library exports for the binary and integration tests

pub mod config;
pub mod cover_cache;
pub mod document;
pub mod imaging;
pub mod manifest;
pub mod models;
pub mod network;
pub mod tagging;

pub use cover_cache::CoverCache;
pub use document::DocumentAssembler;
pub use tagging::AudioTagger;
