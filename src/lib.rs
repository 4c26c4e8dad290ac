pub mod bridge;
pub mod config;
pub mod docx;
pub mod error;
pub mod job;
pub mod languages;
pub mod progress;
pub mod runs;
pub mod translate;
pub mod walker;
