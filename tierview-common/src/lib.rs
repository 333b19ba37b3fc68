//! # tierview common library
//!
//! Shared code for the tierview service:
//! - Rich-content and scoring-schema models (paragraphs, sections, parameters, factors)
//! - Configuration loading and validation limits
//! - Database schema initialization
//! - Random code generation for identifiers and stored file names
//! - HTML-safe text escaping

pub mod codes;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod sanitize;

pub use error::{Error, Result};
