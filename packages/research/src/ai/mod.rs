//! Model implementations for the research library.
//!
//! This module provides a reference implementation of the `ToolModel`
//! trait. Users can use it directly or implement their own.

#[cfg(feature = "openai")]
mod openai;

#[cfg(feature = "openai")]
pub use openai::OpenAiToolModel;
