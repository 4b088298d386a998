//! Core trait abstractions for the research library.
//!
//! These traits define the seams to the outside world: the search
//! provider, the page reader, the language model and the evidence store.

pub mod fetcher;
pub mod model;
pub mod searcher;
pub mod store;
