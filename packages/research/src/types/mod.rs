//! Data types for the research pipeline.

pub mod config;
pub mod extraction;
pub mod normalize;
pub mod page;
pub mod reference;
pub mod result;
pub mod selection;
pub mod session;
