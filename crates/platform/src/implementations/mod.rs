//! Concrete platform implementations

pub mod local;
