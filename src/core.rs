//! # Core Utilities

pub mod generate;
