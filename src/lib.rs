pub mod compiler;
pub mod config;
pub mod dsl;
pub mod error;
pub mod nodes;
pub mod overlay;
pub mod runtime;
pub mod tree;
