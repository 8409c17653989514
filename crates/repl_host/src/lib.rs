//! Line-oriented terminal host for a REPL session.

pub mod commands;
pub mod contexts;
pub mod host;
pub mod render;
