//! JSON-lines command scripts: one inbound operation per line.

pub mod command_reader;
pub mod runner;
