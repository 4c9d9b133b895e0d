//! The outer boundary: client-facing errors, command scripts and CSV reports.

pub mod api;
pub mod csv;
pub mod script;
