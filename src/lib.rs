//! pysl: a terminal status line fed over named pipes
//!
//! `pysl --watch` owns a channel and prints whatever arrives on it;
//! `pysl "text"` delivers a message to one watcher (`--id`) or all of them.

pub mod app;
pub mod config;
