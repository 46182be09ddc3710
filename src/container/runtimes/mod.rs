// src/container/runtimes/mod.rs
pub mod docker;
