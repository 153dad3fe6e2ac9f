//! Quark: a predictive prefetch pass-through filesystem.
//!
//! The hard core lives in [`quark_cache`] (path normalization, the bounded
//! byte cache, the fetch worker) and [`quark_predict`] (the pluggable
//! access predictors). This crate wires those into a read-path integrator,
//! a thin FUSE binding, and the `quark` command line tool.

pub mod cli;
pub mod config;
pub mod control;
pub mod fuse_fs;
pub mod integrator;
pub mod logging;
