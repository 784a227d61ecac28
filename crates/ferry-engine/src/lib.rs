//! Ferry Engine
//!
//! This crate exposes reflected native types to a dynamically-typed foreign
//! runtime:
//! - **Runtime**: the single-threaded foreign runtime model (`runtime` module)
//! - **Bridge**: converter registry, class binding, object handles, the
//!   cross-thread async bridge, foreign futures and event channels
//!   (`bridge` module)
//! - **Workers**: the background pool that native code submits jobs to
//!   (`worker` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use ferry_engine::bridge::{self, ConverterRegistry};
//! use ferry_engine::runtime::Context;
//!
//! let cx = Context::new();
//! let registry = ConverterRegistry::builder().register_class::<Counter>().build();
//! bridge::install(&cx, std::sync::Arc::new(registry));
//! bridge::export_classes(&cx, &cx.global());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Abort on a broken bridge invariant.
macro_rules! fatal {
    ($($arg:tt)+) => {{
        log::error!($($arg)+);
        panic!($($arg)+)
    }};
}

// ============================================================================
// Core Modules
// ============================================================================

/// Bridge module: conversion, binding, lifetimes and cross-thread delivery
pub mod bridge;

/// Configuration loading
pub mod config;

/// Errors reported to foreign callers
pub mod error;

/// Foreign runtime model
pub mod runtime;

/// Background worker pool
pub mod worker;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::{
    AsyncBridge, Binding, ConvertError, ConverterRegistry, EventChannelBridge, HandleState,
    HandleWatch, ObjectHandle, Ownership, RegistryBuilder,
};
pub use config::{BridgeConfig, ConfigError, ConversionConfig, WorkerConfig};
pub use error::BridgeError;
pub use runtime::{CallInfo, Context, ContextId, JsResult, LoopHandle, ObjectRef, Throw, Value};
pub use worker::{ShutdownReport, WorkerPool};
