//! # usage-finder
//!
//! Finds every reference to a Java class, method or field inside a jar.
//!
//! ## Architecture
//!
//! - **usage**: Usage keys and tagged usage strings with their text encodings
//! - **archive**: Jar and in-memory archive sources
//! - **classfile**: Minimal class-file reader (constant pool, descriptors, bytecode walk)
//! - **references**: Per-shard reverse index from keys to referencing sites
//! - **shard**: Shard contract and the actor-thread shard implementation
//! - **pool**: Worker pool sized from host parallelism
//! - **progress**: Observable build progress
//! - **builder**: Memoized parallel index build
//! - **router**: Usage lookups fanned out to every shard
//! - **session**: Per-archive index lifecycle
//! - **config**: Index configuration from flags and environment

pub mod archive;
pub mod builder;
pub mod classfile;
pub mod cli;
pub mod config;
pub mod error;
pub mod pool;
pub mod progress;
pub mod references;
pub mod router;
pub mod session;
pub mod shard;
pub mod usage;
