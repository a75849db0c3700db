//! Core layer - pooled buffers, shared caches, settings and the load session.
//!
//! This module provides:
//! - [`BufferPool`] / [`PooledBuffer`] - Reusable byte buffers for readers
//! - [`ReferenceCache`] / [`SharedCaches`] - Checksum-keyed shared objects
//! - [`LoaderSettings`] / [`SettingsProvider`] - Sharing and load policy
//! - [`LoadSession`] - The context every reader and deserializer runs in

mod cache;
mod pool;
mod session;
mod settings;

pub use cache::{ReferenceCache, SharedCaches, SharedKind};
pub use pool::{BufferPool, PooledBuffer, SweepHook};
pub use session::{LoadSession, LoadSessionBuilder, LoadStats};
pub use settings::{LoaderSettings, SessionConfig, SettingsProvider};
