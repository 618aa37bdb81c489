//! An in-memory priority-aging task queue with maturation windows and rate-limited groups,
//! paired with a content-addressed, deduplicating blob store — built for workloads that need
//! fine-grained scheduling and chunk-level storage reuse in a single embedded library.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod blobstore;
#[cfg(feature = "metrics")] pub mod metrics;
pub mod queue;

mod error;

pub use crate::error::{Error, Result};

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
