//! Metrics helpers: a lightweight in-process accumulator plus `metrics`-crate counters/histograms
//! for export to Prometheus or any other configured recorder.

// std
use std::sync::{
	OnceLock,
	atomic::{AtomicU64, Ordering},
};
// crates.io
use metrics::Label;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use smallvec::SmallVec;
// self
use crate::{Error, Result};

type LabelSet = SmallVec<[Label; 2]>;

const METRIC_ITEMS_PUSHED: &str = "tidepool_queue_items_pushed_total";
const METRIC_ITEMS_POPPED: &str = "tidepool_queue_items_popped_total";
const METRIC_ITEMS_RETRIED: &str = "tidepool_queue_items_retried_total";
const METRIC_ITEMS_EXPIRED: &str = "tidepool_queue_items_expired_total";
const METRIC_ITEMS_FAILED: &str = "tidepool_queue_items_failed_total";
const METRIC_ITEMS_COMPLETED: &str = "tidepool_queue_items_completed_total";
const METRIC_BLOBS_STORED: &str = "tidepool_blobstore_blobs_stored_total";
const METRIC_BLOBS_RETRIEVED: &str = "tidepool_blobstore_blobs_retrieved_total";
const METRIC_BLOBS_DELETED: &str = "tidepool_blobstore_blobs_deleted_total";
const METRIC_CHUNK_DEDUP: &str = "tidepool_blobstore_chunk_dedup_total";
const METRIC_COMPRESSION_RATIO: &str = "tidepool_blobstore_compression_ratio";

/// Shared Prometheus handle installed by [`install_default_exporter`].
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thread-safe, in-process accumulator of queue activity, independent of any installed recorder.
#[derive(Debug, Default)]
pub struct QueueMetrics {
	pushed: AtomicU64,
	popped: AtomicU64,
	retried: AtomicU64,
	expired: AtomicU64,
	failed: AtomicU64,
	completed: AtomicU64,
}
impl QueueMetrics {
	/// A zeroed accumulator.
	pub fn new() -> Self {
		Self::default()
	}

	/// Record an item entering the queue.
	pub fn record_push(&self) {
		self.pushed.fetch_add(1, Ordering::Relaxed);
		record_item_pushed();
	}

	/// Record an item being popped for execution.
	pub fn record_pop(&self) {
		self.popped.fetch_add(1, Ordering::Relaxed);
		record_item_popped();
	}

	/// Record an item being re-enqueued after a failed attempt.
	pub fn record_retry(&self) {
		self.retried.fetch_add(1, Ordering::Relaxed);
		record_item_retried();
	}

	/// Record an item crossing its deadline before completion.
	pub fn record_expiry(&self) {
		self.expired.fetch_add(1, Ordering::Relaxed);
		record_item_expired();
	}

	/// Record an item exhausting its retries.
	pub fn record_failure(&self) {
		self.failed.fetch_add(1, Ordering::Relaxed);
		record_item_failed();
	}

	/// Record an item finishing successfully.
	pub fn record_completion(&self) {
		self.completed.fetch_add(1, Ordering::Relaxed);
		record_item_completed();
	}

	/// Take a point-in-time snapshot of the counters.
	pub fn snapshot(&self) -> QueueMetricsSnapshot {
		QueueMetricsSnapshot {
			pushed: self.pushed.load(Ordering::Relaxed),
			popped: self.popped.load(Ordering::Relaxed),
			retried: self.retried.load(Ordering::Relaxed),
			expired: self.expired.load(Ordering::Relaxed),
			failed: self.failed.load(Ordering::Relaxed),
			completed: self.completed.load(Ordering::Relaxed),
		}
	}
}

/// Read-only snapshot of [`QueueMetrics`].
#[derive(Clone, Copy, Debug)]
pub struct QueueMetricsSnapshot {
	/// Total items pushed.
	pub pushed: u64,
	/// Total items popped.
	pub popped: u64,
	/// Total retry re-enqueues.
	pub retried: u64,
	/// Total items that crossed their deadline.
	pub expired: u64,
	/// Total items that exhausted their retries.
	pub failed: u64,
	/// Total items marked complete.
	pub completed: u64,
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new().install_recorder().map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

pub(crate) fn record_item_pushed() {
	metrics::counter!(METRIC_ITEMS_PUSHED).increment(1);
}

pub(crate) fn record_item_popped() {
	metrics::counter!(METRIC_ITEMS_POPPED).increment(1);
}

pub(crate) fn record_item_retried() {
	metrics::counter!(METRIC_ITEMS_RETRIED).increment(1);
}

pub(crate) fn record_item_expired() {
	metrics::counter!(METRIC_ITEMS_EXPIRED).increment(1);
}

pub(crate) fn record_item_failed() {
	metrics::counter!(METRIC_ITEMS_FAILED).increment(1);
}

pub(crate) fn record_item_completed() {
	metrics::counter!(METRIC_ITEMS_COMPLETED).increment(1);
}

/// Record a blob being stored, tagging dedup outcome per chunk.
pub fn record_blob_stored(total_chunks: u64, deduped_chunks: u64) {
	metrics::counter!(METRIC_BLOBS_STORED).increment(1);

	let hit_labels = dedup_labels("hit");
	let miss_labels = dedup_labels("miss");

	metrics::counter!(METRIC_CHUNK_DEDUP, hit_labels.iter()).increment(deduped_chunks);
	metrics::counter!(METRIC_CHUNK_DEDUP, miss_labels.iter()).increment(total_chunks.saturating_sub(deduped_chunks));
}

/// Record a blob being reassembled and returned to a caller.
pub fn record_blob_retrieved() {
	metrics::counter!(METRIC_BLOBS_RETRIEVED).increment(1);
}

/// Record a blob being removed from the index.
pub fn record_blob_deleted() {
	metrics::counter!(METRIC_BLOBS_DELETED).increment(1);
}

/// Record the ratio of compressed to uncompressed bytes for a chunk write.
pub fn record_compression_ratio(before: usize, after: usize) {
	if before == 0 {
		return;
	}
	metrics::histogram!(METRIC_COMPRESSION_RATIO).record(after as f64 / before as f64);
}

fn dedup_labels(outcome: &'static str) -> LabelSet {
	let mut labels = LabelSet::new();
	labels.push(Label::new("outcome", outcome));
	labels
}
