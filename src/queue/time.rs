//! Wall-clock timestamp helper shared by items and groups.
//!
//! The queue reasons about elapsed seconds rather than calendar fields, so a
//! timestamp is represented as seconds since the Unix epoch rather than a
//! richer calendar type. This keeps the snapshot format a plain number.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A point in wall-clock time, serialized as seconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
	/// The current wall-clock time.
	pub fn now() -> Self {
		Self::from_system_time(SystemTime::now())
	}

	/// Build a timestamp from a `SystemTime`, saturating to the epoch on underflow.
	pub fn from_system_time(time: SystemTime) -> Self {
		let secs = time.duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0);

		Self(secs)
	}

	/// Build a timestamp `secs` seconds after the epoch.
	pub fn from_secs(secs: f64) -> Self {
		Self(secs)
	}

	/// Seconds elapsed since the Unix epoch.
	pub fn as_secs(&self) -> f64 {
		self.0
	}

	/// Add a duration, returning a later timestamp.
	pub fn plus(&self, duration: Duration) -> Self {
		Self(self.0 + duration.as_secs_f64())
	}

	/// Add a (possibly negative) number of seconds.
	pub fn plus_secs(&self, secs: f64) -> Self {
		Self(self.0 + secs)
	}

	/// Seconds elapsed between `earlier` and `self`. Negative if `self` precedes `earlier`.
	pub fn since(&self, earlier: &Timestamp) -> f64 {
		self.0 - earlier.0
	}

	/// The later of two timestamps.
	pub fn max(self, other: Self) -> Self {
		if other.0 > self.0 { other } else { self }
	}
}

impl Default for Timestamp {
	fn default() -> Self {
		Self::now()
	}
}
