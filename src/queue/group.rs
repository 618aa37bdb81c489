//! Rate-limit groups: a token bucket shared across items.

use serde::{Deserialize, Serialize};

use crate::queue::{ids::GroupId, time::Timestamp};

/// Specification for a new [`Group`], mirroring the recognized group options.
#[derive(Clone, Debug)]
pub struct GroupSpec {
	pub(crate) name: String,
	pub(crate) max_tokens: f64,
	pub(crate) refill_rate: f64,
	pub(crate) max_pop_rate: Option<f64>,
}
impl GroupSpec {
	/// Start a specification named `name`, with every other field at its default.
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), max_tokens: 10.0, refill_rate: 1.0, max_pop_rate: None }
	}

	/// Bucket capacity.
	pub fn with_max_tokens(mut self, max_tokens: f64) -> Self {
		self.max_tokens = max_tokens;
		self
	}

	/// Tokens restored per second.
	pub fn with_refill_rate(mut self, refill_rate: f64) -> Self {
		self.refill_rate = refill_rate;
		self
	}

	/// Optional cap on pops per second, independent of token cost.
	pub fn with_max_pop_rate(mut self, max_pop_rate: f64) -> Self {
		self.max_pop_rate = Some(max_pop_rate);
		self
	}
}

/// A token bucket shared across items for rate limiting.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Group {
	id: GroupId,
	name: String,
	max_tokens: f64,
	refill_rate: f64,
	max_pop_rate: Option<f64>,
	tokens: f64,
	last_refill_time: Timestamp,
	last_pop_time: Option<Timestamp>,
}
impl Group {
	/// Build a group from a specification, starting with a full bucket.
	pub fn from_spec(spec: GroupSpec, now: Timestamp) -> Self {
		Self {
			id: GroupId::new(),
			name: spec.name,
			max_tokens: spec.max_tokens,
			refill_rate: spec.refill_rate,
			max_pop_rate: spec.max_pop_rate,
			tokens: spec.max_tokens,
			last_refill_time: now,
			last_pop_time: None,
		}
	}

	/// Unique identifier.
	pub fn id(&self) -> GroupId {
		self.id
	}

	/// Name given at creation.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Tokens currently available, as of the last refresh.
	pub fn tokens(&self) -> f64 {
		self.tokens
	}

	fn refill(&mut self, now: Timestamp) {
		let elapsed = now.since(&self.last_refill_time).max(0.0);

		self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
		self.last_refill_time = now;
	}

	/// Refill the bucket, then consume `quantity` tokens if available.
	///
	/// Returns `false` without consuming anything if the bucket holds fewer than `quantity`
	/// tokens, or if a configured `max_pop_rate` would be exceeded by popping again now.
	pub fn consume_tokens(&mut self, quantity: f64, now: Timestamp) -> bool {
		self.refill(now);

		if let (Some(max_pop_rate), Some(last_pop)) = (self.max_pop_rate, self.last_pop_time) {
			let elapsed = now.since(&last_pop);
			if elapsed <= 0.0 || 1.0 / elapsed >= max_pop_rate {
				return false;
			}
		}

		if self.tokens < quantity {
			return false;
		}

		self.tokens -= quantity;
		self.last_pop_time = Some(now);

		true
	}
}
