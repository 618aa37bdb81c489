//! Task records: specification, lifecycle state, and effective-priority math.

use serde::{Deserialize, Serialize};

use crate::{
	Error, Result,
	queue::{
		ids::{GroupId, ItemId},
		time::Timestamp,
	},
};

const DEFAULT_DEADLINE_WEEKS: f64 = 52.0;
const SECONDS_PER_WEEK: f64 = 7.0 * 24.0 * 60.0 * 60.0;

/// Lifecycle state of an [`Item`].
///
/// Declaration order is significant: derived [`Ord`] matches the ordering
/// `IMMATURE < READY < IN_PROGRESS < EXPIRED < FAILED < COMPLETED` that the
/// queue relies on when reasoning about which transitions are legal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemState {
	/// Maturation time has not yet passed.
	Immature,
	/// Eligible to be popped.
	Ready,
	/// Currently held by a consumer.
	InProgress,
	/// Deadline has passed; will never be popped.
	Expired,
	/// Retries exhausted.
	Failed,
	/// Reported complete by a consumer.
	Completed,
}

/// Specification used to construct a new [`Item`], mirroring the recognized
/// push options. Every field has a spec-mandated default, so only fields
/// that deviate from the default need to be set via the `with_*` methods.
#[derive(Clone, Debug)]
pub struct ItemSpec<T> {
	pub(crate) payload: T,
	pub(crate) priority: f64,
	pub(crate) cost: u32,
	pub(crate) aging_factor: f64,
	pub(crate) minimum_fractional_priority: f64,
	pub(crate) matures: Option<Timestamp>,
	pub(crate) deadline: Option<Timestamp>,
	pub(crate) max_retries: u32,
	pub(crate) backoff_factor: f64,
	pub(crate) base_retry_delay: f64,
	pub(crate) jitter: f64,
	pub(crate) group: Option<GroupId>,
	pub(crate) dependencies: Vec<ItemId>,
}
impl<T> ItemSpec<T> {
	/// Start a specification carrying `payload`, with every other field at its default.
	pub fn new(payload: T) -> Self {
		Self {
			payload,
			priority: 0.0,
			cost: 1,
			aging_factor: 0.9,
			minimum_fractional_priority: 0.1,
			matures: None,
			deadline: None,
			max_retries: 3,
			backoff_factor: 2.0,
			base_retry_delay: 0.1,
			jitter: 0.1,
			group: None,
			dependencies: Vec::new(),
		}
	}

	/// Base priority. Must be non-negative.
	pub fn with_priority(mut self, priority: f64) -> Self {
		self.priority = priority;
		self
	}

	/// Tokens consumed from the item's group on pop.
	pub fn with_cost(mut self, cost: u32) -> Self {
		self.cost = cost;
		self
	}

	/// Multiplicative decay applied to priority per second of age.
	pub fn with_aging_factor(mut self, aging_factor: f64) -> Self {
		self.aging_factor = aging_factor;
		self
	}

	/// Floor on aged priority, as a fraction of the base priority.
	pub fn with_minimum_fractional_priority(mut self, minimum_fractional_priority: f64) -> Self {
		self.minimum_fractional_priority = minimum_fractional_priority;
		self
	}

	/// Earliest time the item may be popped.
	pub fn with_matures(mut self, matures: Timestamp) -> Self {
		self.matures = Some(matures);
		self
	}

	/// Latest time the item may be popped.
	pub fn with_deadline(mut self, deadline: Timestamp) -> Self {
		self.deadline = Some(deadline);
		self
	}

	/// Maximum number of retry attempts.
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;
		self
	}

	/// Multiplier applied to the retry delay on each attempt.
	pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
		self.backoff_factor = backoff_factor;
		self
	}

	/// Delay, in seconds, before the first retry.
	pub fn with_base_retry_delay(mut self, base_retry_delay: f64) -> Self {
		self.base_retry_delay = base_retry_delay;
		self
	}

	/// Amplitude of random adjustment applied to retry delays, as a fraction of the delay.
	pub fn with_jitter(mut self, jitter: f64) -> Self {
		self.jitter = jitter;
		self
	}

	/// Rate-limit group this item draws tokens from.
	pub fn with_group(mut self, group: GroupId) -> Self {
		self.group = Some(group);
		self
	}

	/// Items that must be in the completed set before this item becomes eligible.
	pub fn with_dependencies(mut self, dependencies: Vec<ItemId>) -> Self {
		self.dependencies = dependencies;
		self
	}
}

/// A queued task: payload plus priority, aging, timing, retry, and dependency bookkeeping.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item<T> {
	id: ItemId,
	payload: T,
	priority: f64,
	cost: u32,
	aging_factor: f64,
	minimum_fractional_priority: f64,
	enqueued: Timestamp,
	matures: Timestamp,
	deadline: Timestamp,
	max_retries: u32,
	backoff_factor: f64,
	base_retry_delay: f64,
	jitter: f64,
	group: Option<GroupId>,
	dependencies: Vec<ItemId>,
	retries: u32,
	last_popped: Option<Timestamp>,
	state: ItemState,
}
impl<T> Item<T> {
	/// Build an item from a specification, applying defaults and validating invariants.
	///
	/// Fails with [`Error::ItemExpired`] if the resolved deadline is at or before `now`, with
	/// [`Error::InvalidWindow`] if the deadline precedes maturation, and with
	/// [`Error::InvalidItem`] if priority is negative or jitter falls outside `[0, 1]`.
	pub fn from_spec(id: ItemId, spec: ItemSpec<T>, now: Timestamp) -> Result<Self> {
		let enqueued = now;
		let matures = spec.matures.unwrap_or(enqueued);
		let deadline =
			spec.deadline.unwrap_or_else(|| enqueued.plus_secs(DEFAULT_DEADLINE_WEEKS * SECONDS_PER_WEEK));

		if spec.priority < 0.0 {
			return Err(Error::InvalidItem { item: id, reason: "priority must be non-negative".into() });
		}
		if !(0.0..=1.0).contains(&spec.jitter) {
			return Err(Error::InvalidItem { item: id, reason: "jitter must be in [0, 1]".into() });
		}
		if deadline.as_secs() <= now.as_secs() {
			return Err(Error::ItemExpired { item: id });
		}
		if deadline.as_secs() < matures.as_secs() {
			return Err(Error::InvalidWindow { item: id });
		}

		let state = if matures.as_secs() <= now.as_secs() { ItemState::Ready } else { ItemState::Immature };

		Ok(Self {
			id,
			payload: spec.payload,
			priority: spec.priority,
			cost: spec.cost,
			aging_factor: spec.aging_factor,
			minimum_fractional_priority: spec.minimum_fractional_priority,
			enqueued,
			matures,
			deadline,
			max_retries: spec.max_retries,
			backoff_factor: spec.backoff_factor,
			base_retry_delay: spec.base_retry_delay,
			jitter: spec.jitter,
			group: spec.group,
			dependencies: spec.dependencies,
			retries: 0,
			last_popped: None,
			state,
		})
	}

	/// Unique identifier.
	pub fn id(&self) -> ItemId {
		self.id
	}

	/// Reference to the opaque payload.
	pub fn payload(&self) -> &T {
		&self.payload
	}

	/// Mutable reference to the opaque payload.
	pub fn payload_mut(&mut self) -> &mut T {
		&mut self.payload
	}

	/// Current lifecycle state.
	pub fn state(&self) -> ItemState {
		self.state
	}

	/// Base, unaged priority.
	pub fn priority(&self) -> f64 {
		self.priority
	}

	/// Tokens consumed from the item's group on pop.
	pub fn cost(&self) -> u32 {
		self.cost
	}

	/// Time the item was pushed.
	pub fn enqueued(&self) -> Timestamp {
		self.enqueued
	}

	/// Earliest time the item may be popped.
	pub fn matures(&self) -> Timestamp {
		self.matures
	}

	/// Latest time the item may be popped.
	pub fn deadline(&self) -> Timestamp {
		self.deadline
	}

	/// Number of retry attempts consumed so far.
	pub fn retries(&self) -> u32 {
		self.retries
	}

	/// Maximum number of retry attempts.
	pub fn max_retries(&self) -> u32 {
		self.max_retries
	}

	/// The group this item draws tokens from, if any.
	pub fn group(&self) -> Option<GroupId> {
		self.group
	}

	/// Items that must complete before this item is eligible.
	pub fn dependencies(&self) -> &[ItemId] {
		&self.dependencies
	}

	/// Time of the most recent pop, if any.
	pub fn last_popped(&self) -> Option<Timestamp> {
		self.last_popped
	}

	/// Effective priority at time `now`: base priority aged toward a floor, decayed further as
	/// the deadline approaches.
	///
	/// `aged = priority * aging_factor^age * (1 - age / (deadline - enqueued))`, floored by
	/// `effective = (1 - min_frac) * aged + min_frac`.
	pub fn effective_priority(&self, now: Timestamp) -> f64 {
		let age = now.since(&self.enqueued).max(0.0);
		let window = self.deadline.since(&self.enqueued);
		let time_decay = if window > 0.0 { (1.0 - age / window).max(0.0) } else { 0.0 };
		let aged = self.priority * self.aging_factor.powf(age) * time_decay;

		(1.0 - self.minimum_fractional_priority) * aged + self.minimum_fractional_priority
	}

	/// Whether maturation has passed as of `now`.
	pub fn is_mature(&self, now: Timestamp) -> bool {
		self.matures.as_secs() <= now.as_secs()
	}

	/// Whether the deadline has passed as of `now`.
	pub fn is_past_deadline(&self, now: Timestamp) -> bool {
		self.deadline.as_secs() <= now.as_secs()
	}

	/// Transition from `READY` to `IN_PROGRESS`, stamping the pop time. Returns `false` (no-op)
	/// if the item was not `READY`.
	pub fn begin_pop(&mut self, now: Timestamp) -> bool {
		if self.state != ItemState::Ready {
			return false;
		}
		self.state = ItemState::InProgress;
		self.last_popped = Some(now);
		true
	}

	/// Promote an `IMMATURE` item to `READY`. No-op for any other state.
	pub fn promote_ready(&mut self) {
		if self.state == ItemState::Immature {
			self.state = ItemState::Ready;
		}
	}

	/// Mark the item `EXPIRED`.
	pub fn expire(&mut self) {
		self.state = ItemState::Expired;
	}

	/// Mark the item `COMPLETED`.
	pub fn complete(&mut self) {
		self.state = ItemState::Completed;
	}

	/// Mark the item `FAILED`.
	pub fn fail(&mut self) {
		self.state = ItemState::Failed;
	}

	/// Increment the retry counter and recompute maturation with backoff, failing with
	/// [`Error::RetryLimitExceeded`] if no retries remain.
	///
	/// This is the item-level API referenced by the queue's retry docs: it raises where
	/// `PriorityQueue::retry_item` instead reports `false` after checking the budget itself.
	pub fn retry(&mut self, now: Timestamp) -> Result<()> {
		if self.retries >= self.max_retries {
			return Err(Error::RetryLimitExceeded { item: self.id, max_retries: self.max_retries });
		}
		self.retries += 1;
		self.update_mature_time();
		self.state = if self.is_mature(now) { ItemState::Ready } else { ItemState::Immature };
		Ok(())
	}

	/// Recompute maturation from the backoff schedule for the current retry count.
	///
	/// `delay = base_retry_delay * backoff_factor^retries`, jittered by a uniform fraction of
	/// itself, added to the later of `last_popped` or `enqueued`; maturation only ever moves
	/// forward.
	fn update_mature_time(&mut self) {
		let delay = self.base_retry_delay * self.backoff_factor.powi(self.retries as i32);
		let jitter_fraction = if self.jitter > 0.0 {
			rand::random::<f64>() * self.jitter - self.jitter / 2.0
		} else {
			0.0
		};
		let jittered = (delay * (1.0 + jitter_fraction)).max(0.0);
		let base = self.last_popped.unwrap_or(self.enqueued);
		let earliest_retry = base.plus_secs(jittered);

		self.matures = self.matures.max(earliest_retry);

		tracing::debug!(item = %self.id, matures = self.matures.as_secs(), delay = jittered, "retry maturation updated");
	}
}
