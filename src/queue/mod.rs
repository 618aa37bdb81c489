//! In-memory priority-aging task queue with maturation windows, deadlines,
//! rate-limited groups, dependencies, and retry/backoff.
//!
//! [`PriorityQueue`] is the coordinator; [`Item`] is a queued task record;
//! [`Group`] is a shared token bucket used for rate limiting. All
//! state-mutating operations run under a single exclusive mutex — see the
//! module-level notes on the concurrency model in the crate documentation.

mod group;
mod ids;
mod item;
mod time;

use std::{
	cmp::Ordering,
	collections::{BinaryHeap, HashMap, HashSet},
	path::Path,
};

pub use group::{Group, GroupSpec};
pub use ids::{GroupId, ItemId};
pub use item::{Item, ItemSpec, ItemState};
use parking_lot::Mutex;
pub use time::Timestamp;
use tokio::sync::Notify;

use crate::{Error, Result};

#[derive(Clone, Copy)]
struct TimeKey {
	at: f64,
	id: ItemId,
}
impl PartialEq for TimeKey {
	fn eq(&self, other: &Self) -> bool {
		self.at == other.at && self.id == other.id
	}
}
impl Eq for TimeKey {}
impl PartialOrd for TimeKey {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for TimeKey {
	fn cmp(&self, other: &Self) -> Ordering {
		self.at.partial_cmp(&other.at).unwrap_or(Ordering::Equal).then_with(|| self.id.cmp(&other.id))
	}
}

struct QueueState<T> {
	items: HashMap<ItemId, Item<T>>,
	groups: HashMap<GroupId, Group>,
	default_group: Option<GroupId>,
	priority: Vec<ItemId>,
	maturation: BinaryHeap<std::cmp::Reverse<TimeKey>>,
	expiration: BinaryHeap<std::cmp::Reverse<TimeKey>>,
	completed: HashSet<ItemId>,
	failed: HashSet<ItemId>,
}
impl<T> QueueState<T> {
	fn new() -> Self {
		Self {
			items: HashMap::new(),
			groups: HashMap::new(),
			default_group: None,
			priority: Vec::new(),
			maturation: BinaryHeap::new(),
			expiration: BinaryHeap::new(),
			completed: HashSet::new(),
			failed: HashSet::new(),
		}
	}

	/// Depth-first search for a cycle the new dependency edges would introduce. The new item
	/// does not exist in `items` yet; it participates only as the DFS's seed frontier.
	fn has_cyclic_dependency(&self, dependencies: &[ItemId]) -> bool {
		let mut visited = HashSet::new();
		let mut stack = HashSet::new();

		fn visit<T>(
			state: &QueueState<T>,
			node: ItemId,
			visited: &mut HashSet<ItemId>,
			stack: &mut HashSet<ItemId>,
		) -> bool {
			if stack.contains(&node) {
				return true;
			}
			if visited.contains(&node) {
				return false;
			}
			stack.insert(node);
			visited.insert(node);
			if let Some(item) = state.items.get(&node) {
				for &dep in item.dependencies() {
					if visit(state, dep, visited, stack) {
						return true;
					}
				}
			}
			stack.remove(&node);
			false
		}

		for &dep in dependencies {
			if visit(self, dep, &mut visited, &mut stack) {
				return true;
			}
		}
		false
	}
}

/// Builder for a [`PriorityQueue`], configuring queue-wide defaults.
pub struct PriorityQueueBuilder {
	default_group_spec: GroupSpec,
}
impl PriorityQueueBuilder {
	/// Start a builder with the spec-mandated defaults (`max_tokens = 10`, `refill_rate = 1`).
	pub fn new() -> Self {
		Self { default_group_spec: GroupSpec::new("default") }
	}

	/// Override the specification used to lazily create the default group.
	pub fn with_default_group_spec(mut self, spec: GroupSpec) -> Self {
		self.default_group_spec = spec;
		self
	}

	/// Build the queue.
	pub fn build<T>(self) -> PriorityQueue<T> {
		PriorityQueue {
			state: Mutex::new(QueueState::new()),
			new_item: Notify::new(),
			default_group_spec: self.default_group_spec,
		}
	}
}
impl Default for PriorityQueueBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Central coordinator for the priority-aging task queue.
///
/// Holds three ordered collections (priority, maturation, expiration), the id→item map, the
/// completed/failed sets, and the group map behind a single `parking_lot::Mutex`. Operations are
/// CPU-bounded with no suspension point inside the critical section, so a blocking mutex is
/// deliberately used instead of an async one — see the crate's concurrency-model notes.
pub struct PriorityQueue<T> {
	state: Mutex<QueueState<T>>,
	new_item: Notify,
	default_group_spec: GroupSpec,
}
impl<T> Default for PriorityQueue<T> {
	fn default() -> Self {
		PriorityQueueBuilder::new().build()
	}
}
impl<T> PriorityQueue<T> {
	/// Start building a queue with non-default configuration.
	pub fn builder() -> PriorityQueueBuilder {
		PriorityQueueBuilder::new()
	}

	/// Create a queue with spec-mandated defaults.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of items currently tracked, regardless of state.
	pub fn len(&self) -> usize {
		self.state.lock().items.len()
	}

	/// Whether the queue currently tracks no items at all.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Create a rate-limit group with queue defaults overridden by `spec`.
	#[tracing::instrument(skip(self, spec), fields(name = %spec.name))]
	pub fn new_group(&self, spec: GroupSpec) -> GroupId {
		let now = Timestamp::now();
		let mut state = self.state.lock();
		let group = Group::from_spec(spec, now);
		let id = group.id();

		state.groups.insert(id, group);

		tracing::debug!(group = %id, "group created");

		id
	}

	fn ensure_default_group(state: &mut QueueState<T>, spec: &GroupSpec, now: Timestamp) -> GroupId {
		if let Some(id) = state.default_group {
			return id;
		}
		let group = Group::from_spec(spec.clone(), now);
		let id = group.id();

		state.groups.insert(id, group);
		state.default_group = Some(id);

		id
	}

	/// A snapshot of a group's current bucket state, if it exists.
	pub fn group(&self, id: GroupId) -> Option<Group> {
		self.state.lock().groups.get(&id).cloned()
	}

	/// Resolve once at least one `push` has completed since this call began.
	pub async fn wait_for_item(&self) {
		let notified = self.new_item.notified();
		notified.await;
	}

	/// Construct an item from `spec` and enqueue it.
	///
	/// Fails with [`Error::ItemExpired`] if the resolved deadline is at or before now, with
	/// [`Error::InvalidWindow`] if the deadline precedes maturation, with
	/// [`Error::CyclicDependency`] if the declared dependencies would form a cycle, or with
	/// [`Error::InvalidItem`] if priority or jitter are out of range.
	#[tracing::instrument(skip(self, spec))]
	pub fn push(&self, mut spec: ItemSpec<T>) -> Result<ItemId> {
		let now = Timestamp::now();
		let id = ItemId::new();
		let mut state = self.state.lock();

		if spec.group.is_none() {
			spec.group = Some(Self::ensure_default_group(&mut state, &self.default_group_spec, now));
		}
		if state.has_cyclic_dependency(&spec.dependencies) {
			return Err(Error::CyclicDependency { item: id });
		}

		let item = Item::from_spec(id, spec, now)?;
		let deadline = item.deadline().as_secs();
		let matures = item.matures().as_secs();

		state.expiration.push(std::cmp::Reverse(TimeKey { at: deadline, id }));
		if matures > now.as_secs() {
			state.maturation.push(std::cmp::Reverse(TimeKey { at: matures, id }));
		} else {
			state.priority.push(id);
		}
		state.items.insert(id, item);

		drop(state);
		self.new_item.notify_waiters();

		#[cfg(feature = "metrics")]
		crate::metrics::record_item_pushed();

		tracing::debug!(item = %id, "item pushed");

		Ok(id)
	}

	fn promote_matured(state: &mut QueueState<T>, now: Timestamp) {
		while let Some(std::cmp::Reverse(key)) = state.maturation.peek().copied() {
			if key.at > now.as_secs() {
				break;
			}
			state.maturation.pop();
			if let Some(item) = state.items.get_mut(&key.id) {
				if item.state() == ItemState::Immature {
					item.promote_ready();
					state.priority.push(key.id);
					tracing::debug!(item = %key.id, "item matured");
				}
			}
		}
	}

	fn expire_deadlines(state: &mut QueueState<T>, now: Timestamp) {
		while let Some(std::cmp::Reverse(key)) = state.expiration.peek().copied() {
			if key.at > now.as_secs() {
				break;
			}
			state.expiration.pop();
			if let Some(item) = state.items.get_mut(&key.id) {
				if !matches!(
					item.state(),
					ItemState::Expired | ItemState::Completed | ItemState::Failed | ItemState::InProgress
				) {
					item.expire();

					#[cfg(feature = "metrics")]
					crate::metrics::record_item_expired();

					tracing::debug!(item = %key.id, "item expired");
				}
			}
		}
	}

	/// Return the currently eligible item with the highest effective priority.
	///
	/// Fails with [`Error::QueueEmpty`] if no item is eligible right now.
	#[tracing::instrument(skip(self))]
	pub fn pop(&self) -> Result<Item<T>>
	where
		T: Clone,
	{
		let now = Timestamp::now();
		let mut state = self.state.lock();

		if state.priority.is_empty() && state.maturation.is_empty() {
			return Err(Error::QueueEmpty);
		}

		Self::promote_matured(&mut state, now);
		Self::expire_deadlines(&mut state, now);

		{
			let QueueState { items, priority, .. } = &mut *state;

			priority.sort_by(|a, b| {
				let pa = items[a].effective_priority(now);
				let pb = items[b].effective_priority(now);
				pa.partial_cmp(&pb).unwrap_or(Ordering::Equal)
			});
		}

		let mut accepted = None;
		let mut set_aside = Vec::new();

		while let Some(id) = state.priority.pop() {
			let QueueState { items, groups, maturation, completed, .. } = &mut *state;

			let Some(item) = items.get_mut(&id) else { continue };

			if item.state() == ItemState::Expired {
				continue;
			}
			if item.state() == ItemState::Immature {
				if !item.is_mature(now) {
					let matures = item.matures().as_secs();
					maturation.push(std::cmp::Reverse(TimeKey { at: matures, id }));
					continue;
				}
				item.promote_ready();
			}

			let deps_met = item.dependencies().iter().all(|dep| completed.contains(dep));
			if !deps_met {
				set_aside.push(id);
				continue;
			}

			let cost = item.cost() as f64;
			let group_ok = match item.group() {
				Some(gid) => groups.get_mut(&gid).map(|group| group.consume_tokens(cost, now)).unwrap_or(true),
				None => true,
			};
			if !group_ok {
				set_aside.push(id);
				continue;
			}

			accepted = Some(id);
			break;
		}

		for id in set_aside {
			state.priority.push(id);
		}

		let Some(id) = accepted else {
			return Err(Error::QueueEmpty);
		};

		let item = state.items.get_mut(&id).expect("accepted id is tracked");
		item.begin_pop(now);

		#[cfg(feature = "metrics")]
		crate::metrics::record_item_popped();

		tracing::debug!(item = %id, "item popped");

		Ok(item.clone())
	}

	/// Attempt to retry an item: increments its retry counter and reschedules its maturation.
	///
	/// Returns `false` without effect if no retries remain. Use [`Item::retry`] directly for the
	/// item-level API that raises [`Error::RetryLimitExceeded`] instead.
	#[tracing::instrument(skip(self))]
	pub fn retry_item(&self, id: ItemId) -> bool {
		let now = Timestamp::now();
		let mut state = self.state.lock();

		let QueueState { items, maturation, priority, .. } = &mut *state;

		let Some(item) = items.get_mut(&id) else { return false };
		if item.retries() >= item.max_retries() {
			tracing::debug!(item = %id, "no retries remain");
			return false;
		}

		item.retry(now).expect("retry budget already checked");

		let matures = item.matures().as_secs();
		if matures > now.as_secs() {
			maturation.push(std::cmp::Reverse(TimeKey { at: matures, id }));
		} else {
			priority.push(id);
		}

		let retries = item.retries();

		#[cfg(feature = "metrics")]
		crate::metrics::record_item_retried();

		tracing::debug!(item = %id, retries, "item requeued for retry");

		true
	}

	/// Mark an item `COMPLETED` and record it in the completed set.
	pub fn mark_complete(&self, id: ItemId) {
		let mut state = self.state.lock();
		if let Some(item) = state.items.get_mut(&id) {
			item.complete();
			state.completed.insert(id);

			#[cfg(feature = "metrics")]
			crate::metrics::record_item_completed();

			tracing::debug!(item = %id, "item marked complete");
		}
	}

	/// Attempt a retry; if none remain, mark the item `FAILED` instead.
	pub fn mark_failed(&self, id: ItemId) {
		if self.retry_item(id) {
			return;
		}
		let mut state = self.state.lock();
		if let Some(item) = state.items.get_mut(&id) {
			item.fail();
			state.failed.insert(id);

			#[cfg(feature = "metrics")]
			crate::metrics::record_item_failed();

			tracing::debug!(item = %id, "item marked failed");
		}
	}

	/// Write every tracked item to `path` as a JSON array snapshot.
	///
	/// Groups and reference counts are not persisted; they are reconstructed implicitly on
	/// first use after a subsequent `load`.
	pub fn save(&self, path: impl AsRef<Path>) -> Result<()>
	where
		T: serde::Serialize,
	{
		let state = self.state.lock();
		let items: Vec<&Item<T>> = state.items.values().collect();
		let json = serde_json::to_vec(&items)?;

		std::fs::write(path.as_ref(), json)?;

		tracing::info!(count = items.len(), path = %path.as_ref().display(), "queue snapshot saved");

		Ok(())
	}

	/// Replace the queue's contents with the items stored in `path`.
	///
	/// Items whose deadline has already passed are skipped with a logged diagnostic rather than
	/// reinserted, resolving the ambiguity the original loader left unspecified.
	pub fn load(&self, path: impl AsRef<Path>) -> Result<()>
	where
		T: serde::de::DeserializeOwned,
	{
		let now = Timestamp::now();
		let bytes = std::fs::read(path.as_ref())?;
		let items: Vec<Item<T>> = serde_json::from_slice(&bytes)?;

		let mut state = self.state.lock();

		state.items.clear();
		state.priority.clear();
		state.maturation.clear();
		state.expiration.clear();
		state.completed.clear();
		state.failed.clear();
		state.groups.clear();
		state.default_group = None;

		let mut skipped = 0usize;
		for item in items {
			if item.is_past_deadline(now) {
				tracing::warn!(item = %item.id(), "skipping snapshot item with an already-past deadline");
				skipped += 1;
				continue;
			}

			let id = item.id();

			state.expiration.push(std::cmp::Reverse(TimeKey { at: item.deadline().as_secs(), id }));
			if item.matures().as_secs() > now.as_secs() {
				state.maturation.push(std::cmp::Reverse(TimeKey { at: item.matures().as_secs(), id }));
			} else {
				state.priority.push(id);
			}
			state.items.insert(id, item);
		}

		tracing::info!(
			count = state.items.len(),
			skipped,
			path = %path.as_ref().display(),
			"queue snapshot loaded"
		);

		Ok(())
	}
}
