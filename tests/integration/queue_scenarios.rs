//! End-to-end exercises of the priority-aging queue: ordering, maturation, deadlines,
//! group throttling, and retry accounting.

use std::time::Duration;

use tidepool::{
	Error,
	queue::{GroupSpec, Item, ItemSpec, PriorityQueue, Timestamp},
};

#[test]
fn empty_queue_pop_raises_queue_empty() {
	let queue: PriorityQueue<&str> = PriorityQueue::new();
	assert!(matches!(queue.pop().unwrap_err(), Error::QueueEmpty));
}

#[test]
fn three_items_pop_in_priority_order() {
	let queue = PriorityQueue::new();
	queue.push(ItemSpec::new("medium").with_priority(1.0)).unwrap();
	queue.push(ItemSpec::new("low").with_priority(0.5)).unwrap();
	queue.push(ItemSpec::new("high").with_priority(2.0)).unwrap();

	assert_eq!(*queue.pop().unwrap().payload(), "high");
	assert_eq!(*queue.pop().unwrap().payload(), "medium");
	assert_eq!(*queue.pop().unwrap().payload(), "low");
	assert!(matches!(queue.pop().unwrap_err(), Error::QueueEmpty));
}

#[test]
fn identical_priorities_are_all_eventually_returned() {
	let queue = PriorityQueue::new();
	for _ in 0..5 {
		queue.push(ItemSpec::new("same").with_priority(1.0)).unwrap();
	}
	let mut popped = 0;
	while queue.pop().is_ok() {
		popped += 1;
	}
	assert_eq!(popped, 5);
}

#[test]
fn maturation_in_the_past_is_available_immediately() {
	let queue = PriorityQueue::new();
	let now = Timestamp::now();
	queue.push(ItemSpec::new("ready-now").with_matures(now.plus_secs(-10.0))).unwrap();
	assert_eq!(*queue.pop().unwrap().payload(), "ready-now");
}

#[tokio::test]
async fn maturation_defers_item_until_window_opens() {
	let queue = PriorityQueue::new();
	let now = Timestamp::now();
	queue.push(ItemSpec::new("delayed").with_matures(now.plus_secs(0.5))).unwrap();

	assert!(matches!(queue.pop().unwrap_err(), Error::QueueEmpty));

	tokio::time::sleep(Duration::from_millis(1000)).await;

	assert_eq!(*queue.pop().unwrap().payload(), "delayed");
}

#[tokio::test]
async fn deadline_expires_item_before_it_can_be_popped() {
	let queue = PriorityQueue::new();
	let now = Timestamp::now();
	queue.push(ItemSpec::new("expiring").with_deadline(now.plus_secs(0.5))).unwrap();

	tokio::time::sleep(Duration::from_millis(1000)).await;

	assert!(matches!(queue.pop().unwrap_err(), Error::QueueEmpty));
}

#[test]
fn push_with_deadline_at_or_before_now_is_rejected() {
	let queue = PriorityQueue::new();
	let now = Timestamp::now();
	let err = queue.push(ItemSpec::new("stale").with_deadline(now.plus_secs(-1.0))).unwrap_err();
	assert!(matches!(err, Error::ItemExpired { .. }));
}

#[test]
fn push_with_deadline_before_maturation_is_rejected() {
	let queue = PriorityQueue::new();
	let now = Timestamp::now();
	let spec = ItemSpec::new("backwards-window")
		.with_matures(now.plus_secs(10.0))
		.with_deadline(now.plus_secs(5.0));
	assert!(matches!(queue.push(spec).unwrap_err(), Error::InvalidWindow { .. }));
}

#[test]
fn push_with_negative_priority_is_rejected() {
	let queue = PriorityQueue::new();
	let err = queue.push(ItemSpec::new("bad").with_priority(-1.0)).unwrap_err();
	assert!(matches!(err, Error::InvalidItem { .. }));
}

#[tokio::test]
async fn group_token_bucket_throttles_then_recovers() {
	let queue = PriorityQueue::new();
	let group = queue.new_group(GroupSpec::new("limited").with_max_tokens(2.0).with_refill_rate(1.0));

	let pushed: std::collections::HashSet<_> = [
		queue.push(ItemSpec::new("first").with_group(group)).unwrap(),
		queue.push(ItemSpec::new("second").with_group(group)).unwrap(),
		queue.push(ItemSpec::new("third").with_group(group)).unwrap(),
	]
	.into_iter()
	.collect();

	// Equal-priority items don't guarantee push order on pop, only that the bucket admits
	// exactly two before it runs dry.
	let first = queue.pop().unwrap().id();
	let second = queue.pop().unwrap().id();
	assert_ne!(first, second);
	assert!(matches!(queue.pop().unwrap_err(), Error::QueueEmpty));

	tokio::time::sleep(Duration::from_millis(1000)).await;

	let third = queue.pop().unwrap().id();
	let popped: std::collections::HashSet<_> = [first, second, third].into_iter().collect();
	assert_eq!(popped, pushed);
}

#[test]
fn dependencies_must_complete_before_item_is_eligible() {
	let queue = PriorityQueue::new();
	let dependency = queue.push(ItemSpec::new("dependency")).unwrap();
	queue.push(ItemSpec::new("dependent").with_dependencies(vec![dependency])).unwrap();

	let popped = queue.pop().unwrap();
	assert_eq!(*popped.payload(), "dependency");
	assert!(matches!(queue.pop().unwrap_err(), Error::QueueEmpty));

	queue.mark_complete(popped.id());
	assert_eq!(*queue.pop().unwrap().payload(), "dependent");
}

#[tokio::test]
async fn retry_with_zero_backoff_is_available_immediately() {
	let queue = PriorityQueue::new();
	let id = queue
		.push(ItemSpec::new("flaky").with_base_retry_delay(0.0).with_jitter(0.0))
		.unwrap();

	let popped = queue.pop().unwrap();
	assert_eq!(popped.id(), id);

	assert!(queue.retry_item(id));
	assert_eq!(*queue.pop().unwrap().payload(), "flaky");
}

#[test]
fn retry_item_reports_false_once_retries_are_exhausted() {
	let queue = PriorityQueue::new();
	let id = queue.push(ItemSpec::new("doomed").with_max_retries(2).with_base_retry_delay(0.0)).unwrap();

	queue.pop().unwrap();
	assert!(queue.retry_item(id));
	queue.pop().unwrap();
	assert!(queue.retry_item(id));
	queue.pop().unwrap();
	assert!(!queue.retry_item(id));
}

#[test]
fn mark_failed_retries_until_budget_exhausted_then_fails() {
	let queue = PriorityQueue::new();
	let id = queue.push(ItemSpec::new("retried").with_max_retries(1).with_base_retry_delay(0.0)).unwrap();

	queue.pop().unwrap();
	queue.mark_failed(id);
	let requeued = queue.pop().unwrap();
	assert_eq!(requeued.id(), id);

	queue.mark_failed(id);
	assert!(matches!(queue.pop().unwrap_err(), Error::QueueEmpty));
}

#[test]
fn item_level_retry_raises_past_the_retry_limit() {
	let now = Timestamp::now();
	let spec = ItemSpec::new("limited").with_max_retries(3).with_base_retry_delay(0.0).with_jitter(0.0);
	let mut item = Item::from_spec(tidepool::queue::ItemId::new(), spec, now).unwrap();

	item.retry(now).unwrap();
	item.retry(now).unwrap();
	item.retry(now).unwrap();
	assert_eq!(item.retries(), 3);

	let err = item.retry(now).unwrap_err();
	assert!(matches!(err, Error::RetryLimitExceeded { max_retries: 3, .. }));
	assert_eq!(item.retries(), 3);
}
