//! Retry scheduling with exponential backoff.
//!
//! [`RetryScheduler`] is a plain data structure: a min-heap of
//! `(fire_at, seq, id)` plus the actions it is holding. Callers pass the
//! current instant in, so the scheduler never reads a clock itself.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use tokio::time::Instant;

use super::action::QueuedAction;

/// How many times an action is attempted and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts after which the action is dropped.
    pub max_retries: u32,
    /// Backoff base; the wait before retry `n` is `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt that follows failure number `retries`.
    #[must_use]
    pub fn delay_for(&self, retries: u32) -> Duration {
        2_u32
            .checked_pow(retries)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}

/// Outcome of reporting a failure to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// The action is held until `fire_at`.
    Scheduled {
        /// Backoff applied.
        delay: Duration,
        /// When the action becomes eligible again.
        fire_at: Instant,
        /// Failed attempts so far.
        retries: u32,
    },
    /// The retry budget is spent; the action is returned for reporting.
    Exhausted(QueuedAction),
}

struct Held {
    action: QueuedAction,
    seq: u64,
}

/// Holds failed actions out of the active queue until their backoff ends.
pub struct RetryScheduler {
    policy: RetryPolicy,
    timers: BinaryHeap<Reverse<(Instant, u64, String)>>,
    held: HashMap<String, Held>,
    next_seq: u64,
}

impl RetryScheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            timers: BinaryHeap::new(),
            held: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Record a failed attempt of `action`.
    pub fn on_failure(&mut self, mut action: QueuedAction, now: Instant) -> RetryDecision {
        action.retries = action.retries.saturating_add(1);
        if action.retries >= self.policy.max_retries {
            return RetryDecision::Exhausted(action);
        }

        let retries = action.retries;
        let delay = self.policy.delay_for(retries);
        let fire_at = now.checked_add(delay).unwrap_or(now + Duration::from_secs(86_400 * 365));
        self.hold(action, fire_at);

        RetryDecision::Scheduled {
            delay,
            fire_at,
            retries,
        }
    }

    fn hold(&mut self, action: QueuedAction, fire_at: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.push(Reverse((fire_at, seq, action.id.clone())));
        self.held.insert(
            action.id.clone(),
            Held { action, seq },
        );
    }

    /// Drop heap entries whose action was cancelled or rescheduled.
    fn prune(&mut self) {
        loop {
            let stale = match self.timers.peek() {
                Some(Reverse((_, seq, id))) => self.held.get(id).map_or(true, |h| h.seq != *seq),
                None => false,
            };
            if !stale {
                break;
            }
            self.timers.pop();
        }
    }

    /// Earliest instant at which a held action becomes due.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.prune();
        self.timers.peek().map(|Reverse((fire_at, _, _))| *fire_at)
    }

    /// Release every action whose backoff has ended by `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<QueuedAction> {
        let mut due = Vec::new();
        loop {
            self.prune();
            match self.timers.peek() {
                Some(Reverse((fire_at, _, _))) if *fire_at <= now => {}
                _ => break,
            }
            if let Some(Reverse((_, _, id))) = self.timers.pop() {
                if let Some(held) = self.held.remove(&id) {
                    due.push(held.action);
                }
            }
        }
        due
    }

    /// Stop waiting on one action and hand it back.
    pub fn cancel(&mut self, id: &str) -> Option<QueuedAction> {
        self.held.remove(id).map(|held| held.action)
    }

    /// Forget every timer and hand back all held actions.
    pub fn cancel_all(&mut self) -> Vec<QueuedAction> {
        self.timers.clear();
        self.held.drain().map(|(_, held)| held.action).collect()
    }

    /// Whether `id` is waiting out a backoff.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.held.contains_key(id)
    }

    /// Held actions, in no particular order.
    pub fn held(&self) -> impl Iterator<Item = &QueuedAction> {
        self.held.values().map(|held| &held.action)
    }

    /// Number of held actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// Whether nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ActionType;
    use chrono::Utc;
    use serde_json::json;

    fn action(t: ActionType) -> QueuedAction {
        QueuedAction::new(t, json!({}), Utc::now())
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for(5), Duration::from_secs(32));
        assert_eq!(policy.delay_for(64), Duration::MAX);
    }

    #[test]
    fn test_backoff_until_exhausted() {
        let mut scheduler = RetryScheduler::new(RetryPolicy::default());
        let now = Instant::now();
        let mut current = action(ActionType::SendMessage);

        for n in 1..=4 {
            match scheduler.on_failure(current.clone(), now) {
                RetryDecision::Scheduled {
                    delay,
                    fire_at,
                    retries,
                } => {
                    assert_eq!(retries, n);
                    assert_eq!(delay, Duration::from_secs(1) * 2_u32.pow(n));
                    assert_eq!(fire_at, now + delay);
                }
                RetryDecision::Exhausted(_) => panic!("exhausted after {n} failures"),
            }
            current = scheduler.take_due(now + Duration::from_secs(60)).remove(0);
        }

        match scheduler.on_failure(current, now) {
            RetryDecision::Exhausted(dropped) => assert_eq!(dropped.retries, 5),
            RetryDecision::Scheduled { .. } => panic!("fifth failure must be terminal"),
        }
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_take_due_respects_deadlines() {
        let mut scheduler = RetryScheduler::new(RetryPolicy::default());
        let now = Instant::now();

        let early = action(ActionType::CheckIn);
        let mut late = action(ActionType::CheckIn);
        late.retries = 2;
        scheduler.on_failure(early.clone(), now);
        scheduler.on_failure(late.clone(), now);

        assert_eq!(scheduler.next_deadline(), Some(now + Duration::from_secs(2)));
        assert!(scheduler.take_due(now + Duration::from_secs(1)).is_empty());

        let due = scheduler.take_due(now + Duration::from_secs(2));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, early.id);
        assert_eq!(scheduler.next_deadline(), Some(now + Duration::from_secs(8)));

        let due = scheduler.take_due(now + Duration::from_secs(8));
        assert_eq!(due[0].id, late.id);
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn test_cancel_skips_stale_timer() {
        let mut scheduler = RetryScheduler::new(RetryPolicy::default());
        let now = Instant::now();
        let a = action(ActionType::SubmitRating);
        scheduler.on_failure(a.clone(), now);

        let cancelled = scheduler.cancel(&a.id).unwrap();
        assert_eq!(cancelled.retries, 1);
        assert!(!scheduler.contains(&a.id));
        assert_eq!(scheduler.next_deadline(), None);
        assert!(scheduler.take_due(now + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn test_cancel_all_returns_held_actions() {
        let mut scheduler = RetryScheduler::new(RetryPolicy::default());
        let now = Instant::now();
        scheduler.on_failure(action(ActionType::CheckIn), now);
        scheduler.on_failure(action(ActionType::CreateSpot), now);

        let released = scheduler.cancel_all();
        assert_eq!(released.len(), 2);
        assert!(released.iter().all(|a| a.retries == 1));
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.next_deadline(), None);
    }
}
