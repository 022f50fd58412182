//! Periodic behaviour tasks.
//!
//! The scheduler is owned by a session and only hands out which tasks are
//! due; the session runs them against its own state. Tasks fire on tick
//! boundaries only, at most once per tick, and periods that were missed
//! while a tick overran are skipped rather than replayed.

use std::time::{Duration, Instant};

/// Behaviours the agent runs on a cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Ping,
    DirectionChange,
    Status,
}

/// Revocable handle to a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

#[derive(Debug)]
struct ScheduledTask {
    handle: TaskHandle,
    kind: TaskKind,
    period: Duration,
    next_due: Instant,
}

/// Task arena keyed by [`TaskHandle`].
#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
    next_handle: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a periodic task whose first run is `initial_delay` after `now`.
    pub fn schedule_periodic(
        &mut self,
        kind: TaskKind,
        now: Instant,
        initial_delay: Duration,
        period: Duration,
    ) -> TaskHandle {
        let handle = TaskHandle(self.next_handle);
        self.next_handle += 1;
        self.tasks.push(ScheduledTask {
            handle,
            kind,
            period: period.max(Duration::from_millis(1)),
            next_due: now + initial_delay,
        });
        handle
    }

    /// Removes a task. Returns `false` if the handle was already revoked.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.handle != handle);
        self.tasks.len() != before
    }

    pub fn is_scheduled(&self, handle: TaskHandle) -> bool {
        self.tasks.iter().any(|t| t.handle == handle)
    }

    /// Collects the tasks due at `now` in registration order and advances
    /// each past `now`.
    pub fn due(&mut self, now: Instant) -> Vec<TaskKind> {
        let mut due = Vec::new();
        for task in &mut self.tasks {
            if task.next_due > now {
                continue;
            }
            due.push(task.kind);
            while task.next_due <= now {
                task.next_due += task.period;
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drops every task.
    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}
