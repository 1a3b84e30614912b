// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Multiplexes many logical deadlines onto a single underlying timer.
//!
//! [`TimerManager`] tracks plain deadlines as [`TimedEvent`] handles. [`Timer`] pairs each
//! deadline with a caller-defined event value and is what the state machines use. Both keep
//! the underlying timer armed to the earliest still-active deadline and never re-program it
//! on cancellation; stale deadlines are skipped at delivery time instead.

use {
    crate::{error::Error, time::Time},
    log::error,
    std::{cell::Cell, collections::HashMap, rc::Rc, time::Duration},
};

/// The single hardware/OS timer a `TimerManager` multiplexes. Arming replaces any previous
/// deadline. Implementations must deliver an expiration no earlier than the armed deadline.
pub trait Scheduler {
    fn now(&self) -> Time;
    fn arm(&mut self, deadline: Time) -> Result<(), Error>;
    fn disarm(&mut self);
}

struct TimedEventState {
    id: u64,
    deadline: Time,
    canceled: Cell<bool>,
}

/// A handle to one scheduled deadline. Canceling is O(1) bookkeeping: the event becomes
/// inert and is discarded the next time the manager looks for fired events. A handle is
/// never reused after it fired.
#[derive(Clone)]
pub struct TimedEvent(Rc<TimedEventState>);

impl TimedEvent {
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn deadline(&self) -> Time {
        self.0.deadline
    }

    pub fn cancel(&self) {
        self.0.canceled.set(true);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.canceled.get()
    }
}

/// Tracks all outstanding deadlines and keeps the underlying timer armed to the earliest
/// active one.
pub struct TimerManager {
    scheduler: Box<dyn Scheduler>,
    // Insertion order is scheduling order; ids are monotonic and break deadline ties.
    events: Vec<TimedEvent>,
    armed: Option<Time>,
    next_id: u64,
}

impl TimerManager {
    pub fn new(scheduler: Box<dyn Scheduler>) -> Self {
        Self { scheduler, events: vec![], armed: None, next_id: 0 }
    }

    pub fn now(&self) -> Time {
        self.scheduler.now()
    }

    /// Schedules a new deadline. The underlying timer is re-armed only if `deadline`
    /// precedes the currently armed one. If arming fails the error is propagated and the
    /// event is not recorded.
    pub fn schedule(&mut self, deadline: Time) -> Result<TimedEvent, Error> {
        match self.armed {
            Some(armed) if armed <= deadline => (),
            _ => {
                self.scheduler.arm(deadline)?;
                self.armed = Some(deadline);
            }
        }
        self.next_id += 1;
        let event = TimedEvent(Rc::new(TimedEventState {
            id: self.next_id,
            deadline,
            canceled: Cell::new(false),
        }));
        self.events.push(event.clone());
        Ok(event)
    }

    /// Pops the earliest event whose deadline is at or before `now`, discarding canceled
    /// entries along the way. Equal deadlines fire in scheduling order. Returns `None` once
    /// no event is due, at which point the underlying timer has been re-armed to the
    /// next-earliest active deadline, or disarmed if none remain.
    pub fn next_fired(&mut self, now: Time) -> Option<TimedEvent> {
        self.events.retain(|e| !e.is_canceled());
        let idx = self
            .events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.deadline() <= now)
            .min_by_key(|(_, e)| (e.deadline(), e.id()))
            .map(|(idx, _)| idx);
        match idx {
            Some(idx) => Some(self.events.remove(idx)),
            None => {
                self.rearm();
                None
            }
        }
    }

    fn rearm(&mut self) {
        let next = self.events.iter().map(|e| e.deadline()).min();
        if next == self.armed {
            return;
        }
        match next {
            Some(deadline) => {
                if let Err(e) = self.scheduler.arm(deadline) {
                    error!("failed to re-arm timer: {}", e);
                    return;
                }
            }
            None => self.scheduler.disarm(),
        }
        self.armed = next;
    }
}

/// A unique, monotonically increasing identifier for an event scheduled with [`Timer`].
/// Ids are never reused, so a stale id cancels nothing.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Copy, Clone)]
pub struct EventId(u64);

/// A timer to schedule, cancel and retrieve timed events of a caller-defined type.
pub struct Timer<E> {
    manager: TimerManager,
    events: HashMap<EventId, (TimedEvent, E)>,
}

impl<E> Timer<E> {
    pub fn new(scheduler: Box<dyn Scheduler>) -> Self {
        Self { manager: TimerManager::new(scheduler), events: HashMap::new() }
    }

    pub fn now(&self) -> Time {
        self.manager.now()
    }

    pub fn schedule_event(&mut self, deadline: Time, event: E) -> Result<EventId, Error> {
        let timed = self.manager.schedule(deadline)?;
        let id = EventId(timed.id());
        self.events.insert(id, (timed, event));
        Ok(id)
    }

    pub fn schedule_after(&mut self, duration: Duration, event: E) -> Result<EventId, Error> {
        let deadline = self.now() + duration;
        self.schedule_event(deadline, event)
    }

    pub fn cancel_event(&mut self, event_id: EventId) {
        if let Some((timed, _event)) = self.events.remove(&event_id) {
            timed.cancel();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_id, (timed, _event)) in self.events.drain() {
            timed.cancel();
        }
    }

    /// Delivery primitive for timeout handling. Callers capture `now` once and drain:
    ///
    /// ```ignore
    /// let now = timer.now();
    /// while let Some((id, event)) = timer.next_due(now) { ... }
    /// ```
    ///
    /// Events scheduled from inside the loop with a deadline at or before `now` are
    /// delivered by the same loop. Once exhausted the underlying timer is re-armed to the
    /// next pending deadline.
    pub fn next_due(&mut self, now: Time) -> Option<(EventId, E)> {
        while let Some(timed) = self.manager.next_fired(now) {
            let id = EventId(timed.id());
            if let Some((_timed, event)) = self.events.remove(&id) {
                return Some((id, event));
            }
        }
        None
    }
}

#[cfg(test)]
pub use fake_scheduler::FakeScheduler;
