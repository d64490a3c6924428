//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of stubmail.
//
// Stubmail is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Stubmail is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along
// with stubmail. If not, see <http://www.gnu.org/licenses/>.

//! Cross-thread coordination between test code and message delivery.
//!
//! A test thread that wants to block until N messages have arrived registers
//! a waiter against the store-wide monitor. The target is absolute: a waiter
//! registered for a total of 3 arrivals when 1 has already happened needs 2
//! more, and deliveries that happened before registration are never counted
//! twice. Delivery threads call `message_delivered` and never block on
//! waiters.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Store-wide delivery counter with blocking waiters.
pub struct DeliveryMonitor {
    state: Mutex<MonitorState>,
    wakeup: Condvar,
}

#[derive(Default)]
struct MonitorState {
    delivered: u64,
    next_waiter_id: u64,
    /// (id, arrivals still needed) for every outstanding waiter.
    waiters: Vec<(u64, u64)>,
}

impl DeliveryMonitor {
    pub fn new() -> Self {
        DeliveryMonitor {
            state: Mutex::new(MonitorState::default()),
            wakeup: Condvar::new(),
        }
    }

    /// Total messages delivered since the monitor was created.
    pub fn delivered_count(&self) -> u64 {
        self.state.lock().unwrap().delivered
    }

    /// Record one delivery and wake any waiters it satisfies.
    pub fn message_delivered(&self) {
        let mut state = self.state.lock().unwrap();
        state.delivered += 1;
        for waiter in &mut state.waiters {
            waiter.1 = waiter.1.saturating_sub(1);
        }
        self.wakeup.notify_all();
    }

    /// Register interest in `total` messages having been delivered overall.
    ///
    /// Returns `None` if the target is already met, in which case there is
    /// nothing to wait for. Otherwise the remaining count is fixed at this
    /// moment; the returned waiter completes after that many further
    /// deliveries regardless of any other waiters.
    pub fn register_waiter(self: &Arc<Self>, total: u64) -> Option<Waiter> {
        let mut state = self.state.lock().unwrap();
        if state.delivered >= total {
            return None;
        }

        let remaining = total - state.delivered;
        let id = state.next_waiter_id;
        state.next_waiter_id += 1;
        state.waiters.push((id, remaining));

        Some(Waiter {
            monitor: Arc::clone(self),
            id,
        })
    }

    /// Block the calling thread until `total` messages have been delivered
    /// overall, or until `timeout` elapses. Returns whether the target was
    /// reached.
    pub fn wait_for_deliveries(
        self: &Arc<Self>,
        total: u64,
        timeout: Duration,
    ) -> bool {
        match self.register_waiter(total) {
            None => true,
            Some(waiter) => waiter.await_arrivals(timeout),
        }
    }
}

/// A registered waiter. Dropping it deregisters without waiting.
pub struct Waiter {
    monitor: Arc<DeliveryMonitor>,
    id: u64,
}

impl Waiter {
    /// Block until this waiter's remaining-arrivals count reaches zero or
    /// the timeout expires, returning whether the count was reached.
    pub fn await_arrivals(self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.monitor.state.lock().unwrap();

        loop {
            let remaining = state
                .waiters
                .iter()
                .find(|w| w.0 == self.id)
                .map(|w| w.1)
                .unwrap_or(0);
            if 0 == remaining {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            state = self
                .monitor
                .wakeup
                .wait_timeout(state, deadline - now)
                .unwrap()
                .0;
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        let mut state = self.monitor.state.lock().unwrap();
        state.waiters.retain(|w| w.0 != self.id);
    }
}
