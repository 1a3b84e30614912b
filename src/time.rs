// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Monotonic time and the 802.11 "time unit".

use std::{ops, time::Duration};

/// A point on the monotonic clock, in nanoseconds since an arbitrary origin.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(i64);

impl Time {
    pub const ZERO: Time = Time(0);

    pub fn from_nanos(nanos: i64) -> Self {
        Time(nanos)
    }

    pub fn into_nanos(self) -> i64 {
        self.0
    }
}

impl ops::Add<Duration> for Time {
    type Output = Time;

    fn add(self, rhs: Duration) -> Time {
        Time(self.0.saturating_add(rhs.as_nanos() as i64))
    }
}

impl ops::Sub<Time> for Time {
    type Output = Duration;

    fn sub(self, rhs: Time) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(rhs.0).max(0) as u64)
    }
}

/// IEEE Std 802.11-2016, 9.4.1.3: a time unit (TU) is 1024 microseconds.
/// Beacon intervals and MLME timeouts are expressed in TUs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimeUnit(pub u16);

impl TimeUnit {
    pub const MICROS_PER_TIME_UNIT: u64 = 1024;
    pub const DEFAULT_BEACON_INTERVAL: TimeUnit = TimeUnit(100);

    /// The duration of `count` intervals of `self` time units, e.g. a timeout of
    /// `count` beacon periods.
    pub fn into_duration_times(self, count: u32) -> Duration {
        Duration::from_micros(self.0 as u64 * Self::MICROS_PER_TIME_UNIT) * count
    }
}

impl From<TimeUnit> for Duration {
    fn from(tu: TimeUnit) -> Duration {
        Duration::from_micros(tu.0 as u64 * TimeUnit::MICROS_PER_TIME_UNIT)
    }
}
