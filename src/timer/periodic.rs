//! 周期定时器
//!
//! 首次在 `delay` 之后触发，之后每隔 `period` 触发一次。所有者在收到触发事件时
//! 调用 [`PeriodicTimeout::rearm`] 预约下一次，然后再做自己的周期性工作。

use tracing::trace;

use super::timeout::{Timeout, TimerError};
use super::{TimeoutRoute, TimerKey};
use crate::sim::{SimTime, Simulator};

#[derive(Clone, Default)]
pub struct PeriodicTimeout {
    timer: Timeout,
    period: SimTime,
    key: TimerKey,
    route: Option<TimeoutRoute>,
}

impl std::fmt::Debug for PeriodicTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTimeout")
            .field("timer", &self.timer)
            .field("period", &self.period)
            .field("key", &self.key)
            .field("started", &self.route.is_some())
            .finish()
    }
}

impl PeriodicTimeout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_periodic_timeout(
        &mut self,
        sim: &mut Simulator,
        period: SimTime,
        delay: SimTime,
        key: TimerKey,
        route: TimeoutRoute,
    ) -> Result<(), TimerError> {
        if period == SimTime::ZERO {
            return Err(TimerError::ZeroPeriod);
        }
        if self.has_periodic_timeout_set() {
            return Err(TimerError::AlreadyArmed);
        }
        self.period = period;
        self.key = key;
        self.timer.set_timeout(sim, delay, route(key))?;
        self.route = Some(route);
        trace!(period = ?period, delay = ?delay, key, "周期定时器已启动");
        Ok(())
    }

    /// 在周期回调里调用：预约下一次触发。定时器已被取消时什么也不做。
    pub fn rearm(&mut self, sim: &mut Simulator) -> Result<(), TimerError> {
        let Some(route) = self.route.as_ref() else {
            return Ok(());
        };
        let ev = route(self.key);
        self.timer.set_timeout(sim, self.period, ev)
    }

    pub fn cancel_periodic_timeout(&mut self, sim: &mut Simulator) -> Result<(), TimerError> {
        if self.route.take().is_none() {
            return Err(TimerError::NotArmed);
        }
        if self.timer.has_timeout_set(sim) {
            self.timer.cancel_timeout(sim)?;
        }
        Ok(())
    }

    /// 周期定时器是否处于运行中（包括正在执行回调、尚未 rearm 的时刻）。
    pub fn has_periodic_timeout_set(&self) -> bool {
        self.route.is_some()
    }

    pub fn period(&self) -> SimTime {
        self.period
    }
}
