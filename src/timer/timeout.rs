//! 单槽定时器
//!
//! 任意时刻最多一个处于 armed 状态的事件。调度器开始执行超时事件时，
//! 该事件已不再 pending，因此定时器在回调之前就回到 Idle，回调里可以直接重新设置。

use thiserror::Error;
use tracing::trace;

use crate::sim::{Event, EventHandle, SimTime, Simulator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("timeout already set; cancel it first")]
    AlreadyArmed,
    #[error("no timeout set")]
    NotArmed,
    #[error("periodic timeout needs a non-zero period")]
    ZeroPeriod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Armed,
    Fired,
}

#[derive(Debug, Clone, Default)]
pub struct Timeout {
    handle: Option<EventHandle>,
    deadline: Option<SimTime>,
}

impl Timeout {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置定时器：`delay` 之后执行 `ev`。已设置时返回 `AlreadyArmed`。
    pub fn set_timeout(
        &mut self,
        sim: &mut Simulator,
        delay: SimTime,
        ev: Box<dyn Event>,
    ) -> Result<(), TimerError> {
        if self.has_timeout_set(sim) {
            return Err(TimerError::AlreadyArmed);
        }
        self.arm(sim, delay, ev);
        Ok(())
    }

    /// 设置定时器；若已设置则静默取消旧的。
    pub fn set_new_timeout(&mut self, sim: &mut Simulator, delay: SimTime, ev: Box<dyn Event>) {
        if let Some(h) = self.handle.take() {
            sim.cancel(h);
        }
        self.arm(sim, delay, ev);
    }

    fn arm(&mut self, sim: &mut Simulator, delay: SimTime, ev: Box<dyn Event>) {
        let handle = sim.schedule_boxed_delay(delay, ev);
        let deadline = sim.now().saturating_add(delay);
        trace!(seq = handle.seq(), deadline = ?deadline, "定时器已设置");
        self.handle = Some(handle);
        self.deadline = Some(deadline);
    }

    /// 取消定时器。未设置时返回 `NotArmed`。
    pub fn cancel_timeout(&mut self, sim: &mut Simulator) -> Result<(), TimerError> {
        if !self.has_timeout_set(sim) {
            return Err(TimerError::NotArmed);
        }
        if let Some(h) = self.handle.take() {
            sim.cancel(h);
        }
        self.deadline = None;
        Ok(())
    }

    pub fn has_timeout_set(&self, sim: &Simulator) -> bool {
        self.handle.is_some_and(|h| sim.is_pending(h))
    }

    pub fn state(&self, sim: &Simulator) -> TimerState {
        match self.handle {
            None => TimerState::Idle,
            Some(h) if sim.is_pending(h) => TimerState::Armed,
            Some(_) => TimerState::Fired,
        }
    }

    /// 处于 armed 状态时的到期时刻；未设置、已取消或已触发时为 None。
    pub fn deadline(&self, sim: &Simulator) -> Option<SimTime> {
        self.deadline.filter(|_| self.has_timeout_set(sim))
    }
}
