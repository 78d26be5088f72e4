//! 定时器（超时）能力
//!
//! 基于调度器的单槽定时器 [`Timeout`] 与周期定时器 [`PeriodicTimeout`]。
//! 定时器本身只持有事件句柄；触发时调用的事件由所有者提供的
//! [`TimeoutRoute`] 构造，负责在 world 中找到所有者并调用其超时处理。

mod periodic;
mod timeout;

use std::sync::Arc;

use crate::sim::Event;

pub use periodic::PeriodicTimeout;
pub use timeout::{Timeout, TimerError, TimerState};

/// 区分同一所有者的多个定时器（例如 ARQ 发送窗口的槽位）。
pub type TimerKey = usize;

/// 构造“定时器 `key` 已触发”事件的工厂。
pub type TimeoutRoute = Arc<dyn Fn(TimerKey) -> Box<dyn Event> + Send + Sync>;
