//! 事件/命令句柄
//!
//! 句柄是弱引用：序列号 + 纪元（epoch）。`reset()` 之后纪元递增，
//! 旧句柄不会误命中新事件；事件执行或取消后，对其句柄的 `cancel` 是空操作。

/// 已调度事件的句柄。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle {
    pub(crate) seq: u64,
    pub(crate) epoch: u64,
}

impl EventHandle {
    /// 该事件的插入序号（同一时刻内的执行顺序）。
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// 命令队列中条目的句柄。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandHandle {
    pub(crate) id: u64,
    pub(crate) epoch: u64,
}
