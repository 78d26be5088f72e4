//! 仿真器
//!
//! 定义事件驱动仿真器，维护当前时间、事件队列与命令队列。
//!
//! 全序：事件按 `(时间, 插入序号)` 执行；同一时刻按插入顺序。
//! 命令（command）是零延迟的工作单元，在下一个定时事件之前按 FIFO 全部执行。

use super::event::Event;
use super::handle::{CommandHandle, EventHandle};
use super::scheduled_event::{Action, ScheduledEvent};
use super::time::SimTime;
use super::world::World;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use thiserror::Error;
use tracing::{debug, info, trace};

/// 调度器错误。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("cannot schedule at {at:?}: current time is {now:?}")]
    InvalidTime { at: SimTime, now: SimTime },
}

/// 事件在调度器中的状态。
///
/// 取消记录只保留到该事件原定时刻过去为止，之后句柄与已执行的事件一样报告 `Executed`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Pending,
    /// 被 `cancel` 取消，或被 `reset` 丢弃
    Cancelled,
    Executed,
}

/// 事件驱动仿真器：维护当前时间与事件队列。
#[derive(Default)]
pub struct Simulator {
    now: SimTime,
    next_seq: u64,
    epoch: u64,
    q: BinaryHeap<ScheduledEvent>,
    // 不在表中的堆条目已被取消（惰性删除）
    pending: HashMap<u64, PendingEntry>,
    sentinels: usize,
    // seq -> 原定时刻；按时刻过期
    cancelled: HashMap<u64, SimTime>,
    cancel_expiry: BinaryHeap<Reverse<(SimTime, u64)>>,
    commands: VecDeque<(u64, Box<dyn Event>)>,
    next_command_id: u64,
    stop_requested: bool,
    dispatching: bool,
    events_processed: u64,
}

#[derive(Debug, Clone, Copy)]
struct PendingEntry {
    at: SimTime,
    sentinel: bool,
}

impl Simulator {
    /// 获取当前仿真时间
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// 调度事件在指定时间执行；`at` 早于当前时间时返回错误。
    #[tracing::instrument(skip(self, ev), fields(event_type = std::any::type_name::<E>(), schedule_at = ?at))]
    pub fn schedule_at<E: Event>(&mut self, at: SimTime, ev: E) -> Result<EventHandle, SimError> {
        self.schedule_boxed_at(at, Box::new(ev))
    }

    /// 调度事件在 `now + delay` 执行。
    pub fn schedule_delay<E: Event>(&mut self, delay: SimTime, ev: E) -> EventHandle {
        self.schedule_boxed_delay(delay, Box::new(ev))
    }

    /// 调度事件在当前时刻执行（排在所有已存在的同刻事件之后）。
    pub fn schedule_now<E: Event>(&mut self, ev: E) -> EventHandle {
        self.push(self.now, Action::Run(Box::new(ev)))
    }

    pub fn schedule_boxed_at(&mut self, at: SimTime, ev: Box<dyn Event>) -> Result<EventHandle, SimError> {
        if at < self.now {
            return Err(SimError::InvalidTime { at, now: self.now });
        }
        Ok(self.push(at, Action::Run(ev)))
    }

    pub fn schedule_boxed_delay(&mut self, delay: SimTime, ev: Box<dyn Event>) -> EventHandle {
        let at = self.now.saturating_add(delay);
        self.push(at, Action::Run(ev))
    }

    fn push(&mut self, at: SimTime, action: Action) -> EventHandle {
        let seq = self.next_seq;
        trace!(now = ?self.now, seq, "调度事件");

        self.next_seq = self.next_seq.wrapping_add(1);
        let sentinel = matches!(action, Action::Stop);
        if sentinel {
            self.sentinels += 1;
        }
        self.pending.insert(seq, PendingEntry { at, sentinel });
        self.q.push(ScheduledEvent { at, seq, action });
        self.maybe_compact();

        debug!(queue_size = self.q.len(), "事件已加入队列");
        EventHandle {
            seq,
            epoch: self.epoch,
        }
    }

    /// 取消事件。已执行、已取消或 reset 之前的句柄均为空操作。
    pub fn cancel(&mut self, handle: EventHandle) {
        if handle.epoch != self.epoch {
            return;
        }
        if let Some(entry) = self.pending.remove(&handle.seq) {
            if entry.sentinel {
                self.sentinels -= 1;
            }
            self.cancelled.insert(handle.seq, entry.at);
            self.cancel_expiry.push(Reverse((entry.at, handle.seq)));
            trace!(seq = handle.seq, "取消事件");
        }
    }

    /// 事件是否仍在等待执行。执行开始的那一刻起即不再 pending。
    pub fn is_pending(&self, handle: EventHandle) -> bool {
        handle.epoch == self.epoch && self.pending.contains_key(&handle.seq)
    }

    /// 句柄对应事件的状态。`reset` 之前的句柄一律视为已取消。
    pub fn state(&self, handle: EventHandle) -> EventState {
        if handle.epoch != self.epoch || self.cancelled.contains_key(&handle.seq) {
            EventState::Cancelled
        } else if self.pending.contains_key(&handle.seq) {
            EventState::Pending
        } else {
            EventState::Executed
        }
    }

    /// 插入一个命令：在下一个定时事件之前执行。
    pub fn queue_command<E: Event>(&mut self, ev: E) -> CommandHandle {
        let id = self.next_command_id;
        self.next_command_id = self.next_command_id.wrapping_add(1);
        self.commands.push_back((id, Box::new(ev)));
        trace!(id, pending_commands = self.commands.len(), "命令入队");
        CommandHandle {
            id,
            epoch: self.epoch,
        }
    }

    /// 移除尚未执行的命令；已执行或无效的句柄为空操作。
    pub fn dequeue_command(&mut self, handle: CommandHandle) {
        if handle.epoch != self.epoch {
            return;
        }
        if let Some(pos) = self.commands.iter().position(|(id, _)| *id == handle.id) {
            self.commands.remove(pos);
        }
    }

    /// 待执行的（未取消的）定时事件数量，不含内部停止哨兵。
    pub fn size(&self) -> usize {
        self.pending.len() - self.sentinels
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0 && self.commands.is_empty()
    }

    /// 已执行的事件总数（不含命令）。
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// 在 `at` 插入停止哨兵：`run` 到达该点后返回，之后的事件不执行。
    pub fn stop_at(&mut self, at: SimTime) -> Result<EventHandle, SimError> {
        if at < self.now {
            return Err(SimError::InvalidTime { at, now: self.now });
        }
        Ok(self.push(at, Action::Stop))
    }

    /// 请求停止：当前时刻的事件执行完后，`run` 不再推进时间。
    pub fn stop(&mut self) {
        debug!(now = ?self.now, "请求停止");
        self.stop_requested = true;
    }

    /// 重置到初始状态（测试用）。不得在事件执行过程中调用。
    pub fn reset(&mut self) {
        debug_assert!(!self.dispatching, "reset() called while an event is being dispatched");
        self.q.clear();
        self.pending.clear();
        self.sentinels = 0;
        self.cancelled.clear();
        self.cancel_expiry.clear();
        self.commands.clear();
        self.now = SimTime::ZERO;
        self.next_seq = 0;
        self.next_command_id = 0;
        self.epoch = self.epoch.wrapping_add(1);
        self.stop_requested = false;
        self.events_processed = 0;
        debug!(epoch = self.epoch, "调度器已重置");
    }

    fn run_commands(&mut self, world: &mut dyn World) -> bool {
        let mut ran = false;
        while let Some((id, cmd)) = self.commands.pop_front() {
            trace!(id, "执行命令");
            self.dispatching = true;
            cmd.execute(self, world);
            self.dispatching = false;
            ran = true;
        }
        ran
    }

    // 丢弃堆顶已被取消的条目，返回下一个有效条目的时间。
    fn next_live_time(&mut self) -> Option<SimTime> {
        while let Some(top) = self.q.peek() {
            if self.pending.contains_key(&top.seq) {
                return Some(top.at);
            }
            self.q.pop();
        }
        None
    }

    /// 仍保留的取消记录数（原定时刻尚未过去的已取消事件）。
    pub fn retained_cancellations(&self) -> usize {
        self.cancelled.len()
    }

    // 时间推进后丢弃原定时刻已过的取消记录。
    fn forget_expired_cancellations(&mut self) {
        while let Some(Reverse((at, seq))) = self.cancel_expiry.peek().copied() {
            if at >= self.now {
                break;
            }
            self.cancel_expiry.pop();
            self.cancelled.remove(&seq);
        }
    }

    fn maybe_compact(&mut self) {
        if self.q.len() > 64 && self.q.len() > 2 * self.pending.len() {
            let pending = &self.pending;
            self.q.retain(|item| pending.contains_key(&item.seq));
        }
    }

    /// 执行一个工作单元：先清空命令队列，再执行最早的定时事件。
    ///
    /// 队列为空、遇到停止哨兵或 `stop()` 请求生效时返回 false。
    pub fn process_one_event(&mut self, world: &mut dyn World) -> bool {
        let ran_commands = self.run_commands(world);

        let Some(next_at) = self.next_live_time() else {
            self.stop_requested = false;
            return ran_commands;
        };
        if self.stop_requested && next_at > self.now {
            self.stop_requested = false;
            info!(now = ?self.now, "⏹️  仿真已停止");
            return false;
        }

        let item = self.q.pop().expect("peek then pop");
        let sentinel = self
            .pending
            .remove(&item.seq)
            .is_some_and(|entry| entry.sentinel);
        debug_assert!(item.at >= self.now, "event scheduled in the past");
        self.now = item.at;
        self.forget_expired_cancellations();

        match item.action {
            Action::Stop => {
                if sentinel {
                    self.sentinels -= 1;
                }
                info!(now = ?self.now, "⏹️  到达停止点");
                false
            }
            Action::Run(ev) => {
                self.events_processed += 1;
                debug!(
                    event_num = self.events_processed,
                    now = ?self.now,
                    seq = item.seq,
                    remaining_queue = self.size(),
                    "执行事件"
                );
                self.dispatching = true;
                ev.execute(self, world);
                self.dispatching = false;
                world.on_tick(self);
                true
            }
        }
    }

    /// 运行直到事件队列为空或到达 `until`（含 `until` 时刻的事件）。
    pub fn run_until(&mut self, until: SimTime, world: &mut dyn World) {
        loop {
            match self.next_live_time() {
                Some(at) if at <= until => {
                    if !self.process_one_event(world) {
                        return;
                    }
                }
                _ => {
                    self.run_commands(world);
                    break;
                }
            }
        }
        self.now = self.now.max(until);
        self.forget_expired_cancellations();
    }

    /// 运行所有事件直到队列为空或被停止。
    #[tracing::instrument(skip(self, world))]
    pub fn run(&mut self, world: &mut dyn World) {
        info!("▶️  开始运行仿真");
        debug!(now = ?self.now, queue_size = self.size(), "初始状态");

        let start = self.events_processed;
        while self.process_one_event(world) {}

        info!(
            total_events = self.events_processed - start,
            final_time = ?self.now,
            "✅ 仿真完成"
        );
    }
}
