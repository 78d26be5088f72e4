//! 链路层 ARQ
//!
//! 三种可靠传输引擎：
//! - [`StopAndWait`]：交替位，单个未确认帧
//! - [`CumulativeAck`]：Go-Back-N 风格的累计确认（RR），接收端缓存乱序帧
//! - [`SelectiveRepeat`]：逐帧 ACK，按需选择重传
//!
//! 引擎本身不持有链路：上层通过 `process_outgoing` 交入数据，
//! 通过 `get_ack`/`get_data` 取出要发送的帧，通过 `process_incoming`
//! 交入收到的帧。超时事件由构造时注入的 [`TimeoutRoute`](crate::timer::TimeoutRoute)
//! 生成，事件执行时应调用引擎的 `on_timeout`。

mod compound;
mod cumulative_ack;
mod error;
mod selective_repeat;
mod seq;
mod stats;
mod stop_and_wait;

pub use compound::{ArqCommand, Compound, FrameType};
pub use cumulative_ack::{CumulativeAck, CumulativeAckConfig};
pub use error::ArqError;
pub use selective_repeat::{SelectiveRepeat, SelectiveRepeatConfig};
pub use seq::SeqSpace;
pub use stats::ArqStats;
pub use stop_and_wait::{StopAndWait, StopAndWaitConfig};

use crate::sim::Simulator;
use crate::timer::TimerKey;

/// 处理一个收到的帧的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reception {
    /// 按序交付给上层的数据帧（可能包含之前缓存的后续帧）
    Delivered(Vec<Compound>),
    /// 乱序帧已缓存，等待前面的帧到达
    Buffered,
    /// 重复数据帧，已丢弃
    Duplicate,
    /// 确认帧释放了 `released` 个未确认帧
    Acked { released: usize },
    /// 过期或重复的确认帧，已忽略
    StaleAck,
}

impl Reception {
    pub fn delivered(&self) -> &[Compound] {
        match self {
            Reception::Delivered(v) => v,
            _ => &[],
        }
    }
}

/// ARQ 引擎的统一接口。
pub trait Arq {
    /// 链路名（日志与错误信息用）
    fn name(&self) -> &str;

    /// 能否再接受一个上层数据帧。
    fn has_capacity(&self) -> bool;

    /// 交入上层数据帧，分配序号。没有容量时返回 `CapacityExceeded`。
    fn process_outgoing(&mut self, sim: &mut Simulator, compound: Compound) -> Result<(), ArqError>;

    fn process_incoming(&mut self, sim: &mut Simulator, compound: Compound) -> Result<Reception, ArqError>;

    fn has_ack(&self) -> bool;

    fn has_data(&self) -> bool;

    fn get_ack(&mut self, sim: &mut Simulator) -> Option<Compound>;

    /// 取出下一个要发送的数据帧（返回副本），并设置对应的重传定时器。
    fn get_data(&mut self, sim: &mut Simulator) -> Result<Compound, ArqError>;

    fn on_timeout(&mut self, sim: &mut Simulator, key: TimerKey) -> Result<(), ArqError>;

    /// 没有任何未确认的数据帧。
    fn is_idle(&self) -> bool;

    fn stats(&self) -> &ArqStats;

    /// 同时有 ACK 和数据待发时是否先发 ACK。
    fn prefer_ack(&self) -> bool {
        true
    }

    fn has_something_to_send(&self) -> bool {
        self.has_ack() || self.has_data()
    }

    fn get_something_to_send(&mut self, sim: &mut Simulator) -> Result<Option<Compound>, ArqError> {
        if self.prefer_ack() {
            if let Some(ack) = self.get_ack(sim) {
                return Ok(Some(ack));
            }
            if self.has_data() {
                return self.get_data(sim).map(Some);
            }
            return Ok(None);
        }
        if self.has_data() {
            return self.get_data(sim).map(Some);
        }
        Ok(self.get_ack(sim))
    }
}
