//! ARQ 统计信息

use serde::Serialize;

/// 单个 ARQ 实体的计数器。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArqStats {
    /// 发出的数据帧（含重传）
    pub data_sent: u64,
    pub retransmissions: u64,
    pub acks_sent: u64,
    /// 交付给上层的数据帧
    pub delivered: u64,
    /// 收到的重复数据帧
    pub duplicates: u64,
    /// 乱序到达、暂存等待交付的数据帧
    pub buffered: u64,
    /// 被确认的数据帧
    pub successes: u64,
    /// 超时（或被判定需要重传）的次数
    pub failures: u64,
    pub stale_acks: u64,
}
