use serde::{Deserialize, Serialize};

use crate::arq::{Compound, FrameType};
use crate::sim::SimTime;

/// 可视化事件类型
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VizEventKind {
    /// 链路元信息（作为 t=0 的第一条事件）
    Meta {
        endpoints: Vec<VizEndpoint>,
        latency_ns: u64,
    },
    /// ARQ 帧进入信道
    FrameTx { from: usize, to: usize, frame: VizFrame },
    /// 帧被信道丢弃
    FrameLost { from: usize, to: usize, frame: VizFrame },
    /// 帧到达对端
    FrameRx { node: usize, frame: VizFrame },
    /// 数据帧按序交付给上层
    Delivered { node: usize, ns: u64 },
    /// 重传定时器触发
    Timeout { node: usize, key: usize },
    /// HARQ：传输块（首传或重传）
    HarqTx {
        from: u32,
        to: u32,
        block: u64,
        process_id: Option<usize>,
        rv: usize,
        ndi: bool,
        retry: u32,
    },
    /// HARQ：ACK/NACK 反馈
    HarqFeedback {
        from: u32,
        to: u32,
        block: u64,
        process_id: usize,
        ack: bool,
    },
    /// HARQ：超过重传上限被丢弃
    HarqDrop { node: u32, block: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VizEndpoint {
    pub id: usize,
    pub name: String,
    pub engine: String,
}

/// ARQ 帧头的可视化字段
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VizFrame {
    pub frame: FrameType,
    pub ns: u64,
    pub nr: u64,
    /// 第几次发送（ACK 为 0）
    pub tx: u32,
}

impl From<&Compound> for VizFrame {
    fn from(c: &Compound) -> Self {
        VizFrame {
            frame: c.arq.frame,
            ns: c.arq.ns,
            nr: c.arq.nr,
            tx: c.arq.tx_count,
        }
    }
}

/// 一个可回放的事件（JSON）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VizEvent {
    /// 仿真时间（纳秒，和 `SimTime.0` 同口径）
    pub t_ns: u64,
    #[serde(flatten)]
    pub kind: VizEventKind,
}

/// 一个简单的事件收集器（存内存，仿真结束写 JSON 文件）
#[derive(Debug, Default)]
pub struct VizLogger {
    pub events: Vec<VizEvent>,
}

impl VizLogger {
    pub fn push(&mut self, ev: VizEvent) {
        self.events.push(ev);
    }

    pub fn record(&mut self, now: SimTime, kind: VizEventKind) {
        self.push(VizEvent {
            t_ns: now.as_nanos(),
            kind,
        });
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.events)
    }
}
