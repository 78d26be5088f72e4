//! 协议数据单元（compound）
//!
//! 载荷是不透明、引用计数共享的字节；ARQ 头部（command）是按值复制的。
//! `clone()` 即逻辑上的深拷贝：重传副本拥有独立的头部，载荷仍然共享。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::sim::SimTime;

/// 帧类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    /// 信息帧（数据）
    #[default]
    I,
    /// Receive Ready：累计确认，携带下一个期望的序号
    Rr,
    /// 针对单个序号的确认（Selective Repeat）
    Ack,
}

/// ARQ 写入 compound 的头部字段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArqCommand {
    pub frame: FrameType,
    pub ns: u64,
    pub nr: u64,
    /// 本地发送次数（不上线）
    pub tx_count: u32,
    pub first_sent: Option<SimTime>,
    pub last_sent: Option<SimTime>,
    /// ACK 发出的时刻，用于测量 ACK 时延
    pub ack_sent: Option<SimTime>,
}

impl ArqCommand {
    pub fn is_ack(&self) -> bool {
        self.frame != FrameType::I
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compound {
    payload: Arc<[u8]>,
    pub arq: ArqCommand,
}

impl Compound {
    pub fn new(payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            payload: payload.into(),
            arq: ArqCommand::default(),
        }
    }

    /// 只有头部、没有载荷的控制帧（ACK/RR）。
    pub fn control(arq: ArqCommand) -> Self {
        Self {
            payload: Arc::from(Vec::new()),
            arq,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn shares_payload_with(&self, other: &Compound) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}
