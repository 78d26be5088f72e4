use std::sync::Arc;

use serde::Serialize;

use super::PeerId;

/// HARQ 写入传输块的头部。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HarqInfo {
    /// 发送进程号；整个重传生命周期内保持不变
    pub process_id: Option<usize>,
    /// 冗余版本
    pub rv: usize,
    /// 新数据指示
    pub ndi: bool,
    pub retry_counter: u32,
    /// 发送方（反馈的目的地）
    pub source: PeerId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportBlock {
    id: u64,
    payload: Arc<[u8]>,
    pub harq: HarqInfo,
}

impl TransportBlock {
    pub fn new(id: u64, source: PeerId, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id,
            payload: payload.into(),
            harq: HarqInfo {
                source,
                ..HarqInfo::default()
            },
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn shares_payload_with(&self, other: &TransportBlock) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}
