use serde::Serialize;
use tracing::{debug, trace};

use super::{Decoder, HarqError, PeerId, SoftCombiningBuffer, TransportBlock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Ack,
    Nack,
}

/// 接收进程给发送方的反馈。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Feedback {
    pub kind: FeedbackKind,
    /// 反馈发出方（接收端）
    pub from: PeerId,
    /// 反馈目的地（传输块的发送方）
    pub to: PeerId,
    pub process_id: usize,
    pub block_id: u64,
}

/// 一次接收的结果：反馈以及解码成功时的传输块。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarqReception {
    pub feedback: Feedback,
    pub decoded: Option<TransportBlock>,
}

#[derive(Debug, Clone)]
pub struct HarqReceiverProcess {
    id: usize,
    retransmission_limit: u32,
    buffer: SoftCombiningBuffer<TransportBlock>,
}

impl HarqReceiverProcess {
    pub fn new(id: usize, num_rvs: usize, retransmission_limit: u32) -> Self {
        Self {
            id,
            retransmission_limit,
            buffer: SoftCombiningBuffer::new(num_rvs),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn buffer(&self) -> &SoftCombiningBuffer<TransportBlock> {
        &self.buffer
    }

    pub fn is_idle(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn on_block_received(
        &mut self,
        local: PeerId,
        block: TransportBlock,
        decoder: &mut dyn Decoder,
    ) -> Result<HarqReception, HarqError> {
        if block.harq.ndi {
            self.buffer.clear();
        }
        if let Some(buffered) = self.buffer.iter().next()
            && buffered.id() != block.id()
        {
            return Err(HarqError::MixedTransportBlocks {
                process_id: self.id,
                buffered: buffered.id(),
                received: block.id(),
            });
        }

        let info = block.harq;
        self.buffer.append(info.rv, block.clone())?;
        let decoded = decoder.can_decode(&self.buffer);
        trace!(
            process_id = self.id,
            block = block.id(),
            rv = info.rv,
            combined = self.buffer.total_entries(),
            decoded,
            "软合并"
        );

        let kind = if decoded {
            self.buffer.clear();
            FeedbackKind::Ack
        } else {
            if info.retry_counter >= self.retransmission_limit {
                debug!(process_id = self.id, block = block.id(), "达到重传上限，清空软合并缓存");
                self.buffer.clear();
            }
            FeedbackKind::Nack
        };
        Ok(HarqReception {
            feedback: Feedback {
                kind,
                from: local,
                to: info.source,
                process_id: self.id,
                block_id: block.id(),
            },
            decoded: decoded.then_some(block),
        })
    }
}
