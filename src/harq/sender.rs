use tracing::{debug, warn};

use super::{HarqError, TransportBlock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    Transmitting,
}

/// NACK 之后发送进程的处理结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NackOutcome {
    /// 需要重传的副本（冗余版本已推进）
    Retransmit(TransportBlock),
    /// 超过重传上限，传输块被丢弃，进程回到空闲
    Dropped(TransportBlock),
}

#[derive(Debug, Clone)]
pub struct HarqSenderProcess {
    id: usize,
    num_rvs: usize,
    retransmission_limit: u32,
    block: Option<TransportBlock>,
}

impl HarqSenderProcess {
    pub(crate) fn new(id: usize, num_rvs: usize, retransmission_limit: u32) -> Self {
        Self {
            id,
            num_rvs,
            retransmission_limit,
            block: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> SenderState {
        match self.block {
            None => SenderState::Idle,
            Some(_) => SenderState::Transmitting,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.block.is_none()
    }

    pub fn block(&self) -> Option<&TransportBlock> {
        self.block.as_ref()
    }

    /// 接管一个新传输块，返回要发送的副本。
    pub fn new_transmission(&mut self, mut block: TransportBlock) -> Result<TransportBlock, HarqError> {
        if !self.has_capacity() {
            return Err(HarqError::CapacityExceeded { process_id: self.id });
        }
        block.harq.process_id = Some(self.id);
        block.harq.rv = 0;
        block.harq.ndi = true;
        block.harq.retry_counter = 0;
        debug!(process_id = self.id, block = block.id(), "新传输");
        let out = block.clone();
        self.block = Some(block);
        Ok(out)
    }

    pub fn on_ack(&mut self) -> Result<TransportBlock, HarqError> {
        self.block
            .take()
            .ok_or(HarqError::ProcessIdle { process_id: self.id })
    }

    pub fn on_nack(&mut self) -> Result<NackOutcome, HarqError> {
        let Some(block) = self.block.as_mut() else {
            return Err(HarqError::ProcessIdle { process_id: self.id });
        };
        block.harq.ndi = false;
        block.harq.retry_counter += 1;
        block.harq.rv = (block.harq.rv + 1) % self.num_rvs;

        if block.harq.retry_counter > self.retransmission_limit {
            warn!(
                process_id = self.id,
                block = block.id(),
                retries = block.harq.retry_counter,
                "❌ 超过重传上限，丢弃传输块"
            );
            let dropped = self.block.take().ok_or(HarqError::ProcessIdle { process_id: self.id })?;
            return Ok(NackOutcome::Dropped(dropped));
        }
        debug!(
            process_id = self.id,
            block = block.id(),
            rv = block.harq.rv,
            retry = block.harq.retry_counter,
            "NACK，准备重传"
        );
        Ok(NackOutcome::Retransmit(block.clone()))
    }
}
