use std::collections::VecDeque;

use tracing::debug;

use super::{
    Decoder, HarqConfig, HarqError, HarqReceiverProcess, HarqReception, HarqSenderProcess, NackOutcome, PeerId,
    TransportBlock,
};

/// 与一个对端之间的全部 HARQ 进程。
#[derive(Debug)]
pub struct HarqEntity {
    local: PeerId,
    peer: PeerId,
    senders: Vec<HarqSenderProcess>,
    receivers: Vec<HarqReceiverProcess>,
    retransmissions: VecDeque<TransportBlock>,
    decoder: Box<dyn Decoder>,
}

impl HarqEntity {
    /// `cfg` 须已通过 [`HarqConfig::validate`]。
    pub(crate) fn new(local: PeerId, peer: PeerId, cfg: &HarqConfig, decoder: Box<dyn Decoder>) -> Self {
        Self {
            local,
            peer,
            senders: (0..cfg.num_sender_processes)
                .map(|i| HarqSenderProcess::new(i, cfg.num_rvs, cfg.retransmission_limit))
                .collect(),
            receivers: (0..cfg.num_receiver_processes)
                .map(|i| HarqReceiverProcess::new(i, cfg.num_rvs, cfg.retransmission_limit))
                .collect(),
            retransmissions: VecDeque::new(),
            decoder,
        }
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn senders(&self) -> &[HarqSenderProcess] {
        &self.senders
    }

    pub fn receivers(&self) -> &[HarqReceiverProcess] {
        &self.receivers
    }

    pub fn has_capacity(&self) -> bool {
        self.senders.iter().any(HarqSenderProcess::has_capacity)
    }

    /// 有空闲（软合并缓存为空）的接收进程。
    pub fn has_receiver_capacity(&self) -> bool {
        self.receivers.iter().any(HarqReceiverProcess::is_idle)
    }

    /// 首个空闲发送进程接管传输块，返回要发送的副本。
    pub fn new_transmission(&mut self, block: TransportBlock) -> Result<TransportBlock, HarqError> {
        let process = self
            .senders
            .iter_mut()
            .find(|p| p.has_capacity())
            .ok_or(HarqError::NoCapacity { peer: self.peer })?;
        process.new_transmission(block)
    }

    /// 交给 `process_id` 对应的接收进程做软合并与解码。
    pub fn can_decode(&mut self, block: TransportBlock) -> Result<HarqReception, HarqError> {
        let count = self.receivers.len();
        let process_id = block.harq.process_id;
        let process = process_id
            .and_then(|id| self.receivers.get_mut(id))
            .ok_or(HarqError::InvalidProcess { process_id, count })?;
        process.on_block_received(self.local, block, self.decoder.as_mut())
    }

    fn sender_mut(&mut self, process_id: usize) -> Result<&mut HarqSenderProcess, HarqError> {
        let count = self.senders.len();
        self.senders.get_mut(process_id).ok_or(HarqError::InvalidProcess {
            process_id: Some(process_id),
            count,
        })
    }

    pub fn on_ack(&mut self, process_id: usize) -> Result<TransportBlock, HarqError> {
        self.sender_mut(process_id)?.on_ack()
    }

    /// NACK：需要重传时副本进入重传队列。
    pub fn on_nack(&mut self, process_id: usize) -> Result<NackOutcome, HarqError> {
        let outcome = self.sender_mut(process_id)?.on_nack()?;
        if let NackOutcome::Retransmit(block) = &outcome {
            self.enqueue_retransmission(block.clone());
        }
        Ok(outcome)
    }

    pub fn enqueue_retransmission(&mut self, block: TransportBlock) {
        debug!(peer = self.peer, block = block.id(), process_id = ?block.harq.process_id, "加入重传队列");
        self.retransmissions.push_back(block);
    }

    pub fn next_retransmission(&mut self) -> Option<TransportBlock> {
        self.retransmissions.pop_front()
    }

    pub fn peek_next_retransmission(&self) -> Option<&TransportBlock> {
        self.retransmissions.front()
    }

    pub fn has_retransmissions(&self) -> bool {
        !self.retransmissions.is_empty()
    }

    /// 重传队列中各传输块所属的进程号（按队列顺序）。
    pub fn processes_with_retransmissions(&self) -> Vec<usize> {
        self.retransmissions
            .iter()
            .filter_map(|b| b.harq.process_id)
            .collect()
    }
}
