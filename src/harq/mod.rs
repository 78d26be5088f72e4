//! Hybrid ARQ
//!
//! 每个对端一个 [`HarqEntity`]，内含固定数量的并行发送/接收进程。
//! 发送进程一次只持有一个传输块；NACK 后冗余版本推进，副本进入实体的重传队列。
//! 接收进程按冗余版本软合并，由 [`Decoder`] 决定能否解码，并返回给发送方的 [`Feedback`]。
//!
//! 进程号在传输块的整个重传生命周期内不变：重传必须落到持有对应软合并缓存的
//! 同一个接收进程上。

mod block;
mod decoder;
mod entity;
mod error;
mod receiver;
mod sender;
mod soft_combining;

pub use block::{HarqInfo, TransportBlock};
pub use decoder::{Decoder, DecoderCtor, DecoderRegistry, ThresholdDecoder, UniformRandomDecoder};
pub use entity::HarqEntity;
pub use error::HarqError;
pub use receiver::{Feedback, FeedbackKind, HarqReceiverProcess, HarqReception};
pub use sender::{HarqSenderProcess, NackOutcome, SenderState};
pub use soft_combining::SoftCombiningBuffer;

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::{ConfigError, ConfigSource, Params};
use crate::probe::{SharedSink, null_sink};

pub type PeerId = u32;

#[derive(Debug, Clone, PartialEq)]
pub struct HarqConfig {
    pub num_sender_processes: usize,
    pub num_receiver_processes: usize,
    pub num_rvs: usize,
    pub retransmission_limit: u32,
    pub decoder: String,
    pub decoder_params: Params,
}

impl HarqConfig {
    /// `decoder` 是一个对象：`{"name": "uniform_random", "initialPER": 0.1, ...}`。
    pub fn from_source<S: ConfigSource>(src: &S) -> Result<Self, ConfigError> {
        let num_sender_processes = src.get_count("numSenderProcesses")?;
        let num_receiver_processes = src.get_count("numReceiverProcesses")?;
        let num_rvs = src.get_count("numRVs")?;
        let retransmission_limit: u32 = src.get("retransmissionLimit")?;
        let decoder_params = Params::from_value(src.get::<Value>("decoder")?).map_err(|_| {
            ConfigError::Malformed {
                key: "decoder".to_string(),
                reason: "expected an object".to_string(),
            }
        })?;
        let decoder: String = decoder_params.get("name")?;
        let cfg = Self {
            num_sender_processes,
            num_receiver_processes,
            num_rvs,
            retransmission_limit,
            decoder,
            decoder_params,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// 进程数与冗余版本数必须为正。
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, n) in [
            ("numSenderProcesses", self.num_sender_processes),
            ("numReceiverProcesses", self.num_receiver_processes),
            ("numRVs", self.num_rvs),
        ] {
            if n == 0 {
                return Err(ConfigError::invalid(key, "0 must be positive"));
            }
        }
        Ok(())
    }
}

/// 对端到 [`HarqEntity`] 的表，首次接触某个对端时创建实体。
pub struct Harq {
    local: PeerId,
    cfg: HarqConfig,
    decoders: DecoderRegistry,
    entities: BTreeMap<PeerId, HarqEntity>,
    sink: SharedSink,
}

impl Harq {
    /// 配置、解码器名字或参数有误时立即失败。
    pub fn new(local: PeerId, cfg: HarqConfig, decoders: DecoderRegistry) -> Result<Self, HarqError> {
        cfg.validate()?;
        decoders.create(&cfg.decoder, &cfg.decoder_params)?;
        Ok(Self {
            local,
            cfg,
            decoders,
            entities: BTreeMap::new(),
            sink: null_sink(),
        })
    }

    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn local(&self) -> PeerId {
        self.local
    }

    pub fn config(&self) -> &HarqConfig {
        &self.cfg
    }

    pub fn entity(&self, peer: PeerId) -> Option<&HarqEntity> {
        self.entities.get(&peer)
    }

    pub fn entity_mut(&mut self, peer: PeerId) -> Result<&mut HarqEntity, HarqError> {
        if !self.entities.contains_key(&peer) {
            // 每个对端一条独立的随机流
            let mut params = self.cfg.decoder_params.clone();
            if let Ok(seed) = params.get::<u64>("seed") {
                params.set("seed", seed.wrapping_add(u64::from(peer)));
            }
            let decoder = self.decoders.create(&self.cfg.decoder, &params)?;
            info!(local = self.local, peer, "🆕 创建 HARQ 实体");
            self.entities
                .insert(peer, HarqEntity::new(self.local, peer, &self.cfg, decoder));
        }
        self.entities.get_mut(&peer).ok_or(HarqError::UnknownPeer(peer))
    }

    pub fn peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.entities.keys().copied()
    }

    pub fn remove_peer(&mut self, peer: PeerId) -> Option<HarqEntity> {
        let removed = self.entities.remove(&peer);
        if removed.is_some() {
            info!(local = self.local, peer, "移除 HARQ 实体");
        }
        removed
    }

    /// 尚未建立实体的对端视为有容量。
    pub fn has_capacity(&self, peer: PeerId) -> bool {
        self.entities.get(&peer).is_none_or(HarqEntity::has_capacity)
    }

    pub fn new_transmission(&mut self, peer: PeerId, block: TransportBlock) -> Result<TransportBlock, HarqError> {
        self.entity_mut(peer)?.new_transmission(block)
    }

    /// 收到的传输块按其发送方路由到对应实体。
    pub fn can_decode(&mut self, block: TransportBlock) -> Result<HarqReception, HarqError> {
        let peer = block.harq.source;
        self.entity_mut(peer)?.can_decode(block)
    }

    /// 处理接收端发回的反馈。
    pub fn on_feedback(&mut self, feedback: Feedback) -> Result<FeedbackOutcome, HarqError> {
        let entity = self
            .entities
            .get_mut(&feedback.from)
            .ok_or(HarqError::UnknownPeer(feedback.from))?;
        let process_id = feedback.process_id;
        let count = entity.senders().len();
        let in_flight = entity
            .senders()
            .get(process_id)
            .ok_or(HarqError::InvalidProcess {
                process_id: Some(process_id),
                count,
            })?
            .block()
            .ok_or(HarqError::ProcessIdle { process_id })?
            .id();
        if in_flight != feedback.block_id {
            return Err(HarqError::StaleFeedback {
                process_id,
                expected: in_flight,
                got: feedback.block_id,
            });
        }

        match feedback.kind {
            FeedbackKind::Ack => {
                let block = entity.on_ack(process_id)?;
                self.sink
                    .record("harq.retransmissions", f64::from(block.harq.retry_counter));
                debug!(peer = feedback.from, process_id, block = block.id(), "✅ HARQ ACK");
                Ok(FeedbackOutcome::Released(block))
            }
            FeedbackKind::Nack => match entity.on_nack(process_id)? {
                NackOutcome::Retransmit(_) => Ok(FeedbackOutcome::Retransmit { process_id }),
                NackOutcome::Dropped(block) => {
                    self.sink.record("harq.dropped", f64::from(block.harq.retry_counter));
                    Ok(FeedbackOutcome::Dropped(block))
                }
            },
        }
    }

    pub fn peers_with_retransmissions(&self) -> Vec<PeerId> {
        self.entities
            .iter()
            .filter(|(_, e)| e.has_retransmissions())
            .map(|(&p, _)| p)
            .collect()
    }
}

/// 发送端处理反馈的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackOutcome {
    /// ACK：传输块成功，进程空闲
    Released(TransportBlock),
    /// NACK：副本已进入对应实体的重传队列
    Retransmit { process_id: usize },
    /// NACK 且超过重传上限：传输块被丢弃
    Dropped(TransportBlock),
}
