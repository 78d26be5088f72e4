//! 固定 TTI 的 HARQ 链路
//!
//! 发送端（对端 0）每个 TTI 最多发一个传输块，重传优先于新数据。
//! 接收端（对端 1）收到后立即解码判决，反馈经过 `feedback_delay` 回到发送端。
//! 解码失败由解码器模拟，信道本身不丢包。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::LinkError;
use crate::harq::{
    DecoderRegistry, Feedback, FeedbackKind, FeedbackOutcome, Harq, HarqConfig, PeerId, TransportBlock,
};
use crate::probe::SharedSink;
use crate::sim::{Event, SimTime, Simulator, World};
use crate::timer::{PeriodicTimeout, TimeoutRoute, TimerKey};
use crate::viz::{VizEventKind, VizLogger};

pub const TX_PEER: PeerId = 0;
pub const RX_PEER: PeerId = 1;

#[derive(Debug, Clone)]
pub struct HarqLinkConfig {
    pub harq: HarqConfig,
    pub blocks: u64,
    pub payload_bytes: usize,
    pub tti: SimTime,
    pub latency: SimTime,
    pub feedback_delay: SimTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarqLinkSummary {
    pub blocks: u64,
    pub decoded: u64,
    pub dropped: u64,
    pub transmissions: u64,
    pub retransmissions: u64,
    pub acks: u64,
    pub nacks: u64,
    /// 同一传输块的所有传输都落在同一个进程上
    pub process_affinity: bool,
    pub ttis: u64,
    pub finished_secs: f64,
}

pub struct HarqLinkWorld {
    cfg: HarqLinkConfig,
    tx: Harq,
    rx: Harq,
    clock: PeriodicTimeout,
    ttis: u64,
    generated: u64,
    decoded: BTreeSet<u64>,
    dropped: u64,
    transmissions: u64,
    retransmissions: u64,
    acks: u64,
    nacks: u64,
    /// 接收端看到的每个传输块的进程号
    seen_process: BTreeMap<u64, usize>,
    affinity_violations: u64,
    finished: SimTime,
    error: Option<LinkError>,
    pub viz: Option<VizLogger>,
}

fn link_world(world: &mut dyn World) -> &mut HarqLinkWorld {
    world
        .as_any_mut()
        .downcast_mut::<HarqLinkWorld>()
        .expect("world must be HarqLinkWorld")
}

impl HarqLinkWorld {
    pub fn new(cfg: HarqLinkConfig, decoders: &DecoderRegistry, sink: SharedSink) -> Result<Self, LinkError> {
        let tx = Harq::new(TX_PEER, cfg.harq.clone(), decoders.clone())?.with_sink(sink.clone());
        let rx = Harq::new(RX_PEER, cfg.harq.clone(), decoders.clone())?.with_sink(sink);
        Ok(Self {
            cfg,
            tx,
            rx,
            clock: PeriodicTimeout::new(),
            ttis: 0,
            generated: 0,
            decoded: BTreeSet::new(),
            dropped: 0,
            transmissions: 0,
            retransmissions: 0,
            acks: 0,
            nacks: 0,
            seen_process: BTreeMap::new(),
            affinity_violations: 0,
            finished: SimTime::ZERO,
            error: None,
            viz: None,
        })
    }

    pub fn enable_viz(&mut self) {
        self.viz = Some(VizLogger::default());
    }

    /// 启动 TTI 时钟，第一个 TTI 在当前时刻。
    pub fn start(&mut self, sim: &mut Simulator) -> Result<(), LinkError> {
        let route: TimeoutRoute = Arc::new(|_: TimerKey| Box::new(TtiTick) as Box<dyn Event>);
        self.clock
            .start_periodic_timeout(sim, self.cfg.tti, SimTime::ZERO, 0, route)?;
        info!(blocks = self.cfg.blocks, tti = ?self.cfg.tti, "🚀 启动 HARQ 链路");
        Ok(())
    }

    pub fn sender(&self) -> &Harq {
        &self.tx
    }

    pub fn receiver(&self) -> &Harq {
        &self.rx
    }

    pub fn error(&self) -> Option<&LinkError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<LinkError> {
        self.error.take()
    }

    pub fn summary(&self) -> HarqLinkSummary {
        HarqLinkSummary {
            blocks: self.cfg.blocks,
            decoded: self.decoded.len() as u64,
            dropped: self.dropped,
            transmissions: self.transmissions,
            retransmissions: self.retransmissions,
            acks: self.acks,
            nacks: self.nacks,
            process_affinity: self.affinity_violations == 0,
            ttis: self.ttis,
            finished_secs: self.finished.as_secs_f64(),
        }
    }

    fn fail(&mut self, sim: &mut Simulator, err: LinkError) {
        error!(now = ?sim.now(), error = %err, "❌ HARQ 链路出错，停止仿真");
        if self.error.is_none() {
            self.error = Some(err);
        }
        sim.stop();
    }

    fn sender_idle(&self) -> bool {
        self.tx.entity(RX_PEER).is_none_or(|e| {
            !e.has_retransmissions() && e.senders().iter().all(|p| p.has_capacity())
        })
    }

    fn on_tti(&mut self, sim: &mut Simulator) {
        self.ttis += 1;
        if let Err(e) = self.transmit_one(sim) {
            self.fail(sim, e);
            return;
        }
        let result = if self.generated >= self.cfg.blocks && self.sender_idle() {
            self.finished = sim.now();
            info!(now = ?sim.now(), ttis = self.ttis, "✅ 所有传输块已处理完毕");
            self.clock.cancel_periodic_timeout(sim)
        } else {
            self.clock.rearm(sim)
        };
        if let Err(e) = result {
            self.fail(sim, e.into());
        }
    }

    /// 重传优先；否则有空闲进程且还有新数据时发新块。
    fn transmit_one(&mut self, sim: &mut Simulator) -> Result<(), LinkError> {
        let entity = self.tx.entity_mut(RX_PEER)?;
        let block = if let Some(block) = entity.next_retransmission() {
            self.retransmissions += 1;
            block
        } else if self.generated < self.cfg.blocks && entity.has_capacity() {
            let id = self.generated;
            let mut payload = id.to_be_bytes().to_vec();
            payload.resize(self.cfg.payload_bytes.max(payload.len()), 0);
            let block = entity.new_transmission(TransportBlock::new(id, TX_PEER, payload))?;
            self.generated += 1;
            block
        } else {
            return Ok(());
        };

        self.transmissions += 1;
        let h = block.harq;
        if let Some(viz) = self.viz.as_mut() {
            viz.record(
                sim.now(),
                VizEventKind::HarqTx {
                    from: TX_PEER,
                    to: RX_PEER,
                    block: block.id(),
                    process_id: h.process_id,
                    rv: h.rv,
                    ndi: h.ndi,
                    retry: h.retry_counter,
                },
            );
        }
        debug!(block = block.id(), process_id = ?h.process_id, rv = h.rv, retry = h.retry_counter, "📡 发送传输块");
        sim.schedule_delay(self.cfg.latency, BlockArrival { block });
        Ok(())
    }

    fn on_block(&mut self, sim: &mut Simulator, block: TransportBlock) {
        let id = block.id();
        if let Some(pid) = block.harq.process_id {
            let first = *self.seen_process.entry(id).or_insert(pid);
            if first != pid {
                warn!(block = id, first, now = pid, "传输块换了进程");
                self.affinity_violations += 1;
            }
        }
        let reception = match self.rx.can_decode(block) {
            Ok(r) => r,
            Err(e) => {
                self.fail(sim, e.into());
                return;
            }
        };
        if reception.decoded.is_some() {
            self.decoded.insert(id);
        }
        sim.schedule_delay(
            self.cfg.feedback_delay,
            FeedbackArrival {
                feedback: reception.feedback,
            },
        );
    }

    fn on_feedback(&mut self, sim: &mut Simulator, feedback: Feedback) {
        let ack = feedback.kind == FeedbackKind::Ack;
        if ack {
            self.acks += 1;
        } else {
            self.nacks += 1;
        }
        if let Some(viz) = self.viz.as_mut() {
            viz.record(
                sim.now(),
                VizEventKind::HarqFeedback {
                    from: feedback.from,
                    to: feedback.to,
                    block: feedback.block_id,
                    process_id: feedback.process_id,
                    ack,
                },
            );
        }
        match self.tx.on_feedback(feedback) {
            Ok(FeedbackOutcome::Dropped(block)) => {
                self.dropped += 1;
                if let Some(viz) = self.viz.as_mut() {
                    viz.record(
                        sim.now(),
                        VizEventKind::HarqDrop {
                            node: TX_PEER,
                            block: block.id(),
                        },
                    );
                }
            }
            Ok(_) => {}
            Err(e) => self.fail(sim, e.into()),
        }
    }
}

impl World for HarqLinkWorld {
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// TTI 边界
struct TtiTick;

impl Event for TtiTick {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        link_world(world).on_tti(sim);
    }
}

struct BlockArrival {
    block: TransportBlock,
}

impl Event for BlockArrival {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let BlockArrival { block } = *self;
        link_world(world).on_block(sim, block);
    }
}

struct FeedbackArrival {
    feedback: Feedback,
}

impl Event for FeedbackArrival {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let FeedbackArrival { feedback } = *self;
        link_world(world).on_feedback(sim, feedback);
    }
}
