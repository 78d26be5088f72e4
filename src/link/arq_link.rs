//! 两个 ARQ 端点之间的有损、固定时延链路
//!
//! 端点 0 是发送方，由周期性的流量源喂数据；端点 1 只回确认。
//! 每次状态变化后对相应端点做一次 pump：先把积压的数据交给引擎，
//! 再把 `get_something_to_send` 取到的帧全部送进信道。

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::{LinkError, LossChannel, LossModel};
use crate::arq::{
    Arq, ArqStats, Compound, CumulativeAck, CumulativeAckConfig, Reception, SelectiveRepeat, SelectiveRepeatConfig,
    StopAndWait, StopAndWaitConfig,
};
use crate::config::{ConfigError, Params};
use crate::probe::SharedSink;
use crate::sim::{Event, SimTime, Simulator, World};
use crate::timer::{PeriodicTimeout, TimeoutRoute, TimerKey};
use crate::viz::{VizEndpoint, VizEventKind, VizFrame, VizLogger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    StopAndWait,
    CumulativeAck,
    SelectiveRepeat,
}

impl EngineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineKind::StopAndWait => "stop_and_wait",
            EngineKind::CumulativeAck => "cumulative_ack",
            EngineKind::SelectiveRepeat => "selective_repeat",
        }
    }

    /// 按配置构造引擎；`route` 负责把超时送回该端点。
    pub fn build(
        self,
        name: &str,
        params: &Params,
        route: TimeoutRoute,
        sink: SharedSink,
    ) -> Result<Box<dyn Arq>, ConfigError> {
        Ok(match self {
            EngineKind::StopAndWait => {
                let cfg = StopAndWaitConfig::from_source(params)?;
                Box::new(StopAndWait::new(name, cfg, route).with_sink(sink))
            }
            EngineKind::CumulativeAck => {
                let cfg = CumulativeAckConfig::from_source(params)?;
                Box::new(CumulativeAck::new(name, cfg, route).with_sink(sink))
            }
            EngineKind::SelectiveRepeat => {
                let cfg = SelectiveRepeatConfig::from_source(params)?;
                Box::new(SelectiveRepeat::new(name, cfg, route).with_sink(sink))
            }
        })
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop_and_wait" | "saw" => Ok(EngineKind::StopAndWait),
            "cumulative_ack" | "gbn" => Ok(EngineKind::CumulativeAck),
            "selective_repeat" | "sr" => Ok(EngineKind::SelectiveRepeat),
            other => Err(format!("unknown ARQ engine `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArqLinkConfig {
    pub engine: EngineKind,
    /// 引擎参数（`windowSize`、`resendTimeout` 等）
    pub params: Params,
    pub latency: SimTime,
    /// 流量源产生的数据帧个数
    pub packets: u64,
    pub payload_bytes: usize,
    /// 流量源的发包间隔
    pub interval: SimTime,
    pub forward_loss: LossModel,
    pub reverse_loss: LossModel,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArqLinkSummary {
    pub engine: EngineKind,
    pub packets: u64,
    pub delivered: u64,
    /// 交付顺序与发送顺序一致且无重复
    pub in_order: bool,
    pub lost_forward: u64,
    pub lost_reverse: u64,
    pub last_delivery_secs: Option<f64>,
    pub sender: ArqStats,
    pub receiver: ArqStats,
}

const SENDER: usize = 0;
const RECEIVER: usize = 1;

pub struct ArqLinkWorld {
    cfg: ArqLinkConfig,
    ends: [Box<dyn Arq>; 2],
    channels: [LossChannel; 2],
    lost: [u64; 2],
    source: PeriodicTimeout,
    generated: u64,
    backlog: VecDeque<Compound>,
    delivered: Vec<u64>,
    last_delivery: Option<SimTime>,
    error: Option<LinkError>,
    pub viz: Option<VizLogger>,
}

/// 第 `end` 个端点的超时路由。
fn timeout_route(end: usize) -> TimeoutRoute {
    Arc::new(move |key: TimerKey| Box::new(ArqTimeout { end, key }) as Box<dyn Event>)
}

fn link_world(world: &mut dyn World) -> &mut ArqLinkWorld {
    world
        .as_any_mut()
        .downcast_mut::<ArqLinkWorld>()
        .expect("world must be ArqLinkWorld")
}

impl ArqLinkWorld {
    pub fn new(cfg: ArqLinkConfig, sink: SharedSink) -> Result<Self, ConfigError> {
        let sender = cfg
            .engine
            .build("sender", &cfg.params, timeout_route(SENDER), sink.clone())?;
        let receiver = cfg
            .engine
            .build("receiver", &cfg.params, timeout_route(RECEIVER), sink)?;
        Ok(Self {
            channels: [LossChannel::new(cfg.forward_loss), LossChannel::new(cfg.reverse_loss)],
            cfg,
            ends: [sender, receiver],
            lost: [0; 2],
            source: PeriodicTimeout::new(),
            generated: 0,
            backlog: VecDeque::new(),
            delivered: Vec::new(),
            last_delivery: None,
            error: None,
            viz: None,
        })
    }

    pub fn enable_viz(&mut self) {
        let endpoints = self
            .ends
            .iter()
            .enumerate()
            .map(|(id, e)| VizEndpoint {
                id,
                name: e.name().to_string(),
                engine: self.cfg.engine.to_string(),
            })
            .collect();
        let mut viz = VizLogger::default();
        viz.record(
            SimTime::ZERO,
            VizEventKind::Meta {
                endpoints,
                latency_ns: self.cfg.latency.as_nanos(),
            },
        );
        self.viz = Some(viz);
    }

    /// 启动流量源（第一个数据帧在当前时刻产生）。
    pub fn start(&mut self, sim: &mut Simulator) -> Result<(), LinkError> {
        if self.cfg.packets == 0 {
            return Ok(());
        }
        let route: TimeoutRoute = Arc::new(|_: TimerKey| Box::new(SourceTick) as Box<dyn Event>);
        self.source
            .start_periodic_timeout(sim, self.cfg.interval, SimTime::ZERO, 0, route)?;
        info!(engine = %self.cfg.engine, packets = self.cfg.packets, "🚀 启动 ARQ 链路");
        Ok(())
    }

    pub fn sender(&self) -> &dyn Arq {
        self.ends[SENDER].as_ref()
    }

    pub fn receiver(&self) -> &dyn Arq {
        self.ends[RECEIVER].as_ref()
    }

    /// 按交付顺序排列的数据帧编号。
    pub fn delivered(&self) -> &[u64] {
        &self.delivered
    }

    pub fn error(&self) -> Option<&LinkError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<LinkError> {
        self.error.take()
    }

    pub fn is_complete(&self) -> bool {
        self.delivered.len() as u64 == self.cfg.packets && self.ends[SENDER].is_idle()
    }

    pub fn summary(&self) -> ArqLinkSummary {
        let in_order = self
            .delivered
            .iter()
            .enumerate()
            .all(|(i, &id)| id == i as u64);
        ArqLinkSummary {
            engine: self.cfg.engine,
            packets: self.cfg.packets,
            delivered: self.delivered.len() as u64,
            in_order,
            lost_forward: self.lost[SENDER],
            lost_reverse: self.lost[RECEIVER],
            last_delivery_secs: self.last_delivery.map(SimTime::as_secs_f64),
            sender: self.ends[SENDER].stats().clone(),
            receiver: self.ends[RECEIVER].stats().clone(),
        }
    }

    fn payload(&self, id: u64) -> Vec<u8> {
        let mut bytes = id.to_be_bytes().to_vec();
        bytes.resize(self.cfg.payload_bytes.max(bytes.len()), 0);
        bytes
    }

    fn fail(&mut self, sim: &mut Simulator, err: LinkError) {
        error!(now = ?sim.now(), error = %err, "❌ 链路出错，停止仿真");
        if self.error.is_none() {
            self.error = Some(err);
        }
        sim.stop();
    }

    fn on_source_tick(&mut self, sim: &mut Simulator) {
        let id = self.generated;
        self.generated += 1;
        self.backlog.push_back(Compound::new(self.payload(id)));
        let result = if self.generated < self.cfg.packets {
            self.source.rearm(sim)
        } else {
            self.source.cancel_periodic_timeout(sim)
        };
        if let Err(e) = result {
            self.fail(sim, e.into());
            return;
        }
        self.pump(sim, SENDER);
    }

    fn on_timeout(&mut self, sim: &mut Simulator, end: usize, key: TimerKey) {
        if let Some(viz) = self.viz.as_mut() {
            viz.record(sim.now(), VizEventKind::Timeout { node: end, key });
        }
        if let Err(e) = self.ends[end].on_timeout(sim, key) {
            self.fail(sim, e.into());
            return;
        }
        self.pump(sim, end);
    }

    fn on_arrival(&mut self, sim: &mut Simulator, to: usize, compound: Compound) {
        if let Some(viz) = self.viz.as_mut() {
            viz.record(
                sim.now(),
                VizEventKind::FrameRx {
                    node: to,
                    frame: VizFrame::from(&compound),
                },
            );
        }
        match self.ends[to].process_incoming(sim, compound) {
            Ok(Reception::Delivered(frames)) => {
                for c in frames {
                    let mut id = [0u8; 8];
                    id.copy_from_slice(&c.payload()[..8]);
                    let id = u64::from_be_bytes(id);
                    if let Some(viz) = self.viz.as_mut() {
                        viz.record(sim.now(), VizEventKind::Delivered { node: to, ns: c.arq.ns });
                    }
                    debug!(id, ns = c.arq.ns, "📦 交付");
                    self.delivered.push(id);
                }
                self.last_delivery = Some(sim.now());
            }
            Ok(_) => {}
            Err(e) => {
                self.fail(sim, e.into());
                return;
            }
        }
        self.pump(sim, to);
    }

    fn pump(&mut self, sim: &mut Simulator, end: usize) {
        loop {
            if end == SENDER
                && let Err(e) = self.refill(sim)
            {
                self.fail(sim, e);
                return;
            }
            match self.ends[end].get_something_to_send(sim) {
                Ok(Some(c)) => self.transmit(sim, end, c),
                Ok(None) => break,
                Err(e) => {
                    self.fail(sim, e.into());
                    return;
                }
            }
        }
    }

    fn refill(&mut self, sim: &mut Simulator) -> Result<(), LinkError> {
        while self.ends[SENDER].has_capacity() {
            let Some(c) = self.backlog.pop_front() else {
                break;
            };
            self.ends[SENDER].process_outgoing(sim, c)?;
        }
        Ok(())
    }

    fn transmit(&mut self, sim: &mut Simulator, from: usize, compound: Compound) {
        let to = 1 - from;
        let frame = VizFrame::from(&compound);
        if self.channels[from].should_drop() {
            self.lost[from] += 1;
            debug!(from, ns = frame.ns, nr = frame.nr, "🗑️ 信道丢帧");
            if let Some(viz) = self.viz.as_mut() {
                viz.record(sim.now(), VizEventKind::FrameLost { from, to, frame });
            }
            return;
        }
        if let Some(viz) = self.viz.as_mut() {
            viz.record(sim.now(), VizEventKind::FrameTx { from, to, frame });
        }
        sim.schedule_delay(self.cfg.latency, FrameArrival { to, compound });
    }
}

impl World for ArqLinkWorld {
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// 流量源产生下一个数据帧
struct SourceTick;

impl Event for SourceTick {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        link_world(world).on_source_tick(sim);
    }
}

/// 端点 `end` 的定时器 `key` 到期
struct ArqTimeout {
    end: usize,
    key: TimerKey,
}

impl Event for ArqTimeout {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let ArqTimeout { end, key } = *self;
        link_world(world).on_timeout(sim, end, key);
    }
}

/// 帧经过信道时延后到达端点 `to`
struct FrameArrival {
    to: usize,
    compound: Compound,
}

impl Event for FrameArrival {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let FrameArrival { to, compound } = *self;
        link_world(world).on_arrival(sim, to, compound);
    }
}
