//! 累计确认（RR）滑动窗口 ARQ
//!
//! 序号空间为 `W`（偶数且不小于 4），发送窗口为 `W/2`。
//! 发送端每个槽位有自己的重传定时器；接收端按序交付，
//! 窗口内乱序到达的帧先缓存，缺口补齐后一次性交付。
//! RR 携带 `NR`（下一个期望的序号），确认 `NR` 之前的所有帧。

use tracing::{debug, trace, warn};

use super::{Arq, ArqCommand, ArqError, ArqStats, Compound, FrameType, Reception, SeqSpace};
use crate::config::{ConfigError, ConfigSource};
use crate::probe::{SharedSink, null_sink};
use crate::sim::{SimTime, Simulator};
use crate::timer::{TimeoutRoute, Timeout, TimerKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CumulativeAckConfig {
    /// 序号空间大小 `W`
    pub window_size: usize,
    pub resend_timeout: SimTime,
}

impl CumulativeAckConfig {
    pub fn from_source<S: ConfigSource>(src: &S) -> Result<Self, ConfigError> {
        let window_size = src.get_count("windowSize")?;
        if window_size < 4 || window_size % 2 != 0 {
            return Err(ConfigError::invalid(
                "windowSize",
                format!("{window_size} must be even and at least 4"),
            ));
        }
        let resend_timeout = src.get_secs("resendTimeout")?;
        if resend_timeout == SimTime::ZERO {
            return Err(ConfigError::invalid("resendTimeout", "must be positive"));
        }
        Ok(Self {
            window_size,
            resend_timeout,
        })
    }
}

#[derive(Debug, Default)]
struct SendSlot {
    compound: Option<Compound>,
    send_now: bool,
    timer: Timeout,
}

pub struct CumulativeAck {
    name: String,
    cfg: CumulativeAckConfig,
    seq: SeqSpace,
    ns: u64,
    ns_ack: u64,
    nr: u64,
    send: Vec<SendSlot>,
    recv: Vec<Option<Compound>>,
    ack: Option<Compound>,
    route: TimeoutRoute,
    sink: SharedSink,
    stats: ArqStats,
}

impl CumulativeAck {
    pub fn new(name: impl Into<String>, cfg: CumulativeAckConfig, route: TimeoutRoute) -> Self {
        let w = cfg.window_size;
        Self {
            name: name.into(),
            cfg,
            seq: SeqSpace::new(w as u64),
            ns: 0,
            ns_ack: 0,
            nr: 0,
            send: (0..w).map(|_| SendSlot::default()).collect(),
            recv: vec![None; w],
            ack: None,
            route,
            sink: null_sink(),
            stats: ArqStats::default(),
        }
    }

    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn ns(&self) -> u64 {
        self.ns
    }

    pub fn ns_ack(&self) -> u64 {
        self.ns_ack
    }

    pub fn nr(&self) -> u64 {
        self.nr
    }

    /// 已发出但尚未确认的帧数。
    pub fn in_flight(&self) -> u64 {
        self.seq.distance(self.ns_ack, self.ns)
    }

    pub fn send_window(&self) -> u64 {
        self.seq.half()
    }

    pub fn has_timeout_set(&self, sim: &Simulator, slot: usize) -> bool {
        self.send.get(slot).is_some_and(|s| s.timer.has_timeout_set(sim))
    }

    fn next_ready_slot(&self) -> Option<usize> {
        self.seq
            .window(self.ns_ack, self.in_flight())
            .map(|n| n as usize)
            .find(|&i| self.send[i].send_now && self.send[i].compound.is_some())
    }

    fn prepare_rr(&mut self) {
        self.ack = Some(Compound::control(ArqCommand {
            frame: FrameType::Rr,
            ns: self.nr,
            nr: self.nr,
            ..ArqCommand::default()
        }));
    }

    fn on_data(&mut self, compound: Compound) -> Result<Reception, ArqError> {
        let ns = compound.arq.ns;
        if !self.seq.contains(ns) {
            return Err(ArqError::violation(
                &self.name,
                format!("I frame NS={ns} outside sequence space {}", self.seq.modulus()),
            ));
        }

        if ns == self.nr {
            let mut delivered = vec![compound];
            self.nr = self.seq.next(self.nr);
            for _ in 0..self.seq.modulus() {
                let Some(next) = self.recv[self.nr as usize].take() else {
                    break;
                };
                delivered.push(next);
                self.nr = self.seq.next(self.nr);
            }
            self.stats.delivered += delivered.len() as u64;
            self.prepare_rr();
            trace!(link = %self.name, count = delivered.len(), nr = self.nr, "按序交付");
            return Ok(Reception::Delivered(delivered));
        }

        if self.seq.is_ahead(self.nr, ns) {
            let slot = &mut self.recv[ns as usize];
            if slot.is_some() {
                self.stats.duplicates += 1;
                return Ok(Reception::Duplicate);
            }
            *slot = Some(compound);
            self.stats.buffered += 1;
            debug!(link = %self.name, ns, nr = self.nr, "乱序帧已缓存");
            return Ok(Reception::Buffered);
        }

        // 窗口之前的旧帧：对端可能没收到 RR
        self.stats.duplicates += 1;
        if self.ack.is_none() {
            self.prepare_rr();
        }
        debug!(link = %self.name, ns, nr = self.nr, "重复数据帧");
        Ok(Reception::Duplicate)
    }

    fn on_rr(&mut self, sim: &mut Simulator, compound: Compound) -> Result<Reception, ArqError> {
        let nr = compound.arq.nr;
        if !self.seq.contains(nr) {
            return Err(ArqError::violation(
                &self.name,
                format!("RR NR={nr} outside sequence space {}", self.seq.modulus()),
            ));
        }
        let w = self.seq.modulus();
        if self.ns_ack == self.ns || (nr + 2 * w - self.ns_ack - 1) % w >= self.seq.half() {
            trace!(link = %self.name, nr, ns_ack = self.ns_ack, "过期 RR");
            self.stats.stale_acks += 1;
            return Ok(Reception::StaleAck);
        }

        let acked = self.seq.distance(self.ns_ack, nr);
        if acked > self.in_flight() {
            return Err(ArqError::violation(
                &self.name,
                format!("RR NR={nr} acknowledges beyond NS={}", self.ns),
            ));
        }

        for n in self.seq.window(self.ns_ack, acked) {
            let slot = &mut self.send[n as usize];
            if slot.timer.has_timeout_set(sim) {
                slot.timer.cancel_timeout(sim)?;
            }
            slot.send_now = false;
            if let Some(c) = slot.compound.take() {
                self.stats.successes += 1;
                self.sink.record("arq.success", c.arq.tx_count as f64);
            }
        }
        self.ns_ack = nr;
        debug!(link = %self.name, released = acked, ns_ack = self.ns_ack, "✅ 累计确认");
        Ok(Reception::Acked {
            released: acked as usize,
        })
    }
}

impl Arq for CumulativeAck {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_capacity(&self) -> bool {
        self.in_flight() < self.send_window()
    }

    fn process_outgoing(&mut self, _sim: &mut Simulator, mut compound: Compound) -> Result<(), ArqError> {
        if !self.has_capacity() {
            return Err(ArqError::CapacityExceeded {
                link: self.name.clone(),
            });
        }
        compound.arq = ArqCommand {
            frame: FrameType::I,
            ns: self.ns,
            ..ArqCommand::default()
        };
        let slot = &mut self.send[self.ns as usize];
        slot.compound = Some(compound);
        slot.send_now = true;
        self.ns = self.seq.next(self.ns);
        Ok(())
    }

    fn process_incoming(&mut self, sim: &mut Simulator, compound: Compound) -> Result<Reception, ArqError> {
        match compound.arq.frame {
            FrameType::I => self.on_data(compound),
            FrameType::Rr => self.on_rr(sim, compound),
            FrameType::Ack => Err(ArqError::violation(&self.name, "unexpected ACK frame")),
        }
    }

    fn has_ack(&self) -> bool {
        self.ack.is_some()
    }

    fn has_data(&self) -> bool {
        self.next_ready_slot().is_some()
    }

    fn get_ack(&mut self, sim: &mut Simulator) -> Option<Compound> {
        let mut ack = self.ack.take()?;
        ack.arq.ack_sent = Some(sim.now());
        self.stats.acks_sent += 1;
        Some(ack)
    }

    fn get_data(&mut self, sim: &mut Simulator) -> Result<Compound, ArqError> {
        let Some(i) = self.next_ready_slot() else {
            return Err(ArqError::NothingToSend {
                link: self.name.clone(),
            });
        };
        let now = sim.now();
        let slot = &mut self.send[i];
        let Some(compound) = slot.compound.as_mut() else {
            return Err(ArqError::NothingToSend {
                link: self.name.clone(),
            });
        };
        compound.arq.tx_count += 1;
        compound.arq.first_sent.get_or_insert(now);
        compound.arq.last_sent = Some(now);
        let out = compound.clone();
        slot.send_now = false;
        slot.timer
            .set_timeout(sim, self.cfg.resend_timeout, (self.route)(i))?;
        self.stats.data_sent += 1;
        if out.arq.tx_count > 1 {
            self.stats.retransmissions += 1;
        }
        trace!(link = %self.name, ns = out.arq.ns, tx = out.arq.tx_count, "发送数据帧");
        Ok(out)
    }

    fn on_timeout(&mut self, _sim: &mut Simulator, key: TimerKey) -> Result<(), ArqError> {
        let Some(slot) = self.send.get_mut(key).filter(|s| s.compound.is_some()) else {
            return Err(ArqError::UnexpectedTimeout {
                link: self.name.clone(),
                slot: key,
            });
        };
        slot.send_now = true;
        let tx = slot.compound.as_ref().map_or(0, |c| c.arq.tx_count);
        warn!(link = %self.name, slot = key, tx, "⏰ 重传超时");
        self.stats.failures += 1;
        self.sink.record("arq.failure", tx as f64);
        Ok(())
    }

    fn is_idle(&self) -> bool {
        self.ns == self.ns_ack
    }

    fn stats(&self) -> &ArqStats {
        &self.stats
    }
}
