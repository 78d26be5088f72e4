//! Selective Repeat ARQ
//!
//! 每个数据帧单独确认。发送端记录已发送但未确认的帧（`sent`），
//! 收到窗口基 `LA` 之后的 ACK 时把更早的帧放进重传队列；
//! 只用一个重传定时器，每次发送都重新设置。
//!
//! 接收端按序交付，乱序帧按与 `NR` 的距离排序缓存。
//! `delay_delivery` 之后收到的帧只缓存并确认，直到 `deliver_delayed`。

use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use super::{Arq, ArqCommand, ArqError, ArqStats, Compound, FrameType, Reception, SeqSpace};
use crate::config::{ConfigError, ConfigSource};
use crate::probe::{SharedSink, null_sink};
use crate::sim::{SimTime, Simulator};
use crate::timer::{TimeoutRoute, Timeout, TimerKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectiveRepeatConfig {
    pub window_size: usize,
    pub sequence_number_size: usize,
    pub resend_timeout: SimTime,
}

impl SelectiveRepeatConfig {
    pub fn from_source<S: ConfigSource>(src: &S) -> Result<Self, ConfigError> {
        let window_size = src.get_count("windowSize")?;
        if window_size < 2 {
            return Err(ConfigError::invalid(
                "windowSize",
                format!("{window_size} must be at least 2"),
            ));
        }
        let sequence_number_size = src.get_count("sequenceNumberSize")?;
        if sequence_number_size < 2 * window_size {
            return Err(ConfigError::invalid(
                "sequenceNumberSize",
                format!("{sequence_number_size} must be at least twice windowSize ({window_size})"),
            ));
        }
        let resend_timeout = src.get_secs("resendTimeout")?;
        if resend_timeout == SimTime::ZERO {
            return Err(ConfigError::invalid("resendTimeout", "must be positive"));
        }
        Ok(Self {
            window_size,
            sequence_number_size,
            resend_timeout,
        })
    }
}

pub struct SelectiveRepeat {
    name: String,
    cfg: SelectiveRepeatConfig,
    seq: SeqSpace,
    ns: u64,
    nr: u64,
    /// 最老的未确认序号（发送窗口基）
    la: u64,
    active: Option<Compound>,
    send_now: bool,
    sent: VecDeque<Compound>,
    to_retransmit: VecDeque<Compound>,
    acks: VecDeque<Compound>,
    /// 按与 `nr` 的距离升序
    received: Vec<Compound>,
    /// 按与 `la` 的距离升序
    received_acks: Vec<u64>,
    timer: Timeout,
    retransmission_interval: SimTime,
    delaying: bool,
    route: TimeoutRoute,
    sink: SharedSink,
    stats: ArqStats,
}

impl SelectiveRepeat {
    pub fn new(name: impl Into<String>, cfg: SelectiveRepeatConfig, route: TimeoutRoute) -> Self {
        Self {
            name: name.into(),
            seq: SeqSpace::new(cfg.sequence_number_size as u64),
            retransmission_interval: cfg.resend_timeout,
            cfg,
            ns: 0,
            nr: 0,
            la: 0,
            active: None,
            send_now: false,
            sent: VecDeque::new(),
            to_retransmit: VecDeque::new(),
            acks: VecDeque::new(),
            received: Vec::new(),
            received_acks: Vec::new(),
            timer: Timeout::new(),
            delaying: false,
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

    pub fn nr(&self) -> u64 {
        self.nr
    }

    pub fn la(&self) -> u64 {
        self.la
    }

    pub fn outstanding(&self) -> usize {
        self.sent.len() + self.to_retransmit.len()
    }

    pub fn retransmission_interval(&self) -> SimTime {
        self.retransmission_interval
    }

    pub fn has_timeout_set(&self, sim: &Simulator) -> bool {
        self.timer.has_timeout_set(sim)
    }

    /// 之后收到的帧只缓存（并确认），不交付。
    pub fn delay_delivery(&mut self) {
        self.delaying = true;
    }

    /// 结束延迟，交付从 `NR` 开始连续的缓存帧。
    pub fn deliver_delayed(&mut self) -> Vec<Compound> {
        self.delaying = false;
        let delivered = self.drain_in_order();
        self.stats.delivered += delivered.len() as u64;
        delivered
    }

    fn drain_in_order(&mut self) -> Vec<Compound> {
        let mut out = Vec::new();
        while self.received.first().is_some_and(|c| c.arq.ns == self.nr) {
            out.push(self.received.remove(0));
            self.nr = self.seq.next(self.nr);
        }
        out
    }

    /// 按与 `nr` 的距离插入；已存在时返回 false。
    fn keep_sorted(&mut self, compound: Compound) -> bool {
        let d = self.seq.distance(self.nr, compound.arq.ns);
        let seq = self.seq;
        let nr = self.nr;
        match self
            .received
            .binary_search_by_key(&d, |c| seq.distance(nr, c.arq.ns))
        {
            Ok(_) => false,
            Err(pos) => {
                self.received.insert(pos, compound);
                true
            }
        }
    }

    fn keep_ack_sorted(&mut self, ns: u64) {
        let seq = self.seq;
        let la = self.la;
        let d = seq.distance(la, ns);
        if let Err(pos) = self
            .received_acks
            .binary_search_by_key(&d, |&a| seq.distance(la, a))
        {
            self.received_acks.insert(pos, ns);
        }
    }

    fn on_data(&mut self, sim: &mut Simulator, compound: Compound) -> Result<Reception, ArqError> {
        let ns = compound.arq.ns;
        if !self.seq.contains(ns) {
            return Err(ArqError::violation(
                &self.name,
                format!("I frame NS={ns} outside sequence space {}", self.seq.modulus()),
            ));
        }
        let in_window = ns == self.nr || self.seq.is_ahead(self.nr, ns);

        let reception = if ns == self.nr && !self.delaying {
            self.nr = self.seq.next(self.nr);
            let mut delivered = vec![compound];
            delivered.extend(self.drain_in_order());
            self.stats.delivered += delivered.len() as u64;
            trace!(link = %self.name, count = delivered.len(), nr = self.nr, "按序交付");
            Reception::Delivered(delivered)
        } else if in_window {
            if self.keep_sorted(compound) {
                self.stats.buffered += 1;
                debug!(link = %self.name, ns, nr = self.nr, "数据帧已缓存");
                Reception::Buffered
            } else {
                self.stats.duplicates += 1;
                Reception::Duplicate
            }
        } else {
            self.stats.duplicates += 1;
            debug!(link = %self.name, ns, nr = self.nr, "重复数据帧");
            Reception::Duplicate
        };

        // 旧帧也要确认（对端可能丢了 ACK）；延迟交付期间只确认窗口内的帧
        if !self.delaying || in_window {
            self.acks.push_back(Compound::control(ArqCommand {
                frame: FrameType::Ack,
                ns,
                nr: self.nr,
                ack_sent: Some(sim.now()),
                ..ArqCommand::default()
            }));
        }
        Ok(reception)
    }

    fn on_ack(&mut self, sim: &mut Simulator, compound: Compound) -> Result<Reception, ArqError> {
        let ns = compound.arq.ns;
        let now = sim.now();
        if let Some(t) = compound.arq.ack_sent {
            self.sink
                .record("arq.ack_delay", now.saturating_sub(t).as_secs_f64());
        }

        let removed = self.remove_acked(now, ns);

        let reception = if ns == self.la && self.la != self.ns {
            self.la = self.seq.next(self.la);
            while self.received_acks.first() == Some(&self.la) {
                self.received_acks.remove(0);
                self.la = self.seq.next(self.la);
            }
            Reception::Acked {
                released: usize::from(removed),
            }
        } else if self.seq.is_ahead(self.la, ns) {
            if self.seq.distance(self.la, ns) >= self.seq.distance(self.la, self.ns) {
                return Err(ArqError::violation(
                    &self.name,
                    format!("ACK NS={ns} was never sent (NS={})", self.ns),
                ));
            }
            self.keep_ack_sorted(ns);
            self.prepare_retransmission(now, false);
            Reception::Acked {
                released: usize::from(removed),
            }
        } else {
            trace!(link = %self.name, ns, la = self.la, "过期 ACK");
            self.stats.stale_acks += 1;
            Reception::StaleAck
        };

        if self.sent.is_empty() && self.timer.has_timeout_set(sim) {
            self.timer.cancel_timeout(sim)?;
        }
        Ok(reception)
    }

    fn remove_acked(&mut self, now: SimTime, ns: u64) -> bool {
        let found = match self.sent.iter().position(|c| c.arq.ns == ns) {
            Some(pos) => self.sent.remove(pos),
            None => self
                .to_retransmit
                .iter()
                .position(|c| c.arq.ns == ns)
                .and_then(|pos| self.to_retransmit.remove(pos)),
        };
        let Some(c) = found else {
            return false;
        };
        if let Some(first) = c.arq.first_sent {
            let rtt = now.saturating_sub(first);
            self.sink.record("arq.rtt", rtt.as_secs_f64());
            let doubled = SimTime::from_nanos(rtt.as_nanos().saturating_mul(2));
            self.retransmission_interval = self.retransmission_interval.min(doubled);
        }
        self.stats.successes += 1;
        self.sink.record("arq.success", c.arq.tx_count as f64);
        debug!(link = %self.name, ns, tx = c.arq.tx_count, "✅ 数据帧已确认");
        true
    }

    /// 把需要重传的帧从 `sent` 移到重传队列。
    ///
    /// 超时或没有提前到达的 ACK 时考虑全部帧；否则只考虑最后一个提前 ACK 之前的帧。
    /// 已经重传过的帧至少间隔 `retransmission_interval` 才再次重传。
    fn prepare_retransmission(&mut self, now: SimTime, all: bool) {
        let seq = self.seq;
        let la = self.la;
        let last_ack = if all { None } else { self.received_acks.last().copied() };
        let interval = self.retransmission_interval;

        let mut keep = VecDeque::with_capacity(self.sent.len());
        let mut moved = 0u64;
        for c in std::mem::take(&mut self.sent) {
            let before_ack = match last_ack {
                None => true,
                Some(a) => seq.distance(la, c.arq.ns) < seq.distance(la, a),
            };
            let due = match (c.arq.first_sent, c.arq.last_sent) {
                (Some(first), Some(last)) => {
                    last == first || last.saturating_add(interval) <= now
                }
                _ => true,
            };
            if before_ack && due {
                self.sink.record("arq.failure", c.arq.tx_count as f64);
                self.to_retransmit.push_back(c);
                moved += 1;
            } else {
                keep.push_back(c);
            }
        }
        self.sent = keep;
        if moved > 0 {
            self.stats.failures += moved;
            debug!(link = %self.name, count = moved, "准备重传");
        }
    }
}

impl Arq for SelectiveRepeat {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_capacity(&self) -> bool {
        self.active.is_none()
            && self.to_retransmit.is_empty()
            && self.seq.distance(self.la, self.ns) < self.cfg.window_size as u64
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
        self.ns = self.seq.next(self.ns);
        self.active = Some(compound);
        self.send_now = true;
        Ok(())
    }

    fn process_incoming(&mut self, sim: &mut Simulator, compound: Compound) -> Result<Reception, ArqError> {
        match compound.arq.frame {
            FrameType::I => self.on_data(sim, compound),
            FrameType::Ack => self.on_ack(sim, compound),
            FrameType::Rr => Err(ArqError::violation(&self.name, "unexpected RR frame")),
        }
    }

    fn has_ack(&self) -> bool {
        !self.acks.is_empty()
    }

    fn has_data(&self) -> bool {
        !self.to_retransmit.is_empty() || (self.send_now && self.active.is_some())
    }

    fn get_ack(&mut self, _sim: &mut Simulator) -> Option<Compound> {
        let ack = self.acks.pop_front()?;
        self.stats.acks_sent += 1;
        Some(ack)
    }

    fn get_data(&mut self, sim: &mut Simulator) -> Result<Compound, ArqError> {
        let now = sim.now();
        let mut next = match self.to_retransmit.pop_front() {
            Some(c) => {
                self.stats.retransmissions += 1;
                c
            }
            None => {
                let fresh = if self.send_now { self.active.take() } else { None };
                let Some(c) = fresh else {
                    return Err(ArqError::NothingToSend {
                        link: self.name.clone(),
                    });
                };
                self.send_now = false;
                c
            }
        };
        next.arq.tx_count += 1;
        next.arq.first_sent.get_or_insert(now);
        next.arq.last_sent = Some(now);
        let out = next.clone();
        self.sent.push_back(next);
        self.timer
            .set_new_timeout(sim, self.cfg.resend_timeout, (self.route)(0));
        self.stats.data_sent += 1;
        trace!(link = %self.name, ns = out.arq.ns, tx = out.arq.tx_count, "发送数据帧");
        Ok(out)
    }

    fn on_timeout(&mut self, sim: &mut Simulator, _key: TimerKey) -> Result<(), ArqError> {
        if self.sent.is_empty() {
            trace!(link = %self.name, "超时时没有未确认的帧");
            return Ok(());
        }
        warn!(link = %self.name, outstanding = self.sent.len(), "⏰ 重传超时");
        self.prepare_retransmission(sim.now(), true);
        Ok(())
    }

    fn is_idle(&self) -> bool {
        self.active.is_none() && self.sent.is_empty() && self.to_retransmit.is_empty()
    }

    fn stats(&self) -> &ArqStats {
        &self.stats
    }
}
