//! Stop-and-Wait ARQ
//!
//! 窗口为 1，序号只用一位（交替位）。同一时刻最多一个未确认的数据帧；
//! 每收到一个数据帧都回一个携带 `NR` 的 RR。

use tracing::{debug, trace, warn};

use super::{Arq, ArqCommand, ArqError, ArqStats, Compound, FrameType, Reception, SeqSpace};
use crate::config::{ConfigError, ConfigSource};
use crate::probe::{SharedSink, null_sink};
use crate::sim::{SimTime, Simulator};
use crate::timer::{TimeoutRoute, Timeout, TimerKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopAndWaitConfig {
    pub resend_timeout: SimTime,
}

impl StopAndWaitConfig {
    pub fn from_source<S: ConfigSource>(src: &S) -> Result<Self, ConfigError> {
        let resend_timeout = src.get_secs("resendTimeout")?;
        if resend_timeout == SimTime::ZERO {
            return Err(ConfigError::invalid("resendTimeout", "must be positive"));
        }
        Ok(Self { resend_timeout })
    }
}

pub struct StopAndWait {
    name: String,
    cfg: StopAndWaitConfig,
    seq: SeqSpace,
    ns: u64,
    nr: u64,
    active: Option<Compound>,
    ack: Option<Compound>,
    send_now: bool,
    timer: Timeout,
    route: TimeoutRoute,
    sink: SharedSink,
    stats: ArqStats,
}

impl StopAndWait {
    pub fn new(name: impl Into<String>, cfg: StopAndWaitConfig, route: TimeoutRoute) -> Self {
        Self {
            name: name.into(),
            cfg,
            seq: SeqSpace::new(2),
            ns: 0,
            nr: 0,
            active: None,
            ack: None,
            send_now: false,
            timer: Timeout::new(),
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

    pub fn has_timeout_set(&self, sim: &Simulator) -> bool {
        self.timer.has_timeout_set(sim)
    }

    fn on_data(&mut self, compound: Compound) -> Result<Reception, ArqError> {
        let ns = compound.arq.ns;
        let reception = if ns == self.nr {
            self.nr = self.seq.next(self.nr);
            self.stats.delivered += 1;
            Reception::Delivered(vec![compound])
        } else if ns == self.seq.prev(self.nr) {
            debug!(link = %self.name, ns, nr = self.nr, "重复数据帧");
            self.stats.duplicates += 1;
            Reception::Duplicate
        } else {
            return Err(ArqError::violation(
                &self.name,
                format!("I frame NS={ns} is neither NR={} nor NR-1", self.nr),
            ));
        };
        self.ack = Some(Compound::control(ArqCommand {
            frame: FrameType::Rr,
            ns: self.nr,
            nr: self.nr,
            ..ArqCommand::default()
        }));
        Ok(reception)
    }

    fn on_rr(&mut self, sim: &mut Simulator, compound: Compound) -> Result<Reception, ArqError> {
        let nr = compound.arq.nr;
        let previous = self.seq.prev(self.ns);
        if nr != self.ns && nr != previous {
            return Err(ArqError::violation(
                &self.name,
                format!("RR NR={nr} is neither NS={} nor NS-1", self.ns),
            ));
        }
        if nr != self.ns || self.active.is_none() {
            trace!(link = %self.name, nr, "过期 RR");
            self.stats.stale_acks += 1;
            return Ok(Reception::StaleAck);
        }
        let Some(active) = self.active.take() else {
            return Ok(Reception::StaleAck);
        };
        if self.timer.has_timeout_set(sim) {
            self.timer.cancel_timeout(sim)?;
        }
        self.send_now = false;
        self.stats.successes += 1;
        self.sink.record("arq.success", active.arq.tx_count as f64);
        debug!(link = %self.name, ns = active.arq.ns, tx = active.arq.tx_count, "✅ 数据帧已确认");
        Ok(Reception::Acked { released: 1 })
    }
}

impl Arq for StopAndWait {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_capacity(&self) -> bool {
        self.active.is_none()
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
            FrameType::I => self.on_data(compound),
            FrameType::Rr => self.on_rr(sim, compound),
            FrameType::Ack => Err(ArqError::violation(&self.name, "unexpected ACK frame")),
        }
    }

    fn has_ack(&self) -> bool {
        self.ack.is_some()
    }

    fn has_data(&self) -> bool {
        self.send_now && self.active.is_some()
    }

    fn get_ack(&mut self, sim: &mut Simulator) -> Option<Compound> {
        let mut ack = self.ack.take()?;
        ack.arq.ack_sent = Some(sim.now());
        self.stats.acks_sent += 1;
        Some(ack)
    }

    fn get_data(&mut self, sim: &mut Simulator) -> Result<Compound, ArqError> {
        let now = sim.now();
        let Some(active) = self.active.as_mut().filter(|_| self.send_now) else {
            return Err(ArqError::NothingToSend {
                link: self.name.clone(),
            });
        };
        active.arq.tx_count += 1;
        active.arq.first_sent.get_or_insert(now);
        active.arq.last_sent = Some(now);
        let out = active.clone();
        self.send_now = false;
        self.timer
            .set_timeout(sim, self.cfg.resend_timeout, (self.route)(0))?;
        self.stats.data_sent += 1;
        if out.arq.tx_count > 1 {
            self.stats.retransmissions += 1;
        }
        trace!(link = %self.name, ns = out.arq.ns, tx = out.arq.tx_count, "发送数据帧");
        Ok(out)
    }

    fn on_timeout(&mut self, _sim: &mut Simulator, key: TimerKey) -> Result<(), ArqError> {
        let Some(active) = self.active.as_ref() else {
            return Err(ArqError::UnexpectedTimeout {
                link: self.name.clone(),
                slot: key,
            });
        };
        warn!(link = %self.name, ns = active.arq.ns, tx = active.arq.tx_count, "⏰ 重传超时");
        self.stats.failures += 1;
        self.sink.record("arq.failure", active.arq.tx_count as f64);
        self.send_now = true;
        Ok(())
    }

    fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    fn stats(&self) -> &ArqStats {
        &self.stats
    }
}
