//! 解码判决
//!
//! 解码器只看软合并缓存中的传输次数，物理层细节不在此建模。
//! 具体实现通过 [`DecoderRegistry`] 按名字构造。

use std::collections::BTreeMap;
use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

use super::{HarqError, SoftCombiningBuffer, TransportBlock};
use crate::config::{ConfigError, ConfigSource, Params};

pub trait Decoder: Send {
    fn name(&self) -> &'static str;

    /// 缓存中的各次传输合并后能否成功解码。
    fn can_decode(&mut self, buffer: &SoftCombiningBuffer<TransportBlock>) -> bool;
}

impl fmt::Debug for dyn Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decoder({})", self.name())
    }
}

/// 误块率随合并次数指数下降：`PER = initialPER^(n·rolloffFactor)`。
#[derive(Debug, Clone)]
pub struct UniformRandomDecoder {
    initial_per: f64,
    rolloff_factor: f64,
    rng: ChaCha8Rng,
}

impl UniformRandomDecoder {
    pub const NAME: &'static str = "uniform_random";

    pub fn new(initial_per: f64, rolloff_factor: f64, seed: u64) -> Self {
        Self {
            initial_per,
            rolloff_factor,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_source<S: ConfigSource>(src: &S) -> Result<Self, ConfigError> {
        let initial_per: f64 = src.get("initialPER")?;
        if !(0.0..=1.0).contains(&initial_per) {
            return Err(ConfigError::invalid(
                "initialPER",
                format!("{initial_per} is not a probability"),
            ));
        }
        let rolloff_factor: f64 = src.get_or("rolloffFactor", 1.0)?;
        if !rolloff_factor.is_finite() || rolloff_factor <= 0.0 {
            return Err(ConfigError::invalid(
                "rolloffFactor",
                format!("{rolloff_factor} must be positive"),
            ));
        }
        let seed: u64 = src.get_or("seed", 0)?;
        Ok(Self::new(initial_per, rolloff_factor, seed))
    }

    pub fn per(&self, transmissions: usize) -> f64 {
        self.initial_per
            .powf(transmissions as f64 * self.rolloff_factor)
    }
}

impl Decoder for UniformRandomDecoder {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn can_decode(&mut self, buffer: &SoftCombiningBuffer<TransportBlock>) -> bool {
        let n = buffer.total_entries();
        if n == 0 {
            return false;
        }
        let per = self.per(n);
        let draw: f64 = self.rng.gen_range(0.0..1.0);
        trace!(n, per, draw, "解码判决");
        draw > per
    }
}

/// 合并满 `requiredTransmissions` 次即解码成功。
#[derive(Debug, Clone, Copy)]
pub struct ThresholdDecoder {
    required: usize,
}

impl ThresholdDecoder {
    pub const NAME: &'static str = "threshold";

    pub fn new(required: usize) -> Self {
        Self { required }
    }

    pub fn from_source<S: ConfigSource>(src: &S) -> Result<Self, ConfigError> {
        Ok(Self::new(src.get_count("requiredTransmissions")?))
    }
}

impl Decoder for ThresholdDecoder {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn can_decode(&mut self, buffer: &SoftCombiningBuffer<TransportBlock>) -> bool {
        buffer.total_entries() >= self.required
    }
}

pub type DecoderCtor = fn(&Params) -> Result<Box<dyn Decoder>, ConfigError>;

/// 解码器名字到构造函数的映射。
#[derive(Debug, Clone, Default)]
pub struct DecoderRegistry {
    ctors: BTreeMap<String, DecoderCtor>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册了内置解码器的表。
    pub fn with_builtin() -> Self {
        let mut r = Self::new();
        r.register(UniformRandomDecoder::NAME, |p| {
            Ok(Box::new(UniformRandomDecoder::from_source(p)?))
        });
        r.register(ThresholdDecoder::NAME, |p| {
            Ok(Box::new(ThresholdDecoder::from_source(p)?))
        });
        r
    }

    /// 注册（或替换）一个构造函数。
    pub fn register(&mut self, name: &str, ctor: DecoderCtor) {
        self.ctors.insert(name.to_string(), ctor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ctors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ctors.keys().map(String::as_str)
    }

    pub fn create(&self, name: &str, params: &Params) -> Result<Box<dyn Decoder>, HarqError> {
        let ctor = self
            .ctors
            .get(name)
            .ok_or_else(|| HarqError::UnknownDecoder(name.to_string()))?;
        Ok(ctor(params)?)
    }
}
