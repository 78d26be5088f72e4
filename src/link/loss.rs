//! 信道丢包模型

use std::fmt;
use std::str::FromStr;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LossModel {
    #[default]
    None,
    /// 每第 `n` 个帧丢一个
    EveryNth { n: u64 },
    /// 以概率 `p` 独立丢包
    Random { p: f64, seed: u64 },
}

impl FromStr for LossModel {
    type Err = String;

    /// `none`、`every:N`、`random:P[:SEED]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let kind = parts.next().unwrap_or_default();
        let model = match kind {
            "none" => LossModel::None,
            "every" => {
                let n = parts
                    .next()
                    .ok_or("every:N needs N")?
                    .parse::<u64>()
                    .map_err(|e| format!("bad N: {e}"))?;
                if n == 0 {
                    return Err("every:N needs N > 0".to_string());
                }
                LossModel::EveryNth { n }
            }
            "random" => {
                let p = parts
                    .next()
                    .ok_or("random:P needs P")?
                    .parse::<f64>()
                    .map_err(|e| format!("bad P: {e}"))?;
                if !(0.0..1.0).contains(&p) {
                    return Err(format!("loss probability {p} must be in [0, 1)"));
                }
                let seed = match parts.next() {
                    Some(s) => s.parse::<u64>().map_err(|e| format!("bad seed: {e}"))?,
                    None => 0,
                };
                LossModel::Random { p, seed }
            }
            other => return Err(format!("unknown loss model `{other}`")),
        };
        if parts.next().is_some() {
            return Err(format!("trailing fields in loss model `{s}`"));
        }
        Ok(model)
    }
}

impl fmt::Display for LossModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossModel::None => write!(f, "none"),
            LossModel::EveryNth { n } => write!(f, "every:{n}"),
            LossModel::Random { p, seed } => write!(f, "random:{p}:{seed}"),
        }
    }
}

/// 一个方向上的信道状态。
#[derive(Debug, Clone)]
pub struct LossChannel {
    model: LossModel,
    seen: u64,
    rng: ChaCha8Rng,
}

impl LossChannel {
    pub fn new(model: LossModel) -> Self {
        let seed = match model {
            LossModel::Random { seed, .. } => seed,
            _ => 0,
        };
        Self {
            model,
            seen: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn model(&self) -> LossModel {
        self.model
    }

    /// 下一个帧是否被丢弃。
    pub fn should_drop(&mut self) -> bool {
        self.seen += 1;
        match self.model {
            LossModel::None => false,
            LossModel::EveryNth { n } => n > 0 && self.seen % n == 0,
            LossModel::Random { p, .. } => self.rng.gen_range(0.0..1.0) < p,
        }
    }
}
