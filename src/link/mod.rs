//! 把协议引擎接到调度器上的薄适配层
//!
//! - [`ArqLinkWorld`]：两个 ARQ 端点 + 有损固定时延信道 + 周期流量源
//! - [`HarqLinkWorld`]：一对 HARQ 对端 + TTI 时钟 + 反馈时延

mod arq_link;
mod harq_link;
mod loss;

pub use arq_link::{ArqLinkConfig, ArqLinkSummary, ArqLinkWorld, EngineKind};
pub use harq_link::{HarqLinkConfig, HarqLinkSummary, HarqLinkWorld, RX_PEER, TX_PEER};
pub use loss::{LossChannel, LossModel};

use thiserror::Error;

use crate::arq::ArqError;
use crate::config::ConfigError;
use crate::harq::HarqError;
use crate::timer::TimerError;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    Arq(#[from] ArqError),
    #[error(transparent)]
    Harq(#[from] HarqError),
    #[error(transparent)]
    Timer(#[from] TimerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
