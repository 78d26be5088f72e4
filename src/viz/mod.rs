//! 可视化事件记录（用于离线回放）
//!
//! 链路仿真把发送、丢失、交付、超时、HARQ 反馈等记录成结构化 JSON 事件，
//! 仿真结束后一次性写入文件。

mod types;

pub use types::{VizEndpoint, VizEvent, VizEventKind, VizFrame, VizLogger};
