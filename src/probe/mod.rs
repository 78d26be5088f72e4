//! 测量接口
//!
//! 协议引擎通过 [`MeasurementSink`] 报告标量观测值（重传次数、RTT 等）。
//! 调用是“发出即忘”：引擎既不等待也不检查返回值。

use std::sync::{Arc, Mutex};

use tracing::debug;

pub trait MeasurementSink: Send + Sync {
    fn record(&self, metric: &str, value: f64);
}

pub type SharedSink = Arc<dyn MeasurementSink>;

/// 丢弃所有观测值。
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MeasurementSink for NullSink {
    fn record(&self, _metric: &str, _value: f64) {}
}

pub fn null_sink() -> SharedSink {
    Arc::new(NullSink)
}

/// 把观测值转成 tracing 事件。
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MeasurementSink for TracingSink {
    fn record(&self, metric: &str, value: f64) {
        debug!(metric, value, "📈 测量");
    }
}

/// 内存中记录所有观测值（测试与二进制汇总用）。
#[derive(Debug, Default)]
pub struct RecordingSink {
    samples: Mutex<Vec<(String, f64)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn samples(&self) -> Vec<(String, f64)> {
        self.samples.lock().expect("samples lock").clone()
    }

    pub fn values(&self, metric: &str) -> Vec<f64> {
        self.samples
            .lock()
            .expect("samples lock")
            .iter()
            .filter(|(m, _)| m == metric)
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn count(&self, metric: &str) -> usize {
        self.values(metric).len()
    }

    pub fn mean(&self, metric: &str) -> Option<f64> {
        let v = self.values(metric);
        if v.is_empty() {
            return None;
        }
        Some(v.iter().sum::<f64>() / v.len() as f64)
    }
}

impl MeasurementSink for RecordingSink {
    fn record(&self, metric: &str, value: f64) {
        self.samples
            .lock()
            .expect("samples lock")
            .push((metric.to_string(), value));
    }
}
