//! 配置源
//!
//! 核心只消费扁平的键值配置。[`Params`] 基于 `serde_json::Map`，
//! 可以从 JSON 文本/文件构造，也可以在代码里逐项设置。缺失或格式错误的键
//! 在构造引擎时立即报错。

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::sim::SimTime;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration key `{0}`")]
    Missing(String),
    #[error("malformed configuration key `{key}`: {reason}")]
    Malformed { key: String, reason: String },
    #[error("invalid configuration `{key}`: {reason}")]
    Invalid { key: String, reason: String },
    #[error("configuration must be a JSON object")]
    NotAnObject,
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// 提供类型化标量的配置源。
pub trait ConfigSource {
    fn raw(&self, key: &str) -> Option<&Value>;

    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError>
    where
        Self: Sized,
    {
        let v = self
            .raw(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))?;
        serde_json::from_value(v.clone()).map_err(|e| ConfigError::Malformed {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        Self: Sized,
    {
        match self.raw(key) {
            None => Ok(default),
            Some(_) => self.get(key),
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    /// 读取以秒为单位的浮点时长。
    fn get_secs(&self, key: &str) -> Result<SimTime, ConfigError>
    where
        Self: Sized,
    {
        let secs: f64 = self.get(key)?;
        SimTime::from_secs_f64(secs)
            .ok_or_else(|| ConfigError::invalid(key, format!("{secs} is not a non-negative duration")))
    }

    /// 读取正整数（进程数、窗口大小等）。
    fn get_count(&self, key: &str) -> Result<usize, ConfigError>
    where
        Self: Sized,
    {
        let n: i64 = self.get(key)?;
        if n <= 0 {
            return Err(ConfigError::invalid(key, format!("{n} must be positive")));
        }
        Ok(n as usize)
    }
}

/// 扁平键值配置。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Map<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Self::from_value(serde_json::from_str::<Value>(s)?)
    }

    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            _ => Err(ConfigError::NotAnObject),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// 逐项构造：`Params::new().with("windowSize", 8)`。
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// 用 `other` 中的键覆盖当前配置。
    pub fn merge(&mut self, other: &Params) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
    }

    /// 取子对象作为独立的配置（例如 `decoder` 段）。
    pub fn section(&self, key: &str) -> Result<Params, ConfigError> {
        match self.raw(key) {
            Some(Value::Object(values)) => Ok(Params {
                values: values.clone(),
            }),
            Some(_) => Err(ConfigError::Malformed {
                key: key.to_string(),
                reason: "expected an object".to_string(),
            }),
            None => Err(ConfigError::Missing(key.to_string())),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl ConfigSource for Params {
    fn raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}
