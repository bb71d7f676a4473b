use crate::core::{PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 网络流选项（传给 FFmpeg 的字典）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkOptions {
    /// socket 超时（微秒）
    pub timeout_us: u64,
    /// 流探测时长（微秒）
    pub analyze_duration_us: u64,
    /// 探测大小（字节）
    pub probe_size: u64,
    /// 最大解复用延迟（微秒）
    pub max_delay_us: u64,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            timeout_us: 15_000_000,
            analyze_duration_us: 5_000_000,
            probe_size: 10_000_000,
            max_delay_us: 500_000,
        }
    }
}

/// 播放器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// 音频包队列字节预算
    pub audio_queue_bytes: usize,
    /// 读包瞬时错误的重试次数
    pub read_retry_limit: u32,
    /// 重试间隔（毫秒）
    pub read_retry_delay_ms: u64,
    /// 输出缓冲环的槽数
    pub output_buffer_count: usize,
    /// 每个槽的容量（采样帧）
    pub output_buffer_frames: usize,
    /// 欠载 / seek 时提交的静音缓冲长度（采样帧）
    pub silence_frames: usize,
    /// seek 后早于锚点超过该值的音频包被丢弃（秒）
    pub stale_audio_tolerance_secs: f64,
    /// 强制输出采样率，None 时跟随源
    pub output_sample_rate: Option<u32>,
    /// 强制输出声道数，None 时跟随源
    pub output_channels: Option<u16>,
    pub network: NetworkOptions,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            audio_queue_bytes: 512 * 1024,
            read_retry_limit: 3,
            read_retry_delay_ms: 20,
            output_buffer_count: 3,
            output_buffer_frames: 4096,
            silence_frames: 512,
            stale_audio_tolerance_secs: 0.5,
            output_sample_rate: None,
            output_channels: None,
            network: NetworkOptions::default(),
        }
    }
}

impl PlayerConfig {
    /// 从 JSON 文件加载（缺省字段用默认值）
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: PlayerConfig = serde_json::from_str(text)
            .map_err(|e| PlayerError::ConfigError(format!("无法解析配置: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio_queue_bytes == 0 {
            return Err(PlayerError::ConfigError("audio_queue_bytes 不能为 0".to_string()));
        }
        if self.output_buffer_count < 2 {
            return Err(PlayerError::ConfigError(format!(
                "output_buffer_count 至少为 2（当前 {}）",
                self.output_buffer_count
            )));
        }
        if self.output_buffer_frames == 0 || self.silence_frames == 0 {
            return Err(PlayerError::ConfigError("输出缓冲长度不能为 0".to_string()));
        }
        if self.stale_audio_tolerance_secs < 0.0 {
            return Err(PlayerError::ConfigError(
                "stale_audio_tolerance_secs 不能为负".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PlayerConfig::from_json(r#"{ "audio_queue_bytes": 1024, "network": { "timeout_us": 1 } }"#)
            .unwrap();
        assert_eq!(config.audio_queue_bytes, 1024);
        assert_eq!(config.output_buffer_count, 3);
        assert_eq!(config.network.timeout_us, 1);
        assert_eq!(config.network.probe_size, NetworkOptions::default().probe_size);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            PlayerConfig::from_json(r#"{ "output_buffer_count": 1 }"#),
            Err(PlayerError::ConfigError(_))
        ));
        assert!(matches!(
            PlayerConfig::from_json("not json"),
            Err(PlayerError::ConfigError(_))
        ));
        assert!(PlayerConfig::default().validate().is_ok());
    }
}
