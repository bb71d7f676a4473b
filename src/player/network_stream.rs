use log::warn;
use std::time::{Duration, Instant};

/// 读包重试配置
#[derive(Debug, Clone)]
pub struct ReadRetry {
    /// 最大重试次数
    pub max_attempts: u32,
    /// 当前连续失败次数
    pub current_attempt: u32,
    /// 重试间隔
    pub retry_interval: Duration,
}

impl ReadRetry {
    pub fn new(max_attempts: u32, retry_interval: Duration) -> Self {
        Self {
            max_attempts,
            current_attempt: 0,
            retry_interval,
        }
    }

    /// 记录一次失败；还能重试返回 true（并等待重试间隔）
    pub fn record_failure(&mut self, reason: &str) -> bool {
        if self.current_attempt >= self.max_attempts {
            return false;
        }
        self.current_attempt += 1;
        warn!(
            "🔄 读包失败，重试 ({}/{}): {}",
            self.current_attempt, self.max_attempts, reason
        );
        if !self.retry_interval.is_zero() {
            std::thread::sleep(self.retry_interval);
        }
        true
    }

    /// 读成功后重置计数
    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

impl Default for ReadRetry {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(20))
    }
}

/// 流统计信息
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    pub video_packets: u64,
    pub audio_packets: u64,
    /// 接收字节数
    pub bytes_received: u64,
    /// 读包重试次数（累计）
    pub read_retries: u64,
    /// 解码失败被跳过的视频包
    pub skipped_video_packets: u64,
    /// 连接持续时间
    pub connection_duration: Duration,
}

impl StreamStats {
    /// 平均带宽（字节/秒）
    pub fn bandwidth(&self) -> f64 {
        let secs = self.connection_duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes_received as f64 / secs
        } else {
            0.0
        }
    }
}

/// 统计收集器
#[derive(Debug)]
pub struct StatsCollector {
    stats: StreamStats,
    connection_start: Instant,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            stats: StreamStats::default(),
            connection_start: Instant::now(),
        }
    }

    pub fn record_packet(&mut self, is_video: bool, bytes: usize) {
        if is_video {
            self.stats.video_packets += 1;
        } else {
            self.stats.audio_packets += 1;
        }
        self.stats.bytes_received += bytes as u64;
    }

    pub fn record_retry(&mut self) {
        self.stats.read_retries += 1;
    }

    pub fn record_skipped_video(&mut self) {
        self.stats.skipped_video_packets += 1;
    }

    pub fn snapshot(&self) -> StreamStats {
        let mut stats = self.stats.clone();
        stats.connection_duration = self.connection_start.elapsed();
        stats
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_is_bounded() {
        let mut retry = ReadRetry::new(2, Duration::ZERO);
        assert!(retry.record_failure("io"));
        assert!(retry.record_failure("io"));
        assert!(!retry.record_failure("io"));
        retry.reset();
        assert!(retry.record_failure("io"));
    }

    #[test]
    fn test_stats_counts() {
        let mut collector = StatsCollector::new();
        collector.record_packet(true, 100);
        collector.record_packet(false, 20);
        collector.record_retry();
        let stats = collector.snapshot();
        assert_eq!(stats.video_packets, 1);
        assert_eq!(stats.audio_packets, 1);
        assert_eq!(stats.bytes_received, 120);
        assert_eq!(stats.read_retries, 1);
    }
}
