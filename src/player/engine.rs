use crate::core::{
    AudioFormat, DecodedVideoFrame, EncodedPacket, MediaInfo, PlaybackClock, PlaybackState,
    PlayerConfig, PlayerError, Result, SourceLocator, StreamKind,
};
use crate::player::demuxer::Demuxer;
use crate::player::demuxer_source::{AudioDecode, PacketSource, VideoDecode, VideoDecodeOutcome};
use crate::player::network_stream::{ReadRetry, StatsCollector, StreamStats};
use crate::player::packet_queue::AudioPacketQueue;
use crate::player::scheduler::AudioCommand;
use crossbeam_channel::Sender;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// 解封装/解码引擎
///
/// 独占媒体源和视频解码器；音频包的去向（包队列）和音频解码器的 flush
/// 通过 `attach_audio` 接入。关闭时先放解码器再放媒体源。
pub struct MediaEngine {
    source: Option<Box<dyn PacketSource>>,
    video_decoder: Option<Box<dyn VideoDecode>>,
    media_info: MediaInfo,
    clock: PlaybackClock,
    queue: Arc<AudioPacketQueue>,
    audio_commands: Option<Sender<AudioCommand>>,
    retry: ReadRetry,
    stats: StatsCollector,
}

impl MediaEngine {
    /// 通过 FFmpeg 打开媒体源
    pub fn open(
        locator: &SourceLocator,
        config: &PlayerConfig,
        clock: PlaybackClock,
        queue: Arc<AudioPacketQueue>,
    ) -> Result<Self> {
        let demuxer = Demuxer::open(locator, &config.network)?;
        Self::with_source(Box::new(demuxer), config, clock, queue)
    }

    /// 使用已打开的数据源
    pub fn with_source(
        source: Box<dyn PacketSource>,
        config: &PlayerConfig,
        clock: PlaybackClock,
        queue: Arc<AudioPacketQueue>,
    ) -> Result<Self> {
        let media_info = source.media_info().clone();
        let video_decoder = source.video_decoder(None)?;
        info!("🎬 引擎就绪: {}", source.description());

        Ok(Self {
            source: Some(source),
            video_decoder: Some(video_decoder),
            media_info,
            clock,
            queue,
            audio_commands: None,
            retry: ReadRetry::new(
                config.read_retry_limit,
                Duration::from_millis(config.read_retry_delay_ms),
            ),
            stats: StatsCollector::new(),
        })
    }

    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    /// 总时长（秒），直播为 0
    pub fn duration(&self) -> f64 {
        self.media_info.duration
    }

    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    pub fn stats(&self) -> StreamStats {
        self.stats.snapshot()
    }

    /// 创建音频解码器（交给音频调度器持有）
    pub fn audio_decoder(&self, target: AudioFormat) -> Result<Option<Box<dyn AudioDecode>>> {
        match &self.source {
            Some(source) => source.audio_decoder(target),
            None => Ok(None),
        }
    }

    /// 接入音频路径：seek 时通过该通道通知音频回调 flush
    pub fn attach_audio(&mut self, commands: Sender<AudioCommand>) {
        self.audio_commands = Some(commands);
    }

    pub fn detach_audio(&mut self) {
        self.audio_commands = None;
        self.queue.clear();
    }

    pub fn audio_attached(&self) -> bool {
        self.audio_commands.is_some()
    }

    pub fn set_output_size(&mut self, width: u32, height: u32) {
        if let Some(decoder) = self.video_decoder.as_mut() {
            decoder.set_output_size(width, height);
        }
    }

    /// 读取下一个包，瞬时错误有限次重试
    ///
    /// Ok(None) 表示流结束；重试用尽返回 ReadFailed。
    pub fn read_packet(&mut self) -> Result<Option<EncodedPacket>> {
        let source = match self.source.as_mut() {
            Some(source) => source,
            None => return Ok(None),
        };
        loop {
            match source.read_packet() {
                Ok(Some(packet)) => {
                    self.retry.reset();
                    self.stats
                        .record_packet(packet.kind == StreamKind::Video, packet.size());
                    return Ok(Some(packet));
                }
                Ok(None) => return Ok(None),
                Err(PlayerError::ReadFailed(reason)) => {
                    if self.retry.record_failure(&reason) {
                        self.stats.record_retry();
                        continue;
                    }
                    self.retry.reset();
                    return Err(PlayerError::ReadFailed(reason));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 把一个视频包送进解码器
    pub fn decode_video(&mut self, packet: &EncodedPacket) -> Result<VideoDecodeOutcome> {
        let decoder = self
            .video_decoder
            .as_mut()
            .ok_or_else(|| PlayerError::DecodeFailed("引擎已关闭".to_string()))?;
        let outcome = decoder.decode(packet);
        if outcome.is_err() {
            self.stats.record_skipped_video();
        }
        outcome
    }

    /// 流结束后取出解码器内缓存的帧
    pub fn drain_video(&mut self) -> Result<Option<DecodedVideoFrame>> {
        match self.video_decoder.as_mut() {
            Some(decoder) => decoder.drain(),
            None => Ok(None),
        }
    }

    /// Seek 到 `seconds` 之前最近的关键帧
    ///
    /// 失败时播放位置不变。成功后时钟进入 seeking，
    /// 包队列清空，音视频解码器状态丢弃。
    pub fn seek(&mut self, seconds: f64) -> Result<()> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| PlayerError::SeekFailed("引擎已关闭".to_string()))?;

        if !source.is_seekable() {
            return Err(PlayerError::SeekFailed("当前流不支持 seek".to_string()));
        }
        if !seconds.is_finite() || seconds < 0.0 || seconds > self.media_info.duration {
            return Err(PlayerError::SeekFailed(format!(
                "目标 {:.3}s 超出范围 [0, {:.3}]",
                seconds, self.media_info.duration
            )));
        }
        if self.clock.state() == PlaybackState::Stopped {
            return Err(PlayerError::SeekFailed("播放会话已结束".to_string()));
        }

        source.seek(seconds)?;

        // 屏障：标记 seeking → 通知音频回调 flush → 清空队列 → flush 视频解码器
        // Flush 必须先于清空发出，回调看到新的清空代数时命令已在通道里
        let epoch = self.clock.begin_seek();
        if let Some(commands) = &self.audio_commands {
            if commands.send(AudioCommand::Flush).is_err() {
                warn!("音频回调已退出，无法发送 flush");
            }
        }
        self.queue.clear();
        if let Some(decoder) = self.video_decoder.as_mut() {
            decoder.flush();
        }
        debug!("⏩ Seek {:.3}s 完成, epoch={:?}", seconds, epoch);
        Ok(())
    }

    /// 释放所有资源；可重复调用
    pub fn close(&mut self) {
        self.audio_commands = None;
        self.queue.clear();
        if self.video_decoder.take().is_some() {
            debug!("视频解码器已释放");
        }
        if let Some(source) = self.source.take() {
            info!("🛑 关闭媒体源: {}", source.description());
        }
    }
}

impl Drop for MediaEngine {
    fn drop(&mut self) {
        self.close();
    }
}
