use crate::core::{
    AudioFormat, DecodedVideoFrame, EncodedPacket, MediaInfo, PlaybackClock, PlaybackState,
    PlayerConfig, Result, SourceLocator, StreamKind,
};
use crate::player::audio_output::AudioOutput;
use crate::player::demuxer_source::{PacketSource, VideoDecodeOutcome};
use crate::player::engine::MediaEngine;
use crate::player::frame_sink::FrameSink;
use crate::player::network_stream::StreamStats;
use crate::player::packet_queue::AudioPacketQueue;
use crate::player::scheduler::{AudioScheduler, AudioStats};
use crossbeam_channel::unbounded;
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;

/// 播放统计（解封装侧 + 音频回调侧）
#[derive(Debug, Clone, Default)]
pub struct PlaybackStats {
    pub stream: StreamStats,
    pub audio_underruns: u64,
    pub skipped_audio_packets: u64,
    pub stale_audio_packets: u64,
    pub buffers_played: u64,
}

/// 播放器 - 协调解码引擎与音频调度器
///
/// `step_frame` 在调用方线程（通常每次刷新一次）上驱动解封装和视频解码，
/// 音频包经由包队列交给硬件回调线程。`current_time` 始终是音频主时钟。
pub struct Player {
    config: PlayerConfig,
    clock: PlaybackClock,
    engine: MediaEngine,
    queue: Arc<AudioPacketQueue>,
    audio_output: Option<AudioOutput>,
    audio_stats: Arc<AudioStats>,
    audio_clock: bool, // 时钟是否由音频驱动
    holdback: VecDeque<EncodedPacket>, // 队列满时暂存的音频包
    holdback_bytes: usize,
    backpressured: bool,
    current_image: Option<DecodedVideoFrame>,
    frame_sink: Option<Box<dyn FrameSink>>,
    end_of_stream: bool,
    stopped: bool, // 调用过 stop()
}

impl Player {
    /// 打开媒体源（文件或网络流）
    pub fn open(locator: &SourceLocator, config: PlayerConfig) -> Result<Self> {
        config.validate()?;
        let clock = PlaybackClock::new();
        let queue = Arc::new(AudioPacketQueue::new(config.audio_queue_bytes));
        let engine = MediaEngine::open(locator, &config, clock.clone(), queue.clone())?;
        Ok(Self::assemble(config, clock, queue, engine))
    }

    /// 使用自定义数据源
    pub fn with_source(source: Box<dyn PacketSource>, config: PlayerConfig) -> Result<Self> {
        config.validate()?;
        let clock = PlaybackClock::new();
        let queue = Arc::new(AudioPacketQueue::new(config.audio_queue_bytes));
        let engine = MediaEngine::with_source(source, &config, clock.clone(), queue.clone())?;
        Ok(Self::assemble(config, clock, queue, engine))
    }

    fn assemble(
        config: PlayerConfig,
        clock: PlaybackClock,
        queue: Arc<AudioPacketQueue>,
        engine: MediaEngine,
    ) -> Self {
        Self {
            config,
            clock,
            engine,
            queue,
            audio_output: None,
            audio_stats: Arc::new(AudioStats::default()),
            audio_clock: false,
            holdback: VecDeque::new(),
            holdback_bytes: 0,
            backpressured: false,
            current_image: None,
            frame_sink: None,
            end_of_stream: false,
            stopped: false,
        }
    }

    pub fn media_info(&self) -> &MediaInfo {
        self.engine.media_info()
    }

    /// 总时长（秒），直播为 0
    pub fn duration(&self) -> f64 {
        self.engine.duration()
    }

    /// 当前播放时间（秒），由音频缓冲完成推进
    pub fn current_time(&self) -> f64 {
        self.clock.now()
    }

    pub fn state(&self) -> PlaybackState {
        self.clock.state()
    }

    /// 最近一次解码出的画面
    pub fn current_image(&self) -> Option<&DecodedVideoFrame> {
        self.current_image.as_ref()
    }

    pub fn source_width(&self) -> u32 {
        self.media_info().video_size().0
    }

    pub fn source_height(&self) -> u32 {
        self.media_info().video_size().1
    }

    /// 设置输出画面尺寸，0 表示源尺寸
    pub fn set_output_size(&mut self, width: u32, height: u32) {
        let width = if width == 0 { self.source_width() } else { width };
        let height = if height == 0 { self.source_height() } else { height };
        self.engine.set_output_size(width, height);
    }

    pub fn set_frame_sink(&mut self, sink: Box<dyn FrameSink>) {
        self.frame_sink = Some(sink);
    }

    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            stream: self.engine.stats(),
            audio_underruns: self.audio_stats.underruns(),
            skipped_audio_packets: self.audio_stats.skipped_packets(),
            stale_audio_packets: self.audio_stats.stale_packets(),
            buffers_played: self.audio_stats.buffers_played(),
        }
    }

    /// 希望的音频输出格式：配置优先，否则跟随源
    pub fn preferred_audio_format(&self) -> Option<AudioFormat> {
        let source = self.media_info().audio_format()?;
        Some(AudioFormat {
            sample_rate: self.config.output_sample_rate.unwrap_or(source.sample_rate),
            channels: self.config.output_channels.unwrap_or(source.channels),
        })
    }

    /// 为给定输出格式创建音频调度器，并把音频路径接入引擎
    ///
    /// 没有音频流时返回 None。调度器交给硬件回调（cpal 或其他音频后端）持有。
    pub fn build_audio_scheduler(&mut self, format: AudioFormat) -> Result<Option<AudioScheduler>> {
        let decoder = match self.engine.audio_decoder(format)? {
            Some(decoder) => decoder,
            None => return Ok(None),
        };
        let (tx, rx) = unbounded();
        self.engine.attach_audio(tx);
        self.audio_clock = true;
        Ok(Some(AudioScheduler::new(
            self.queue.clone(),
            decoder,
            self.clock.clone(),
            rx,
            self.audio_stats.clone(),
            &self.config,
        )))
    }

    /// 启动音频输出；已启动或没有音频流时是 no-op
    pub fn start_audio(&mut self) -> Result<()> {
        if self.audio_output.is_some() {
            return Ok(());
        }
        let requested = match self.preferred_audio_format() {
            Some(format) => format,
            None => {
                info!("没有音频流，时钟由视频时间戳驱动");
                return Ok(());
            }
        };

        let mut output = AudioOutput::new(requested)?;
        if let Some(scheduler) = self.build_audio_scheduler(output.format())? {
            output.start(scheduler)?;
            self.audio_output = Some(output);
        }
        Ok(())
    }

    /// 只关闭音频输出，视频路径继续；先停硬件回调再断开包队列
    pub fn close_audio(&mut self) {
        if let Some(mut output) = self.audio_output.take() {
            output.stop();
        }
        if self.engine.audio_attached() {
            self.engine.detach_audio();
            info!("音频路径已关闭");
        }
        self.audio_clock = false;
        self.holdback.clear();
        self.holdback_bytes = 0;
    }

    pub fn set_volume(&self, volume: f32) {
        if let Some(output) = &self.audio_output {
            output.set_volume(volume);
        }
    }

    /// 开始 / 恢复播放
    pub fn play(&mut self) {
        if self.clock.play() {
            info!("▶ 播放 ({:.3}s)", self.clock.now());
        } else {
            warn!("当前状态 {:?} 无法播放", self.clock.state());
        }
    }

    /// 暂停：硬件缓冲不再提交，队列内容保留
    pub fn pause(&mut self) {
        if self.clock.pause() {
            info!("⏸ 暂停 ({:.3}s)", self.clock.now());
        }
    }

    /// 停止（本会话终态）
    pub fn stop(&mut self) {
        self.stopped = true;
        self.clock.stop();
        self.close_audio();
        self.queue.clear();
        info!("⏹ 停止 ({:.3}s)", self.clock.now());
    }

    /// 直接从引擎读一个包（不经过 step_frame 的分发）
    pub fn read_packet(&mut self) -> Result<Option<EncodedPacket>> {
        self.engine.read_packet()
    }

    /// 把暂存的音频包尽量移入队列；流结束且暂存清空后标记队列结束
    ///
    /// 返回暂存是否已清空。
    pub fn pump_audio(&mut self) -> bool {
        while let Some(packet) = self.holdback.pop_front() {
            let size = packet.size();
            match self.queue.enqueue(packet) {
                Ok(()) => self.holdback_bytes -= size,
                Err((packet, _)) => {
                    self.holdback.push_front(packet);
                    break;
                }
            }
        }
        if self.holdback.is_empty() {
            if self.backpressured {
                debug!("背压解除");
                self.backpressured = false;
            }
            if self.end_of_stream {
                self.queue.mark_finished();
            }
            true
        } else {
            false
        }
    }

    /// 驱动一次：读包、分发音频包、解码视频直到产出一帧
    ///
    /// 只有真正到达流末尾才返回 false。
    pub fn step_frame(&mut self) -> bool {
        if self.stopped || !self.engine.is_open() {
            return false;
        }
        self.pump_audio();

        if self.end_of_stream {
            return self.drain_tail();
        }

        loop {
            // 音频远超消费速度：本次暂停解封装
            if self.holdback_bytes >= self.queue.budget() {
                if !self.backpressured {
                    debug!("⏳ 音频队列已满，暂停解封装");
                    self.backpressured = true;
                }
                return true;
            }

            let packet = match self.engine.read_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    info!("📄 到达流末尾");
                    return self.finish_stream();
                }
                Err(e) => {
                    error!("❌ 读包失败，按流结束处理: {}", e);
                    return self.finish_stream();
                }
            };

            match packet.kind {
                StreamKind::Audio => {
                    if self.engine.audio_attached() {
                        self.holdback_bytes += packet.size();
                        self.holdback.push_back(packet);
                        self.pump_audio();
                    }
                }
                StreamKind::Video => match self.engine.decode_video(&packet) {
                    Ok(VideoDecodeOutcome::Frame(frame)) => {
                        self.present(frame);
                        return true;
                    }
                    Ok(VideoDecodeOutcome::NeedMorePackets) => continue,
                    Err(e) => {
                        warn!("⚠️ 跳过无法解码的视频包 pts={:?}: {}", packet.pts, e);
                        return true;
                    }
                },
            }
        }
    }

    fn finish_stream(&mut self) -> bool {
        self.end_of_stream = true;
        self.pump_audio();
        self.drain_tail()
    }

    /// 流结束后逐帧取出解码器缓存的帧
    fn drain_tail(&mut self) -> bool {
        match self.engine.drain_video() {
            Ok(Some(frame)) => {
                self.present(frame);
                true
            }
            Ok(None) => {
                self.stop_clock_at_end();
                false
            }
            Err(e) => {
                warn!("取出缓存帧失败: {}", e);
                self.stop_clock_at_end();
                false
            }
        }
    }

    /// 没有更多视频帧时的时钟收尾
    ///
    /// 有音频时由调度器在最后一个缓冲播完后停止时钟；
    /// 但 seek 之后一帧都没解出来时时钟还停在 seeking，这里直接结束会话。
    fn stop_clock_at_end(&mut self) {
        let state = self.clock.state();
        if state == PlaybackState::Stopped {
            return;
        }
        if !self.audio_clock || state == PlaybackState::Seeking {
            if state == PlaybackState::Seeking {
                warn!("Seek 后流已结束，未解出任何帧");
            }
            self.clock.stop();
        }
    }

    fn present(&mut self, frame: DecodedVideoFrame) {
        if self.clock.state() == PlaybackState::Seeking {
            if self.clock.anchor(frame.pts) {
                info!("🎯 Seek 后首帧 pts={:.3}s，时钟重新定位", frame.pts);
            }
        } else if !self.audio_clock {
            self.clock.follow_video(frame.pts);
        }
        if let Some(sink) = self.frame_sink.as_mut() {
            sink.push_frame(&frame);
        }
        self.current_image = Some(frame);
    }

    /// Seek 到 `seconds` 之前最近的关键帧；失败时位置不变
    pub fn seek_time(&mut self, seconds: f64) -> Result<()> {
        info!("⏩ Seek 请求: {:.3}s", seconds);
        if let Err(e) = self.engine.seek(seconds) {
            warn!("Seek 失败: {}", e);
            return Err(e);
        }
        self.holdback.clear();
        self.holdback_bytes = 0;
        self.backpressured = false;
        self.current_image = None;
        self.end_of_stream = false;
        Ok(())
    }

    /// 释放全部资源：先停硬件回调，再释放解码器和媒体源；可重复调用
    pub fn close(&mut self) {
        if !self.engine.is_open() && self.audio_output.is_none() {
            return;
        }
        self.clock.stop();
        self.close_audio();
        self.engine.close();
        self.current_image = None;
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.close();
    }
}
