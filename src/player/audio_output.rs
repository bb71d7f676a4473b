use crate::core::{AudioFormat, PlayerError, Result};
use crate::player::scheduler::AudioScheduler;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfigRange};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// 把设备回调（任意长度的采样请求）转换成按槽的完成事件
///
/// 从调度器最早提交的槽里拷贝采样；槽读完即调用 `on_buffer_complete`。
/// 没有在播放的槽时输出静音。
pub struct HardwareFeeder {
    scheduler: AudioScheduler,
    cursor: usize, // 当前槽内的读位置
}

impl HardwareFeeder {
    pub fn new(scheduler: AudioScheduler) -> Self {
        Self {
            scheduler,
            cursor: 0,
        }
    }

    /// 填充一次设备缓冲
    pub fn fill(&mut self, data: &mut [f32], volume: f32) {
        self.scheduler.poll();

        let mut written = 0;
        while written < data.len() {
            let head = match self.scheduler.next_in_flight() {
                Some(head) => head,
                None => break,
            };
            let samples = self.scheduler.slot(head).samples();
            let remaining = &samples[self.cursor.min(samples.len())..];
            let n = remaining.len().min(data.len() - written);
            for (out, sample) in data[written..written + n].iter_mut().zip(remaining) {
                *out = sample * volume;
            }
            written += n;
            self.cursor += n;

            if self.cursor >= samples.len() {
                self.cursor = 0;
                self.scheduler.on_buffer_complete(head);
            }
        }
        data[written..].fill(0.0);
    }
}

/// 音频输出 - 使用 cpal 播放音频
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    volume: Arc<Mutex<f32>>,
}

// cpal::Stream 本身不是 Send，但 AudioOutput 只在创建它的播放线程中使用
unsafe impl Send for AudioOutput {}

impl AudioOutput {
    /// 创建音频输出（支持非标准配置自动回退）
    pub fn new(requested: AudioFormat) -> Result<Self> {
        info!(
            "初始化音频输出: {} Hz, {} 声道",
            requested.sample_rate, requested.channels
        );

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;

        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        let mut candidates = vec![(requested.sample_rate, requested.channels)];
        candidates.extend([
            (48000, 2), // 最常见
            (44100, 2), // CD 音质
            (48000, 1),
            (44100, 1),
        ]);

        for (index, (rate, channels)) in candidates.into_iter().enumerate() {
            let config = StreamConfig {
                channels,
                sample_rate: cpal::SampleRate(rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let supported = device
                .supported_output_configs()
                .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?
                .any(|range| Self::is_config_compatible(&config, &range));

            if supported {
                if index > 0 {
                    warn!(
                        "⚠️  音频设备不支持 {} Hz, {} 声道，使用回退配置: {} Hz, {} 声道",
                        requested.sample_rate, requested.channels, rate, channels
                    );
                }
                return Ok(Self {
                    device,
                    config,
                    stream: None,
                    volume: Arc::new(Mutex::new(1.0)),
                });
            }
        }

        Err(PlayerError::AudioError(format!(
            "音频设备不支持任何标准配置 (原请求: {} Hz, {} 声道)",
            requested.sample_rate, requested.channels
        )))
    }

    /// 检查配置是否兼容
    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;

        rate_in_range
            && config.channels == supported.channels()
            && supported.sample_format() == cpal::SampleFormat::F32
    }

    /// 实际使用的输出格式
    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.config.sample_rate.0,
            channels: self.config.channels,
        }
    }

    /// 启动硬件回调；已启动时是 no-op
    pub fn start(&mut self, scheduler: AudioScheduler) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let volume = self.volume.clone();
        let mut feeder = HardwareFeeder::new(scheduler);

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let vol = *volume.lock();
                    feeder.fill(data, vol);
                },
                move |err| {
                    error!("音频流错误: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))?;

        stream
            .play()
            .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;

        self.stream = Some(stream);
        info!("音频输出已启动");

        Ok(())
    }

    /// 停止播放并释放硬件缓冲（回调连同调度器一起销毁）；可重复调用
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!("暂停音频流失败: {}", e);
            }
            drop(stream);
            info!("音频输出已停止");
        }
    }

    /// 设置音量 (0.0 - 1.0)
    pub fn set_volume(&self, volume: f32) {
        *self.volume.lock() = volume.clamp(0.0, 1.0);
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
