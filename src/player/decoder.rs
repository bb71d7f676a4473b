use crate::core::{AudioFormat, DecodedVideoFrame, EncodedPacket, PixelFormat, PlayerError, Result};
use crate::player::demuxer_source::{AudioDecode, VideoDecode, VideoDecodeOutcome};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, software, util};
use log::{debug, warn};
use std::collections::VecDeque;

fn time_base_of(stream: &format::stream::Stream) -> f64 {
    let tb = stream.time_base();
    if tb.denominator() == 0 {
        0.0
    } else {
        tb.numerator() as f64 / tb.denominator() as f64
    }
}

/// 把自有的编码包还原成 FFmpeg 包
fn to_av_packet(packet: &EncodedPacket) -> ffmpeg::Packet {
    let mut av_packet = ffmpeg::Packet::copy(&packet.data);
    av_packet.set_pts(packet.raw_pts);
    av_packet.set_dts(packet.raw_dts);
    if packet.is_keyframe {
        av_packet.set_flags(codec::packet::Flags::KEY);
    }
    av_packet
}

fn is_again(e: &ffmpeg::Error) -> bool {
    matches!(e, ffmpeg::Error::Other { errno } if *errno == ffmpeg::error::EAGAIN)
}

/// 软件视频解码器，输出 RGBA 位图
pub struct FfmpegVideoDecoder {
    decoder: codec::decoder::Video,
    scaler: Option<software::scaling::Context>,
    scaler_key: (util::format::Pixel, u32, u32, u32, u32),
    time_base: f64,
    start_time: f64,
    output_size: Option<(u32, u32)>,
    scratch: util::frame::Video, // 复用的解码帧
    rgba: util::frame::Video,    // 复用的转换帧
    pending: VecDeque<DecodedVideoFrame>,
    last_pts: f64,
    draining: bool,
}

// SwsContext 本身不是 Send，但解码器只在解码线程中使用，且只被一个所有者持有
unsafe impl Send for FfmpegVideoDecoder {}

impl FfmpegVideoDecoder {
    /// 从视频流创建解码器
    pub fn from_stream(
        stream: format::stream::Stream,
        start_time: f64,
        output_size: Option<(u32, u32)>,
    ) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().video()?;

        debug!(
            "软件解码器: {}x{}, 格式: {:?}",
            decoder.width(),
            decoder.height(),
            decoder.format()
        );

        Ok(Self {
            decoder,
            scaler: None,
            scaler_key: (util::format::Pixel::None, 0, 0, 0, 0),
            time_base: time_base_of(&stream),
            start_time,
            output_size,
            scratch: util::frame::Video::empty(),
            rgba: util::frame::Video::empty(),
            pending: VecDeque::new(),
            last_pts: 0.0,
            draining: false,
        })
    }

    /// 取出解码器中所有就绪的帧
    fn receive_ready(&mut self) -> Result<()> {
        loop {
            match self.decoder.receive_frame(&mut self.scratch) {
                Ok(()) => {
                    let frame = self.convert_frame()?;
                    self.pending.push_back(frame);
                }
                Err(e) if is_again(&e) => return Ok(()),
                Err(ffmpeg::Error::Eof) => return Ok(()),
                Err(e) => return Err(PlayerError::DecodeFailed(e.to_string())),
            }
        }
    }

    /// 像素格式转换为 RGBA（每个输出帧一次）
    fn convert_frame(&mut self) -> Result<DecodedVideoFrame> {
        let src_format = self.scratch.format();
        let width = self.scratch.width();
        let height = self.scratch.height();
        let (out_width, out_height) = self.output_size.unwrap_or((width, height));

        let key = (src_format, width, height, out_width, out_height);
        if self.scaler.is_none() || self.scaler_key != key {
            self.scaler = Some(software::scaling::Context::get(
                src_format,
                width,
                height,
                util::format::Pixel::RGBA,
                out_width,
                out_height,
                software::scaling::Flags::BILINEAR,
            )?);
            self.scaler_key = key;
            // 尺寸变了，目标帧需要按新尺寸重新分配
            self.rgba = util::frame::Video::empty();
        }

        if let Some(scaler) = self.scaler.as_mut() {
            scaler.run(&self.scratch, &mut self.rgba)?;
        }

        let pts = match self.scratch.timestamp().or(self.scratch.pts()) {
            Some(ts) => ts as f64 * self.time_base - self.start_time,
            None => self.last_pts,
        };
        self.last_pts = pts;

        // 复制数据到连续内存
        let row_size = out_width as usize * PixelFormat::RGBA.bytes_per_pixel();
        let mut data = vec![0u8; row_size * out_height as usize];
        let stride = self.rgba.stride(0);
        let frame_data = self.rgba.data(0);
        for y in 0..out_height as usize {
            let src_offset = y * stride;
            let dst_offset = y * row_size;
            data[dst_offset..dst_offset + row_size]
                .copy_from_slice(&frame_data[src_offset..src_offset + row_size]);
        }

        Ok(DecodedVideoFrame {
            pts,
            width: out_width,
            height: out_height,
            format: PixelFormat::RGBA,
            data,
        })
    }
}

impl VideoDecode for FfmpegVideoDecoder {
    fn decode(&mut self, packet: &EncodedPacket) -> Result<VideoDecodeOutcome> {
        let av_packet = to_av_packet(packet);
        match self.decoder.send_packet(&av_packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                debug!("视频解码器收到 EOF（send_packet），执行 flush 并忽略本次包");
                self.decoder.flush();
            }
            Err(e) if is_again(&e) => {
                // 输出队列满，先取帧
                warn!("视频解码器暂不接受输入，本包丢弃");
            }
            Err(e) => return Err(PlayerError::DecodeFailed(e.to_string())),
        }

        self.receive_ready()?;

        Ok(match self.pending.pop_front() {
            Some(frame) => VideoDecodeOutcome::Frame(frame),
            None => VideoDecodeOutcome::NeedMorePackets,
        })
    }

    fn drain(&mut self) -> Result<Option<DecodedVideoFrame>> {
        if !self.draining {
            self.draining = true;
            if let Err(e) = self.decoder.send_eof() {
                debug!("send_eof 失败: {}", e);
            }
        }
        if self.pending.is_empty() {
            self.receive_ready()?;
        }
        Ok(self.pending.pop_front())
    }

    fn flush(&mut self) {
        self.decoder.flush();
        self.pending.clear();
        self.draining = false;
    }

    fn set_output_size(&mut self, width: u32, height: u32) {
        self.output_size = Some((width, height));
    }
}

/// 音频解码器，输出交错 f32
pub struct FfmpegAudioDecoder {
    decoder: codec::decoder::Audio,
    resampler: Option<software::resampling::Context>,
    target: AudioFormat,
    scratch: util::frame::Audio,
}

// SwrContext 同上，只在音频回调线程中使用
unsafe impl Send for FfmpegAudioDecoder {}

impl FfmpegAudioDecoder {
    /// 从音频流创建解码器（指定目标配置）
    pub fn from_stream(stream: format::stream::Stream, target: AudioFormat) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().audio()?;

        debug!(
            "音频解码器: {} Hz, {} 声道 → 目标: {} Hz, {} 声道",
            decoder.rate(),
            decoder.channels(),
            target.sample_rate,
            target.channels
        );

        Ok(Self {
            decoder,
            resampler: None,
            target,
            scratch: util::frame::Audio::empty(),
        })
    }

    /// 转换音频帧为 f32 并追加到 `out`（支持声道转换和重采样）
    fn convert_frame(&mut self, out: &mut Vec<f32>) -> Result<()> {
        if self.resampler.is_none() {
            let target_layout = match self.target.channels {
                1 => util::channel_layout::ChannelLayout::MONO,
                6 => util::channel_layout::ChannelLayout::_5POINT1,
                _ => util::channel_layout::ChannelLayout::STEREO,
            };
            let source_layout = if self.scratch.channel_layout().is_empty() {
                util::channel_layout::ChannelLayout::default(i32::from(self.scratch.channels()))
            } else {
                self.scratch.channel_layout()
            };

            debug!(
                "🔧 初始化音频重采样器: {}Hz/{}ch → {}Hz/{}ch",
                self.scratch.rate(),
                self.scratch.channels(),
                self.target.sample_rate,
                self.target.channels
            );

            self.resampler = Some(software::resampling::Context::get(
                self.scratch.format(),
                source_layout,
                self.scratch.rate(),
                util::format::Sample::F32(util::format::sample::Type::Packed),
                target_layout,
                self.target.sample_rate,
            )?);
        }

        let mut resampled = util::frame::Audio::empty();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.run(&self.scratch, &mut resampled)?;
        }

        let count = resampled.samples() * self.target.channels as usize;
        let bytes = resampled.data(0);
        out.extend(
            bytes
                .chunks_exact(4)
                .take(count)
                .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
        );
        Ok(())
    }
}

impl AudioDecode for FfmpegAudioDecoder {
    fn decode(&mut self, packet: &EncodedPacket) -> Result<Vec<f32>> {
        let mut samples = Vec::new();
        let av_packet = to_av_packet(packet);

        match self.decoder.send_packet(&av_packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                self.decoder.flush();
                return Ok(samples);
            }
            Err(e) => return Err(PlayerError::DecodeFailed(e.to_string())),
        }

        loop {
            match self.decoder.receive_frame(&mut self.scratch) {
                Ok(()) => self.convert_frame(&mut samples)?,
                Err(e) if is_again(&e) => break,
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => return Err(PlayerError::DecodeFailed(e.to_string())),
            }
        }

        Ok(samples)
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }

    fn output_format(&self) -> AudioFormat {
        self.target
    }
}
