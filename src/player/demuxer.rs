use crate::core::{
    AudioFormat, EncodedPacket, MediaInfo, NetworkOptions, PlayerError, Result, SampleFormat,
    SourceLocator, StreamDescriptor, StreamKind, StreamProtocol,
};
use crate::player::decoder::{FfmpegAudioDecoder, FfmpegVideoDecoder};
use crate::player::demuxer_source::{AudioDecode, PacketSource, VideoDecode};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, info};

/// 解封装器 - 负责打开媒体源并读取选中的音视频流
pub struct Demuxer {
    input_ctx: format::context::Input,
    time_bases: Vec<f64>, // 每个流的时间基（秒）
    start_time: f64,      // 容器起始时间（秒）
    media_info: MediaInfo,
    source_path: String,
}

impl Demuxer {
    /// 打开媒体源
    pub fn open(locator: &SourceLocator, network: &NetworkOptions) -> Result<Self> {
        info!("正在打开媒体源: {} ({:?})", locator.url, locator.transport);

        let input_ctx = match locator.protocol() {
            Some(protocol) => {
                info!("🌐 检测到 {} 网络流，应用网络选项", protocol.as_str());
                let options = Self::network_options(locator, protocol, network);
                format::input_with_dictionary(&locator.url, options)
                    .map_err(|e| PlayerError::OpenFailed(format!("无法打开网络流: {}", e)))?
            }
            None => {
                let path = locator
                    .local_path()
                    .ok_or_else(|| PlayerError::OpenFailed(locator.url.clone()))?;
                format::input(&path)
                    .map_err(|e| PlayerError::OpenFailed(format!("无法打开文件: {}", e)))?
            }
        };

        // 各取第一条视频流和音频流
        let video_stream_index = input_ctx
            .streams()
            .find(|s| s.parameters().medium() == media::Type::Video)
            .map(|s| s.index())
            .ok_or(PlayerError::NoVideoStream)?;

        let audio_stream_index = input_ctx
            .streams()
            .find(|s| s.parameters().medium() == media::Type::Audio)
            .map(|s| s.index());

        debug!("视频流索引: {}", video_stream_index);
        debug!("音频流索引: {:?}", audio_stream_index);

        let time_bases: Vec<f64> = input_ctx
            .streams()
            .map(|s| {
                let tb = s.time_base();
                if tb.denominator() == 0 {
                    0.0
                } else {
                    tb.numerator() as f64 / tb.denominator() as f64
                }
            })
            .collect();

        // 以视频流的起始时间为零点，音频包共用同一零点
        let start_time = input_ctx
            .stream(video_stream_index)
            .map(|stream| {
                stream_start_seconds(
                    stream.start_time(),
                    time_bases.get(video_stream_index).copied().unwrap_or(0.0),
                )
            })
            .unwrap_or(0.0);

        let media_info =
            Self::extract_media_info(&input_ctx, video_stream_index, audio_stream_index)?;

        info!(
            "✅ 打开成功: {} {}x{} @ {:.2}fps, 时长 {:.2}s, 音频 {} {:?}",
            media_info.video.codec(),
            media_info.video_size().0,
            media_info.video_size().1,
            media_info.fps(),
            media_info.duration,
            media_info.audio.as_ref().map(|a| a.codec()).unwrap_or("-"),
            media_info.audio_format()
        );

        Ok(Self {
            input_ctx,
            time_bases,
            start_time,
            media_info,
            source_path: locator.url.clone(),
        })
    }

    /// 网络流的 FFmpeg 选项
    fn network_options(
        locator: &SourceLocator,
        protocol: StreamProtocol,
        network: &NetworkOptions,
    ) -> ffmpeg::Dictionary<'static> {
        let mut options = ffmpeg::Dictionary::new();

        // discardcorrupt: 丢弃损坏的帧; genpts: 生成缺失的 PTS
        options.set("fflags", "+discardcorrupt+genpts");
        options.set("analyzeduration", &network.analyze_duration_us.to_string());
        options.set("probesize", &network.probe_size.to_string());
        options.set("timeout", &network.timeout_us.to_string());
        options.set("max_delay", &network.max_delay_us.to_string());

        if protocol == StreamProtocol::RTSP {
            options.set("rtsp_transport", locator.transport.rtsp_transport());
        }
        options
    }

    /// 提取媒体信息（内部使用）
    fn extract_media_info(
        input_ctx: &format::context::Input,
        video_index: usize,
        audio_index: Option<usize>,
    ) -> Result<MediaInfo> {
        let video_stream = input_ctx
            .stream(video_index)
            .ok_or(PlayerError::NoVideoStream)?;
        let parameters = video_stream.parameters();
        let codec = parameters.id().name().to_string();
        let video_decoder = ffmpeg::codec::context::Context::from_parameters(parameters)?
            .decoder()
            .video()?;

        let rate = video_stream.avg_frame_rate();
        let fps = if rate.denominator() == 0 {
            0.0
        } else {
            rate.numerator() as f64 / rate.denominator() as f64
        };

        let video = StreamDescriptor::Video {
            index: video_index,
            codec,
            width: video_decoder.width(),
            height: video_decoder.height(),
            fps,
        };

        let audio = match audio_index.and_then(|idx| input_ctx.stream(idx)) {
            Some(audio_stream) => {
                let parameters = audio_stream.parameters();
                let codec = parameters.id().name().to_string();
                let audio_decoder = ffmpeg::codec::context::Context::from_parameters(parameters)?
                    .decoder()
                    .audio()?;
                let sample_format = match audio_decoder.format() {
                    ffmpeg::format::Sample::F32(_) => SampleFormat::F32,
                    ffmpeg::format::Sample::I16(_) => SampleFormat::I16,
                    _ => SampleFormat::Other,
                };
                Some(StreamDescriptor::Audio {
                    index: audio_stream.index(),
                    codec,
                    sample_rate: audio_decoder.rate(),
                    channels: audio_decoder.channels(),
                    sample_format,
                })
            }
            None => None,
        };

        // 微秒转秒，直播流为 0
        let duration = input_ctx.duration();
        let duration = if duration > 0 {
            duration as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
        } else {
            0.0
        };

        Ok(MediaInfo {
            duration,
            video,
            audio,
        })
    }

    fn video_index(&self) -> usize {
        self.media_info.video.index()
    }

    fn audio_index(&self) -> Option<usize> {
        self.media_info.audio.as_ref().map(StreamDescriptor::index)
    }

    fn to_seconds(&self, stream_index: usize, ts: Option<i64>) -> Option<f64> {
        let tb = self.time_bases.get(stream_index).copied()?;
        ts.map(|ts| ts as f64 * tb - self.start_time)
    }
}

impl PacketSource for Demuxer {
    fn read_packet(&mut self) -> Result<Option<EncodedPacket>> {
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input_ctx) {
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(e) => return Err(PlayerError::ReadFailed(e.to_string())),
            }

            let stream_index = packet.stream();
            let kind = if stream_index == self.video_index() {
                StreamKind::Video
            } else if Some(stream_index) == self.audio_index() {
                StreamKind::Audio
            } else {
                // 跳过其他流
                continue;
            };

            let tb = self.time_bases.get(stream_index).copied().unwrap_or(0.0);
            return Ok(Some(EncodedPacket {
                kind,
                stream_index,
                pts: self.to_seconds(stream_index, packet.pts().or(packet.dts())),
                duration: packet.duration() as f64 * tb,
                is_keyframe: packet.is_key(),
                raw_pts: packet.pts(),
                raw_dts: packet.dts(),
                data: packet.data().map(|d| d.to_vec()).unwrap_or_default(),
            }));
        }
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        let timestamp = ((seconds + self.start_time) * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;
        self.input_ctx
            .seek(timestamp, ..timestamp)
            .map_err(|e| PlayerError::SeekFailed(format!("{}s: {}", seconds, e)))
    }

    fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    fn video_decoder(&self, output_size: Option<(u32, u32)>) -> Result<Box<dyn VideoDecode>> {
        let stream = self
            .input_ctx
            .stream(self.video_index())
            .ok_or(PlayerError::NoVideoStream)?;
        let decoder = FfmpegVideoDecoder::from_stream(stream, self.start_time, output_size)?;
        Ok(Box::new(decoder))
    }

    fn audio_decoder(&self, target: AudioFormat) -> Result<Option<Box<dyn AudioDecode>>> {
        let stream = match self.audio_index().and_then(|idx| self.input_ctx.stream(idx)) {
            Some(stream) => stream,
            None => return Ok(None),
        };
        let decoder = FfmpegAudioDecoder::from_stream(stream, target)?;
        Ok(Some(Box::new(decoder)))
    }

    fn description(&self) -> String {
        format!("FFmpeg Demuxer: {}", self.source_path)
    }
}

/// 流起始时间换算成秒；未设置时为 0
fn stream_start_seconds(start: i64, time_base: f64) -> f64 {
    if start == ffmpeg::ffi::AV_NOPTS_VALUE {
        0.0
    } else {
        start as f64 * time_base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_start_seconds() {
        assert_eq!(stream_start_seconds(ffmpeg::ffi::AV_NOPTS_VALUE, 1.0 / 90000.0), 0.0);
        assert_eq!(stream_start_seconds(0, 1.0 / 90000.0), 0.0);
        assert!((stream_start_seconds(126_000, 1.0 / 90000.0) - 1.4).abs() < 1e-9);
    }
}
