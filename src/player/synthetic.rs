//! 测试用的合成媒体源：10 秒 640x480@30fps 视频 + 44.1kHz 立体声音频

use crate::core::{
    AudioFormat, DecodedVideoFrame, EncodedPacket, MediaInfo, PixelFormat, PlayerError, Result,
    SampleFormat, StreamDescriptor, StreamKind,
};
use crate::player::demuxer_source::{AudioDecode, PacketSource, VideoDecode, VideoDecodeOutcome};
use std::cmp::Ordering;
use std::collections::VecDeque;

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;
pub const FPS: usize = 30;
pub const VIDEO_FRAMES: usize = 300;
pub const SAMPLE_RATE: u32 = 44100;
pub const CHANNELS: u16 = 2;
pub const FRAMES_PER_PACKET: usize = 1024;
pub const TOTAL_AUDIO_FRAMES: usize = 441_000;
pub const KEYFRAME_INTERVAL_SECS: f64 = 2.0;

const AUDIO_PACKET_BYTES: usize = 300;
const VIDEO_PACKET_BYTES: usize = 64;

/// 合成流参数
#[derive(Debug, Clone)]
pub struct SyntheticStream {
    pub with_audio: bool,
    pub seekable: bool,
    /// 解码失败的音频包序号
    pub corrupt_audio_packets: Vec<usize>,
    /// 解码失败的视频帧序号
    pub corrupt_video_packets: Vec<usize>,
    /// (包序号, 失败次数)：读到该包前先失败若干次
    pub read_failures: Option<(usize, u32)>,
    /// 视频解码器缓存的帧数（模拟 B 帧重排）
    pub reorder_delay: usize,
}

impl Default for SyntheticStream {
    fn default() -> Self {
        Self {
            with_audio: true,
            seekable: true,
            corrupt_audio_packets: Vec::new(),
            corrupt_video_packets: Vec::new(),
            read_failures: None,
            reorder_delay: 0,
        }
    }
}

pub struct SyntheticSource {
    stream: SyntheticStream,
    packets: Vec<EncodedPacket>,
    cursor: usize,
    failures_left: u32,
    media_info: MediaInfo,
}

impl SyntheticSource {
    pub fn new(stream: SyntheticStream) -> Self {
        let mut packets: Vec<EncodedPacket> = (0..VIDEO_FRAMES)
            .map(|i| {
                let mut data = vec![0u8; VIDEO_PACKET_BYTES];
                data[0] = stream.corrupt_video_packets.contains(&i) as u8;
                EncodedPacket {
                    kind: StreamKind::Video,
                    stream_index: 0,
                    pts: Some(i as f64 / FPS as f64),
                    duration: 1.0 / FPS as f64,
                    is_keyframe: i % (KEYFRAME_INTERVAL_SECS as usize * FPS) == 0,
                    raw_pts: Some(i as i64),
                    raw_dts: Some(i as i64),
                    data,
                }
            })
            .collect();

        if stream.with_audio {
            let mut start = 0;
            let mut index = 0;
            while start < TOTAL_AUDIO_FRAMES {
                let frames = FRAMES_PER_PACKET.min(TOTAL_AUDIO_FRAMES - start);
                let mut data = vec![0u8; AUDIO_PACKET_BYTES];
                data[0] = stream.corrupt_audio_packets.contains(&index) as u8;
                data[1..5].copy_from_slice(&(frames as u32).to_le_bytes());
                packets.push(EncodedPacket {
                    kind: StreamKind::Audio,
                    stream_index: 1,
                    pts: Some(start as f64 / SAMPLE_RATE as f64),
                    duration: frames as f64 / SAMPLE_RATE as f64,
                    is_keyframe: true,
                    raw_pts: Some(start as i64),
                    raw_dts: Some(start as i64),
                    data,
                });
                start += frames;
                index += 1;
            }
        }

        // 稳定排序：同一时间戳视频在前
        packets.sort_by(|a, b| {
            a.pts
                .partial_cmp(&b.pts)
                .unwrap_or(Ordering::Equal)
        });

        let audio = stream.with_audio.then(|| StreamDescriptor::Audio {
            index: 1,
            codec: "pcm_synthetic".to_string(),
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            sample_format: SampleFormat::F32,
        });
        let media_info = MediaInfo {
            duration: VIDEO_FRAMES as f64 / FPS as f64,
            video: StreamDescriptor::Video {
                index: 0,
                codec: "synthetic".to_string(),
                width: WIDTH,
                height: HEIGHT,
                fps: FPS as f64,
            },
            audio,
        };

        let failures_left = stream.read_failures.map(|(_, n)| n).unwrap_or(0);
        Self {
            stream,
            packets,
            cursor: 0,
            failures_left,
            media_info,
        }
    }
}

impl PacketSource for SyntheticSource {
    fn read_packet(&mut self) -> Result<Option<EncodedPacket>> {
        if let Some((at, _)) = self.stream.read_failures {
            if self.cursor == at && self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(PlayerError::ReadFailed("synthetic read error".to_string()));
            }
        }
        let packet = self.packets.get(self.cursor).cloned();
        if packet.is_some() {
            self.cursor += 1;
        }
        Ok(packet)
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        let keyframe = (seconds / KEYFRAME_INTERVAL_SECS).floor() * KEYFRAME_INTERVAL_SECS;
        self.cursor = self
            .packets
            .iter()
            .position(|p| p.pts.unwrap_or(0.0) >= keyframe - 1e-9)
            .unwrap_or(self.packets.len());
        Ok(())
    }

    fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    fn video_decoder(&self, output_size: Option<(u32, u32)>) -> Result<Box<dyn VideoDecode>> {
        let (width, height) = output_size.unwrap_or((WIDTH, HEIGHT));
        Ok(Box::new(SyntheticVideoDecoder {
            width,
            height,
            delay: self.stream.reorder_delay,
            pending: VecDeque::new(),
        }))
    }

    fn audio_decoder(&self, target: AudioFormat) -> Result<Option<Box<dyn AudioDecode>>> {
        if !self.stream.with_audio {
            return Ok(None);
        }
        Ok(Some(Box::new(SyntheticAudioDecoder { target })))
    }

    fn is_seekable(&self) -> bool {
        self.stream.seekable && self.media_info.duration > 0.0
    }

    fn description(&self) -> String {
        "synthetic 640x480@30".to_string()
    }
}

struct SyntheticVideoDecoder {
    width: u32,
    height: u32,
    delay: usize,
    pending: VecDeque<f64>,
}

impl SyntheticVideoDecoder {
    fn frame(&self, pts: f64) -> DecodedVideoFrame {
        DecodedVideoFrame {
            pts,
            width: self.width,
            height: self.height,
            format: PixelFormat::RGBA,
            data: vec![0u8; self.width as usize * self.height as usize * 4],
        }
    }
}

impl VideoDecode for SyntheticVideoDecoder {
    fn decode(&mut self, packet: &EncodedPacket) -> Result<VideoDecodeOutcome> {
        if packet.data.first() == Some(&1) {
            return Err(PlayerError::DecodeFailed("corrupt synthetic frame".to_string()));
        }
        self.pending.push_back(packet.pts.unwrap_or(0.0));
        if self.pending.len() > self.delay {
            if let Some(pts) = self.pending.pop_front() {
                return Ok(VideoDecodeOutcome::Frame(self.frame(pts)));
            }
        }
        Ok(VideoDecodeOutcome::NeedMorePackets)
    }

    fn drain(&mut self) -> Result<Option<DecodedVideoFrame>> {
        Ok(self.pending.pop_front().map(|pts| self.frame(pts)))
    }

    fn flush(&mut self) {
        self.pending.clear();
    }

    fn set_output_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }
}

struct SyntheticAudioDecoder {
    target: AudioFormat,
}

impl AudioDecode for SyntheticAudioDecoder {
    fn decode(&mut self, packet: &EncodedPacket) -> Result<Vec<f32>> {
        if packet.data.first() == Some(&1) {
            return Err(PlayerError::DecodeFailed("corrupt synthetic packet".to_string()));
        }
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&packet.data[1..5]);
        let frames = u32::from_le_bytes(raw) as usize * self.target.sample_rate as usize
            / SAMPLE_RATE as usize;
        Ok(vec![0.0; self.target.samples_for_frames(frames)])
    }

    fn flush(&mut self) {}

    fn output_format(&self) -> AudioFormat {
        self.target
    }
}
