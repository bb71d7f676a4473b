use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 传输方式（仅对 RTSP 等网络流有意义）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// 可靠传输（RTSP over TCP）
    Reliable,
    /// 不可靠传输（RTP over UDP）
    Unreliable,
}

impl TransportMode {
    pub fn from_uses_tcp(uses_tcp: bool) -> Self {
        if uses_tcp {
            TransportMode::Reliable
        } else {
            TransportMode::Unreliable
        }
    }

    /// 对应 FFmpeg 的 rtsp_transport 选项
    pub fn rtsp_transport(&self) -> &'static str {
        match self {
            TransportMode::Reliable => "tcp",
            TransportMode::Unreliable => "udp",
        }
    }
}

/// 流媒体协议类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProtocol {
    /// RTSP - 实时流协议（监控摄像头）
    RTSP,
    /// RTMP - 实时消息协议（直播流）
    RTMP,
    /// HLS - HTTP Live Streaming
    HLS,
    /// HTTP - 普通 HTTP 流
    HTTP,
}

impl StreamProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamProtocol::RTSP => "RTSP",
            StreamProtocol::RTMP => "RTMP",
            StreamProtocol::HLS => "HLS",
            StreamProtocol::HTTP => "HTTP",
        }
    }
}

/// 媒体源定位：地址 + 是否使用可靠传输
#[derive(Debug, Clone)]
pub struct SourceLocator {
    pub url: String,
    pub transport: TransportMode,
}

impl SourceLocator {
    pub fn new(url: impl Into<String>, uses_tcp: bool) -> Self {
        Self {
            url: url.into(),
            transport: TransportMode::from_uses_tcp(uses_tcp),
        }
    }

    /// 从地址判断协议，本地文件返回 None
    pub fn protocol(&self) -> Option<StreamProtocol> {
        let url = self.url.as_str();
        if url.starts_with("rtsp://") {
            Some(StreamProtocol::RTSP)
        } else if url.starts_with("rtmp://") {
            Some(StreamProtocol::RTMP)
        } else if url.ends_with(".m3u8") || url.contains("/hls/") {
            Some(StreamProtocol::HLS)
        } else if url.starts_with("http://") || url.starts_with("https://") {
            Some(StreamProtocol::HTTP)
        } else {
            None
        }
    }

    /// 判断是否为网络流
    pub fn is_network_stream(&self) -> bool {
        self.protocol().is_some()
    }

    /// 本地文件路径（网络流返回 None）
    pub fn local_path(&self) -> Option<PathBuf> {
        if self.is_network_stream() {
            None
        } else {
            Some(PathBuf::from(self.url.trim_start_matches("file://")))
        }
    }
}

/// 流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

/// 编码数据包（跨线程传递，内容已从 FFmpeg 包中复制出来）
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    pub kind: StreamKind,
    pub stream_index: usize,
    /// 显示时间戳（秒，已减去容器起始时间）
    pub pts: Option<f64>,
    /// 包持续时间（秒，未知为 0）
    pub duration: f64,
    pub is_keyframe: bool,
    /// 容器原生时间基下的 pts/dts，解码器需要
    pub raw_pts: Option<i64>,
    pub raw_dts: Option<i64>,
    pub data: Vec<u8>,
}

impl EncodedPacket {
    /// 包大小（字节），队列预算按此计算
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    RGBA,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::RGBA => 4,
        }
    }
}

/// 解码后的视频帧（呈现用位图）
#[derive(Debug, Clone)]
pub struct DecodedVideoFrame {
    /// 显示时间戳（秒）
    pub pts: f64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// 连续内存，行宽 = width * bytes_per_pixel
    pub data: Vec<u8>,
}

/// 音频采样格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
    I16,
    Other,
}

/// 音频输出格式（解码器重采样目标）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    /// 交错采样数对应的时长（秒）
    pub fn duration_of(&self, samples: usize) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        samples as f64 / (self.sample_rate as f64 * self.channels as f64)
    }

    /// 帧数对应的交错采样数
    pub fn samples_for_frames(&self, frames: usize) -> usize {
        frames * self.channels as usize
    }
}

/// 流描述（选流后不可变）
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDescriptor {
    Video {
        index: usize,
        codec: String,
        width: u32,
        height: u32,
        fps: f64,
    },
    Audio {
        index: usize,
        codec: String,
        sample_rate: u32,
        channels: u16,
        sample_format: SampleFormat,
    },
}

impl StreamDescriptor {
    pub fn index(&self) -> usize {
        match self {
            StreamDescriptor::Video { index, .. } | StreamDescriptor::Audio { index, .. } => *index,
        }
    }

    pub fn codec(&self) -> &str {
        match self {
            StreamDescriptor::Video { codec, .. } | StreamDescriptor::Audio { codec, .. } => codec,
        }
    }
}

/// 媒体信息
#[derive(Debug, Clone)]
pub struct MediaInfo {
    /// 总时长（秒），直播或未知为 0
    pub duration: f64,
    pub video: StreamDescriptor,
    pub audio: Option<StreamDescriptor>,
}

impl MediaInfo {
    pub fn video_size(&self) -> (u32, u32) {
        match self.video {
            StreamDescriptor::Video { width, height, .. } => (width, height),
            StreamDescriptor::Audio { .. } => (0, 0),
        }
    }

    pub fn fps(&self) -> f64 {
        match self.video {
            StreamDescriptor::Video { fps, .. } => fps,
            StreamDescriptor::Audio { .. } => 0.0,
        }
    }

    /// 源音频格式
    pub fn audio_format(&self) -> Option<AudioFormat> {
        match self.audio {
            Some(StreamDescriptor::Audio {
                sample_rate,
                channels,
                ..
            }) => Some(AudioFormat {
                sample_rate,
                channels,
            }),
            _ => None,
        }
    }
}

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Ready,
    Stopped,
    Playing,
    Paused,
    Seeking,
}

impl PlaybackState {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            PlaybackState::Ready => 0,
            PlaybackState::Stopped => 1,
            PlaybackState::Playing => 2,
            PlaybackState::Paused => 3,
            PlaybackState::Seeking => 4,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => PlaybackState::Ready,
            2 => PlaybackState::Playing,
            3 => PlaybackState::Paused,
            4 => PlaybackState::Seeking,
            _ => PlaybackState::Stopped,
        }
    }

    /// 状态机是否允许 self -> next
    pub fn can_transition_to(self, next: PlaybackState) -> bool {
        use PlaybackState::*;
        match (self, next) {
            (Stopped, _) => false,
            (_, Seeking) => true,
            (Ready, Playing) => true,
            (Playing, Paused) | (Paused, Playing) => true,
            (Seeking, Playing) | (Seeking, Paused) => true,
            (Playing, Stopped) | (Paused, Stopped) | (Ready, Stopped) | (Seeking, Stopped) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_protocol() {
        assert_eq!(
            SourceLocator::new("rtsp://cam/live", true).protocol(),
            Some(StreamProtocol::RTSP)
        );
        assert_eq!(
            SourceLocator::new("https://cdn/a/index.m3u8", false).protocol(),
            Some(StreamProtocol::HLS)
        );
        let file = SourceLocator::new("file:///tmp/a.mp4", false);
        assert!(!file.is_network_stream());
        assert_eq!(file.local_path(), Some(PathBuf::from("/tmp/a.mp4")));
    }

    #[test]
    fn test_transport_mode() {
        assert_eq!(SourceLocator::new("rtsp://x", true).transport.rtsp_transport(), "tcp");
        assert_eq!(SourceLocator::new("rtsp://x", false).transport.rtsp_transport(), "udp");
    }

    #[test]
    fn test_state_machine() {
        use PlaybackState::*;
        assert!(Ready.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Playing));
        assert!(Paused.can_transition_to(Seeking));
        assert!(Seeking.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Stopped));
        assert!(!Stopped.can_transition_to(Playing));
        assert!(!Ready.can_transition_to(Paused));
        for state in [Ready, Stopped, Playing, Paused, Seeking] {
            assert_eq!(PlaybackState::from_u8(state.to_u8()), state);
        }
    }

    #[test]
    fn test_audio_duration() {
        let format = AudioFormat {
            sample_rate: 44100,
            channels: 2,
        };
        assert!((format.duration_of(88200) - 1.0).abs() < 1e-9);
        assert_eq!(format.samples_for_frames(1024), 2048);
    }
}
