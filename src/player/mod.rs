// 播放器核心模块

pub mod demuxer;
pub mod demuxer_source; // Demuxer/解码器抽象接口
pub mod decoder;
pub mod engine; // 解封装/解码引擎
pub mod packet_queue; // 音频包队列（字节预算）
pub mod scheduler; // 音频输出调度器（硬件回调侧）
pub mod audio_output;
pub mod frame_sink;
pub mod manager;
pub mod network_stream;

#[cfg(test)]
pub(crate) mod synthetic;

pub use audio_output::{AudioOutput, HardwareFeeder};
pub use decoder::{FfmpegAudioDecoder, FfmpegVideoDecoder};
pub use demuxer::Demuxer;
pub use demuxer_source::{AudioDecode, PacketSource, VideoDecode, VideoDecodeOutcome};
pub use engine::MediaEngine;
pub use frame_sink::{FrameSink, LoggingSink};
pub use manager::{PlaybackStats, Player};
pub use network_stream::{ReadRetry, StreamStats};
pub use packet_queue::AudioPacketQueue;
pub use scheduler::{AudioCommand, AudioScheduler, AudioStats};
