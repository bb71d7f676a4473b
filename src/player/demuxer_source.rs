use crate::core::{AudioFormat, DecodedVideoFrame, EncodedPacket, MediaInfo, Result};

/// 视频解码一次喂包的结果
#[derive(Debug)]
pub enum VideoDecodeOutcome {
    Frame(DecodedVideoFrame),
    /// 解码器需要更多包才能输出（B 帧重排序等）
    NeedMorePackets,
}

/// 媒体包数据源抽象接口
///
/// 这是对外部解封装/解码库的窄接口：按地址打开、枚举流、读包、
/// seek 到关键帧、创建解码器。不同的后端（FFmpeg、测试用的合成流）实现这个 trait，
/// 播放引擎只面向它编程。
pub trait PacketSource: Send {
    /// 读取下一个媒体包（只包含已选中的视频/音频流）
    ///
    /// 返回：
    /// - Ok(Some(packet)): 成功读取一个包
    /// - Ok(None): 到达流末尾
    /// - Err(ReadFailed): 瞬时读错误，调用方决定是否重试
    fn read_packet(&mut self) -> Result<Option<EncodedPacket>>;

    /// Seek 到 `seconds` 之前最近的关键帧
    fn seek(&mut self, seconds: f64) -> Result<()>;

    /// 获取媒体信息
    fn media_info(&self) -> &MediaInfo;

    /// 创建视频解码器，输出尺寸为 `output_size`（None 表示源尺寸）
    fn video_decoder(&self, output_size: Option<(u32, u32)>) -> Result<Box<dyn VideoDecode>>;

    /// 创建音频解码器，输出为交错 f32，重采样到 `target`
    fn audio_decoder(&self, target: AudioFormat) -> Result<Option<Box<dyn AudioDecode>>>;

    /// 是否支持 seek
    fn is_seekable(&self) -> bool {
        self.media_info().duration > 0.0
    }

    /// 获取描述信息（用于调试）
    fn description(&self) -> String;
}

/// 视频解码器
pub trait VideoDecode: Send {
    /// 送入一个包，最多取出一帧；多出来的帧留到下次调用
    fn decode(&mut self, packet: &EncodedPacket) -> Result<VideoDecodeOutcome>;

    /// 流末尾：取出解码器内缓存的帧，没有时返回 None
    fn drain(&mut self) -> Result<Option<DecodedVideoFrame>>;

    /// 丢弃内部状态（seek 后调用）
    fn flush(&mut self);

    /// 修改输出尺寸，下一帧生效
    fn set_output_size(&mut self, width: u32, height: u32);
}

/// 音频解码器
pub trait AudioDecode: Send {
    /// 解码一个包为交错 f32 采样（可能为空）
    fn decode(&mut self, packet: &EncodedPacket) -> Result<Vec<f32>>;

    /// 丢弃内部状态（seek 后调用）
    fn flush(&mut self);

    /// 输出格式
    fn output_format(&self) -> AudioFormat;
}
