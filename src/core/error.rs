use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    /// 地址错误、源不可达或容器不支持，不重试
    #[error("无法打开媒体源: {0}")]
    OpenFailed(String),

    #[error("无法找到视频流")]
    NoVideoStream,

    /// 重试次数用尽后的读包失败
    #[error("读包失败: {0}")]
    ReadFailed(String),

    /// 单个包解码失败，调用方跳过该包继续
    #[error("解码错误: {0}")]
    DecodeFailed(String),

    /// 背压信号，不是真正的错误
    #[error("音频包队列已满: 需要 {needed} 字节, 剩余 {available} 字节")]
    QueueFull { needed: usize, available: usize },

    #[error("Seek 失败: {0}")]
    SeekFailed(String),

    #[error("音频输出错误: {0}")]
    AudioError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),
}

impl PlayerError {
    /// 是否为可以继续播放的错误
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PlayerError::DecodeFailed(_) | PlayerError::QueueFull { .. } | PlayerError::SeekFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
