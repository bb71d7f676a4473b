use crate::core::DecodedVideoFrame;
use log::info;

/// 显示端：每次 `step_frame` 产生新帧时被推送一次
///
/// 实现不能在调用结束后继续持有位图，需要的话自行拷贝。
pub trait FrameSink {
    fn push_frame(&mut self, frame: &DecodedVideoFrame);
}

/// 只打日志的显示端（无界面模式）
pub struct LoggingSink {
    every: u64,
    frames: u64,
}

impl LoggingSink {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            frames: 0,
        }
    }
}

impl FrameSink for LoggingSink {
    fn push_frame(&mut self, frame: &DecodedVideoFrame) {
        self.frames += 1;
        if self.frames == 1 || self.frames % self.every == 0 {
            info!(
                "🖼 帧 #{} pts={:.3}s {}x{} ({} 字节)",
                self.frames,
                frame.pts,
                frame.width,
                frame.height,
                frame.data.len()
            );
        }
    }
}
