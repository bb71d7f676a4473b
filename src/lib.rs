//! RTSP / 本地文件播放核心：解封装、解码、音频包队列与音频主时钟

pub mod core;
pub mod player;
