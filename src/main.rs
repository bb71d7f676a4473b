use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use myy_rtsp_player::core::{PlaybackState, PlayerConfig, SourceLocator};
use myy_rtsp_player::player::{LoggingSink, Player};

/// RTSP / 本地文件无界面播放
#[derive(Parser, Debug)]
#[command(name = "myy_rtsp_player", version, about)]
struct Cli {
    /// rtsp://、http(s):// 地址或本地文件路径
    url: String,

    /// RTSP 使用 TCP 传输（默认 UDP）
    #[arg(long)]
    tcp: bool,

    /// JSON 配置文件
    #[arg(long)]
    config: Option<PathBuf>,

    /// 开始播放前 seek 到的位置（秒）
    #[arg(long)]
    seek: Option<f64>,

    /// 最多显示的帧数
    #[arg(long)]
    max_frames: Option<u64>,

    /// 每隔多少帧打印一次帧信息
    #[arg(long, default_value_t = 30)]
    log_every: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        // cpal 在部分平台上的枚举日志很吵
        .filter_module("cpal", log::LevelFilter::Warn)
        .init();

    let cli = Cli::parse();
    info!("🎬 MYY RTSP Player 启动");

    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("FFmpeg 初始化失败: {}", e))?;
    info!("✅ FFmpeg 初始化成功");

    let config = match &cli.config {
        Some(path) => PlayerConfig::load(path)
            .with_context(|| format!("加载配置失败: {}", path.display()))?,
        None => PlayerConfig::default(),
    };

    let locator = SourceLocator::new(cli.url.clone(), cli.tcp);
    let mut player =
        Player::open(&locator, config).with_context(|| format!("打开媒体失败: {}", cli.url))?;

    info!(
        "📺 {}x{}, 时长 {:.3}s",
        player.source_width(),
        player.source_height(),
        player.duration()
    );

    player.set_frame_sink(Box::new(LoggingSink::new(cli.log_every)));

    if let Err(e) = player.start_audio() {
        warn!("⚠️ 音频输出不可用，仅播放视频: {}", e);
        player.close_audio();
    }

    player.play();

    if let Some(target) = cli.seek {
        if let Err(e) = player.seek_time(target) {
            if !e.is_recoverable() {
                return Err(e).context("seek 失败");
            }
            warn!("忽略 seek 请求: {}", e);
        }
    }

    run(&mut player, &cli);

    let stats = player.stats();
    info!(
        "📊 视频包 {} / 音频包 {}，{:.1} KB/s，读重试 {} 次，坏视频包 {} 个",
        stats.stream.video_packets,
        stats.stream.audio_packets,
        stats.stream.bandwidth() / 1024.0,
        stats.stream.read_retries,
        stats.stream.skipped_video_packets
    );
    info!(
        "🔊 已播放音频缓冲 {} 个，欠载 {} 次，坏音频包 {} 个，过旧音频包 {} 个",
        stats.buffers_played,
        stats.audio_underruns,
        stats.skipped_audio_packets,
        stats.stale_audio_packets
    );

    player.close();
    info!("👋 退出，最终时间 {:.3}s", player.current_time());
    Ok(())
}

/// 按帧率驱动 `step_frame`，流结束后等音频放完
fn run(player: &mut Player, cli: &Cli) {
    let fps = player.media_info().fps();
    let interval = Duration::from_secs_f64(if fps > 0.0 { 1.0 / fps } else { 1.0 / 30.0 });

    let mut frames = 0u64;
    while player.step_frame() {
        frames += 1;
        if cli.max_frames.is_some_and(|max| frames >= max) {
            info!("已达到最大帧数 {}", frames);
            return;
        }
        thread::sleep(interval);
    }

    while player.state() != PlaybackState::Stopped {
        player.pump_audio();
        thread::sleep(interval);
    }
}
