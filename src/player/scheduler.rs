use crate::core::{AudioFormat, EncodedPacket, PlaybackClock, PlaybackState, PlayerConfig};
use crate::player::demuxer_source::AudioDecode;
use crate::player::packet_queue::AudioPacketQueue;
use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 解码侧发给音频回调的命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCommand {
    /// seek 后丢弃解码器状态和未提交的 PCM
    Flush,
}

/// 输出槽状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Filled,
    InFlight,
}

/// 输出缓冲槽
#[derive(Debug)]
pub struct AudioOutputBuffer {
    samples: Vec<f32>,
    state: SlotState,
    audio_samples: usize, // 0 表示静音填充
    epoch: u64,
}

impl AudioOutputBuffer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            state: SlotState::Free,
            audio_samples: 0,
            epoch: 0,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn is_silence(&self) -> bool {
        self.audio_samples == 0
    }
}

/// 音频回调统计（跨线程读取）
#[derive(Debug, Default)]
pub struct AudioStats {
    underruns: AtomicU64,
    skipped_packets: AtomicU64,
    stale_packets: AtomicU64,
    buffers_played: AtomicU64,
}

impl AudioStats {
    /// 欠载次数（按连续欠载段计）
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// 解码失败被跳过的包
    pub fn skipped_packets(&self) -> u64 {
        self.skipped_packets.load(Ordering::Relaxed)
    }

    /// seek 后因过旧被丢弃的包
    pub fn stale_packets(&self) -> u64 {
        self.stale_packets.load(Ordering::Relaxed)
    }

    /// 已播放完的有声缓冲数
    pub fn buffers_played(&self) -> u64 {
        self.buffers_played.load(Ordering::Relaxed)
    }
}

/// 音频输出调度器
///
/// 持有 N 个输出槽，运行在硬件回调线程上：每当一个槽播放完，
/// `on_buffer_complete` 按时钟推进、从包队列即时解码（lazy decode）并重新提交。
/// 队列为空时提交静音，绝不阻塞回调。
pub struct AudioScheduler {
    slots: Vec<AudioOutputBuffer>,
    submitted: VecDeque<usize>, // 提交顺序 = 播放顺序
    queue: Arc<AudioPacketQueue>,
    decoder: Box<dyn AudioDecode>,
    clock: PlaybackClock,
    commands: Receiver<AudioCommand>,
    stats: Arc<AudioStats>,
    format: AudioFormat,
    carry: Vec<f32>, // 已解码但还没放进槽的采样
    deferred: Option<EncodedPacket>, // 填槽途中发现队列已被清空时取到的新包
    generation: u64, // 最近一次同步的队列清空代数
    capacity_samples: usize,
    silence_samples: usize,
    stale_tolerance: f64,
    underrun: bool,
    finished: bool,
}

impl AudioScheduler {
    pub fn new(
        queue: Arc<AudioPacketQueue>,
        decoder: Box<dyn AudioDecode>,
        clock: PlaybackClock,
        commands: Receiver<AudioCommand>,
        stats: Arc<AudioStats>,
        config: &PlayerConfig,
    ) -> Self {
        let format = decoder.output_format();
        let capacity_samples = format.samples_for_frames(config.output_buffer_frames);
        let slots = (0..config.output_buffer_count)
            .map(|_| AudioOutputBuffer::with_capacity(capacity_samples))
            .collect();

        info!(
            "{} 🔊 音频调度器: {} 个槽 × {} 帧, {} Hz / {} 声道",
            log_ctx(),
            config.output_buffer_count,
            config.output_buffer_frames,
            format.sample_rate,
            format.channels
        );

        let generation = queue.generation();
        Self {
            slots,
            submitted: VecDeque::new(),
            queue,
            decoder,
            clock,
            commands,
            stats,
            format,
            carry: Vec::new(),
            deferred: None,
            generation,
            capacity_samples,
            silence_samples: format.samples_for_frames(config.silence_frames),
            stale_tolerance: config.stale_audio_tolerance_secs,
            underrun: false,
            finished: false,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn slot(&self, index: usize) -> &AudioOutputBuffer {
        &self.slots[index]
    }

    /// 当前正在播放（最早提交）的槽
    pub fn next_in_flight(&self) -> Option<usize> {
        self.submitted.front().copied()
    }

    pub fn in_flight_count(&self) -> usize {
        self.submitted.len()
    }

    /// 所有音频都已播放完
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 每次硬件回调开始时调用：处理命令，并在播放/seek 状态下把空闲槽填满提交
    pub fn poll(&mut self) {
        self.drain_commands();
        if self.finished {
            return;
        }
        let free: Vec<usize> = (0..self.slots.len())
            .filter(|&i| self.slots[i].state == SlotState::Free)
            .collect();
        for index in free {
            self.refill(index);
        }
    }

    /// 硬件播放完一个槽
    pub fn on_buffer_complete(&mut self, index: usize) {
        if index >= self.slots.len() {
            warn!("{} 未知的音频槽: {}", log_ctx(), index);
            return;
        }
        if let Some(pos) = self.submitted.iter().position(|&i| i == index) {
            self.submitted.remove(pos);
        }

        let slot = &mut self.slots[index];
        if slot.state == SlotState::InFlight && slot.audio_samples > 0 {
            let seconds = self.format.duration_of(slot.audio_samples);
            if self.clock.advance(seconds, slot.epoch) {
                self.stats.buffers_played.fetch_add(1, Ordering::Relaxed);
            }
        }
        slot.state = SlotState::Free;
        slot.audio_samples = 0;

        self.drain_commands();
        self.refill(index);
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                AudioCommand::Flush => {
                    debug!("{} 🧹 音频解码器 flush", log_ctx());
                    self.reset_decode_state();
                }
            }
        }
    }

    fn reset_decode_state(&mut self) {
        self.decoder.flush();
        self.carry.clear();
        self.deferred = None;
        self.underrun = false;
        self.finished = false;
    }

    /// 队列被清空过（seek / 关闭音频）：丢弃清空前解码出的一切
    ///
    /// 引擎先发 Flush 再清空队列，所以这里能看到新代数时 Flush 已在通道里。
    fn sync_generation(&mut self, generation: u64) {
        if generation == self.generation {
            return;
        }
        self.drain_commands();
        self.reset_decode_state();
        self.generation = generation;
    }

    /// 按当前状态重新填充一个空闲槽
    fn refill(&mut self, index: usize) {
        // 先读 epoch 再读状态：读到新 epoch 时一定能看到 seeking
        let epoch = self.clock.epoch();
        match self.clock.state() {
            PlaybackState::Playing => {
                if self.fill_audio(index, epoch) {
                    self.submit(index);
                } else if self.has_no_pending_audio() {
                    self.check_finished();
                } else {
                    self.note_underrun();
                    self.fill_silence(index, epoch);
                    self.submit(index);
                }
            }
            PlaybackState::Seeking => {
                if self.has_no_pending_audio() {
                    // seek 之后流直接结束了
                    self.check_finished();
                    return;
                }
                // seek 期间用静音维持硬件运转
                self.fill_silence(index, epoch);
                self.submit(index);
            }
            // 暂停/未开始/已停止：不再提交
            PlaybackState::Paused | PlaybackState::Ready | PlaybackState::Stopped => {}
        }
    }

    /// 从 carry 和包队列即时解码填满槽；没有任何音频时返回 false
    fn fill_audio(&mut self, index: usize, epoch: u64) -> bool {
        let capacity = self.capacity_samples;
        self.sync_generation(self.queue.generation());
        let mut buffer = std::mem::take(&mut self.slots[index].samples);
        buffer.clear();

        let take = self.carry.len().min(capacity);
        buffer.extend(self.carry.drain(..take));

        while buffer.len() < capacity {
            let packet = match self.deferred.take() {
                Some(packet) => packet,
                None => match self.queue.dequeue_tagged() {
                    Some((generation, packet)) if generation != self.generation => {
                        // 填槽途中队列被清空：丢掉清空前的音频，新包留给下一个槽
                        buffer.clear();
                        self.sync_generation(generation);
                        self.deferred = Some(packet);
                        break;
                    }
                    Some((_, packet)) => packet,
                    None => break,
                },
            };
            if self.clock.epoch() != epoch {
                // 填槽途中开始了 seek：槽作废，包留到下次；
                // 若它属于 seek 之前，下次同步清空代数时会被丢掉
                buffer.clear();
                self.deferred = Some(packet);
                break;
            }
            if self.is_stale(&packet) {
                self.stats.stale_packets.fetch_add(1, Ordering::Relaxed);
                debug!("{} 丢弃过旧的音频包: pts={:?}", log_ctx(), packet.pts);
                continue;
            }
            match self.decoder.decode(&packet) {
                Ok(pcm) => {
                    let room = capacity - buffer.len();
                    if pcm.len() > room {
                        buffer.extend_from_slice(&pcm[..room]);
                        self.carry.extend_from_slice(&pcm[room..]);
                    } else {
                        buffer.extend_from_slice(&pcm);
                    }
                }
                Err(e) => {
                    // 单个坏包不能卡住播放
                    self.stats.skipped_packets.fetch_add(1, Ordering::Relaxed);
                    warn!("{} ⚠️ 跳过无法解码的音频包 pts={:?}: {}", log_ctx(), packet.pts, e);
                }
            }
        }

        let slot = &mut self.slots[index];
        slot.audio_samples = buffer.len();
        slot.samples = buffer;
        slot.epoch = epoch;
        if slot.audio_samples == 0 {
            return false;
        }
        slot.state = SlotState::Filled;
        if self.underrun {
            debug!("{} 音频欠载结束", log_ctx());
            self.underrun = false;
        }
        true
    }

    fn has_no_pending_audio(&self) -> bool {
        self.carry.is_empty() && self.deferred.is_none() && self.queue.is_drained()
    }

    fn fill_silence(&mut self, index: usize, epoch: u64) {
        let silence = self.silence_samples;
        let slot = &mut self.slots[index];
        slot.samples.clear();
        slot.samples.resize(silence, 0.0);
        slot.audio_samples = 0;
        slot.epoch = epoch;
        slot.state = SlotState::Filled;
    }

    fn submit(&mut self, index: usize) {
        self.slots[index].state = SlotState::InFlight;
        self.submitted.push_back(index);
    }

    fn is_stale(&self, packet: &EncodedPacket) -> bool {
        match packet.pts {
            Some(pts) => pts + packet.duration < self.clock.now() - self.stale_tolerance,
            None => false,
        }
    }

    fn note_underrun(&mut self) {
        if !self.underrun {
            self.underrun = true;
            self.stats.underruns.fetch_add(1, Ordering::Relaxed);
            debug!("{} 音频欠载，提交静音", log_ctx());
        }
    }

    /// 流结束且所有槽播放完：会话停止
    fn check_finished(&mut self) {
        if self.submitted.is_empty() && !self.finished {
            self.finished = true;
            self.clock.stop();
            info!(
                "{} 📄 音频播放完毕，时钟停在 {:.3}s",
                log_ctx(),
                self.clock.now()
            );
        }
    }
}
