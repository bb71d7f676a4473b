use crate::core::PlaybackState;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// 播放时钟 - 音频主时钟
///
/// 只由音频缓冲完成事件推进（`advance`），不采样墙钟。
/// Seek 时递增 epoch，旧 epoch 下填充的缓冲完成后不再推进时钟。
#[derive(Clone)]
pub struct PlaybackClock {
    inner: Arc<ClockInner>,
}

struct ClockInner {
    elapsed_bits: AtomicU64, // f64 秒
    state: AtomicU8,
    resume_state: AtomicU8, // seek 结束后回到的状态
    epoch: AtomicU64,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ClockInner {
                elapsed_bits: AtomicU64::new(0f64.to_bits()),
                state: AtomicU8::new(PlaybackState::Ready.to_u8()),
                resume_state: AtomicU8::new(PlaybackState::Playing.to_u8()),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// 当前播放时间（秒）
    pub fn now(&self) -> f64 {
        f64::from_bits(self.inner.elapsed_bits.load(Ordering::SeqCst))
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    /// 状态切换；目标状态与当前相同时是 no-op，不合法的切换返回 false
    pub fn transition(&self, next: PlaybackState) -> bool {
        let result = self
            .inner
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
                let current = PlaybackState::from_u8(raw);
                if current == next || current.can_transition_to(next) {
                    Some(next.to_u8())
                } else {
                    None
                }
            });
        result.is_ok()
    }

    /// 开始播放 / 恢复播放
    pub fn play(&self) -> bool {
        if self.state() == PlaybackState::Seeking {
            self.inner
                .resume_state
                .store(PlaybackState::Playing.to_u8(), Ordering::SeqCst);
            return true;
        }
        self.transition(PlaybackState::Playing)
    }

    /// 暂停播放
    pub fn pause(&self) -> bool {
        if self.state() == PlaybackState::Seeking {
            self.inner
                .resume_state
                .store(PlaybackState::Paused.to_u8(), Ordering::SeqCst);
            return true;
        }
        self.transition(PlaybackState::Paused)
    }

    /// 进入 seeking，返回新的 epoch；已停止的会话返回 None
    pub fn begin_seek(&self) -> Option<u64> {
        let previous = self.state();
        if previous == PlaybackState::Stopped {
            return None;
        }
        if previous != PlaybackState::Seeking {
            self.inner
                .resume_state
                .store(previous.to_u8(), Ordering::SeqCst);
        }
        self.inner
            .state
            .store(PlaybackState::Seeking.to_u8(), Ordering::SeqCst);
        Some(self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Seek 后首次解码成功：把时钟定在 `seconds`，回到 seek 前的状态
    pub fn anchor(&self, seconds: f64) -> bool {
        if self.state() != PlaybackState::Seeking {
            return false;
        }
        self.inner
            .elapsed_bits
            .store(seconds.max(0.0).to_bits(), Ordering::SeqCst);
        let resume = self.inner.resume_state.load(Ordering::SeqCst);
        self.inner
            .state
            .compare_exchange(
                PlaybackState::Seeking.to_u8(),
                resume,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// 音频缓冲播放完成后推进时钟
    ///
    /// `epoch` 是填充该缓冲时的 epoch；不匹配说明中间发生过 seek，丢弃。
    pub fn advance(&self, seconds: f64, epoch: u64) -> bool {
        if seconds <= 0.0 || epoch != self.epoch() {
            return false;
        }
        if matches!(
            self.state(),
            PlaybackState::Seeking | PlaybackState::Ready
        ) {
            return false;
        }
        let _ = self
            .inner
            .elapsed_bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                Some((f64::from_bits(bits) + seconds).to_bits())
            });
        true
    }

    /// 没有音频流时由视频时间戳驱动（只前进不后退）
    pub fn follow_video(&self, pts: f64) {
        if self.state() != PlaybackState::Playing {
            return;
        }
        let _ = self
            .inner
            .elapsed_bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                let current = f64::from_bits(bits);
                (pts > current).then(|| pts.to_bits())
            });
    }

    /// 会话结束（终态）
    pub fn stop(&self) {
        self.inner
            .state
            .store(PlaybackState::Stopped.to_u8(), Ordering::SeqCst);
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_only_when_playing() {
        let clock = PlaybackClock::new();
        assert!(!clock.advance(0.5, clock.epoch()));
        assert_eq!(clock.now(), 0.0);

        assert!(clock.play());
        assert!(clock.advance(0.5, clock.epoch()));
        assert!(clock.advance(0.25, clock.epoch()));
        assert!((clock.now() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_stale_epoch_is_ignored() {
        let clock = PlaybackClock::new();
        clock.play();
        let old_epoch = clock.epoch();
        let new_epoch = clock.begin_seek().unwrap();
        assert_ne!(old_epoch, new_epoch);
        assert!(clock.anchor(4.0));
        assert!(!clock.advance(1.0, old_epoch));
        assert_eq!(clock.now(), 4.0);
        assert!(clock.advance(1.0, new_epoch));
        assert_eq!(clock.now(), 5.0);
    }

    #[test]
    fn test_seek_restores_paused_state() {
        let clock = PlaybackClock::new();
        clock.play();
        clock.pause();
        clock.begin_seek();
        assert_eq!(clock.state(), PlaybackState::Seeking);
        assert!(clock.anchor(2.0));
        assert_eq!(clock.state(), PlaybackState::Paused);
        assert!(!clock.anchor(3.0));
    }

    #[test]
    fn test_transition_idempotent() {
        let clock = PlaybackClock::new();
        assert!(clock.play());
        assert!(clock.play());
        assert!(clock.pause());
        assert!(clock.pause());
        clock.stop();
        assert!(!clock.play());
        assert!(clock.begin_seek().is_none());
    }

    #[test]
    fn test_follow_video_is_monotonic() {
        let clock = PlaybackClock::new();
        clock.play();
        clock.follow_video(1.0);
        clock.follow_video(0.5);
        assert_eq!(clock.now(), 1.0);
    }
}
