use crate::core::{EncodedPacket, PlayerError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// 音频包队列 - 解封装线程与音频回调之间唯一共享的可变结构
///
/// 有字节预算：超出时 `enqueue` 立即返回 `QueueFull`（背压），
/// `dequeue` 为空时返回 None，不阻塞音频回调。
/// 锁内只做追加/移除，不做解码。
pub struct AudioPacketQueue {
    inner: Mutex<QueueInner>,
    budget: usize,
}

struct QueueInner {
    packets: VecDeque<EncodedPacket>,
    bytes: usize,
    finished: bool, // 上游已到流末尾
    generation: u64,
}

impl AudioPacketQueue {
    pub fn new(budget: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                packets: VecDeque::new(),
                bytes: 0,
                finished: false,
                generation: 0,
            }),
            budget,
        }
    }

    /// 追加到队尾；超出预算时包原样退回，队列不变
    pub fn enqueue(&self, packet: EncodedPacket) -> std::result::Result<(), (EncodedPacket, PlayerError)> {
        let mut inner = self.inner.lock();
        let size = packet.size();
        let available = self.budget.saturating_sub(inner.bytes);
        if size > available {
            return Err((
                packet,
                PlayerError::QueueFull {
                    needed: size,
                    available,
                },
            ));
        }
        inner.bytes += size;
        inner.finished = false;
        inner.packets.push_back(packet);
        Ok(())
    }

    /// `enqueue` 的简化版本，丢弃退回的包
    pub fn try_enqueue(&self, packet: EncodedPacket) -> Result<()> {
        self.enqueue(packet).map_err(|(_, e)| e)
    }

    /// 取出队头
    pub fn dequeue(&self) -> Option<EncodedPacket> {
        self.dequeue_tagged().map(|(_, packet)| packet)
    }

    /// 取出队头，连同入队时所在的清空代数
    pub fn dequeue_tagged(&self) -> Option<(u64, EncodedPacket)> {
        let mut inner = self.inner.lock();
        let packet = inner.packets.pop_front()?;
        inner.bytes -= packet.size();
        Some((inner.generation, packet))
    }

    /// 清空（seek / stop 时使用）
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.packets.clear();
        inner.bytes = 0;
        inner.finished = false;
        inner.generation += 1;
    }

    /// 标记上游已读到流末尾
    pub fn mark_finished(&self) {
        self.inner.lock().finished = true;
    }

    /// 流已结束且队列已空
    pub fn is_drained(&self) -> bool {
        let inner = self.inner.lock();
        inner.finished && inner.packets.is_empty()
    }

    /// 当前占用字节数
    pub fn size(&self) -> usize {
        self.inner.lock().bytes
    }

    pub fn len(&self) -> usize {
        self.inner.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().packets.is_empty()
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// 清空次数；每次 `clear` 加一
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StreamKind;
    use std::sync::Arc;
    use std::thread;

    fn packet(size: usize, pts: f64) -> EncodedPacket {
        EncodedPacket {
            kind: StreamKind::Audio,
            stream_index: 1,
            pts: Some(pts),
            duration: 0.02,
            is_keyframe: true,
            raw_pts: None,
            raw_dts: None,
            data: vec![0u8; size],
        }
    }

    #[test]
    fn test_fifo_order_and_size() {
        let queue = AudioPacketQueue::new(1000);
        queue.try_enqueue(packet(100, 0.0)).unwrap();
        queue.try_enqueue(packet(200, 0.1)).unwrap();
        assert_eq!(queue.size(), 300);
        assert_eq!(queue.dequeue().unwrap().pts, Some(0.0));
        assert_eq!(queue.size(), 200);
        assert_eq!(queue.dequeue().unwrap().pts, Some(0.1));
        assert_eq!(queue.size(), 0);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_over_budget_is_rejected_without_change() {
        let queue = AudioPacketQueue::new(250);
        queue.try_enqueue(packet(200, 0.0)).unwrap();
        let (returned, err) = queue.enqueue(packet(100, 0.1)).unwrap_err();
        assert!(matches!(err, PlayerError::QueueFull { needed: 100, available: 50 }));
        assert_eq!(returned.pts, Some(0.1));
        assert_eq!(queue.size(), 200);
        assert_eq!(queue.len(), 1);

        // 再次失败结果相同
        assert!(queue.try_enqueue(packet(100, 0.1)).is_err());
        assert_eq!(queue.size(), 200);
    }

    #[test]
    fn test_clear_then_empty() {
        let queue = AudioPacketQueue::new(1000);
        queue.try_enqueue(packet(10, 0.0)).unwrap();
        queue.try_enqueue(packet(10, 0.1)).unwrap();
        queue.clear();
        assert_eq!(queue.size(), 0);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_packets_tagged_with_clear_generation() {
        let queue = AudioPacketQueue::new(1000);
        queue.try_enqueue(packet(10, 0.0)).unwrap();
        assert_eq!(queue.dequeue_tagged().unwrap().0, 0);
        queue.clear();
        queue.try_enqueue(packet(10, 4.0)).unwrap();
        let (generation, packet) = queue.dequeue_tagged().unwrap();
        assert_eq!(generation, 1);
        assert_eq!(generation, queue.generation());
        assert_eq!(packet.pts, Some(4.0));
    }

    #[test]
    fn test_finished_flag() {
        let queue = AudioPacketQueue::new(1000);
        queue.try_enqueue(packet(10, 0.0)).unwrap();
        queue.mark_finished();
        assert!(!queue.is_drained());
        queue.dequeue();
        assert!(queue.is_drained());
        queue.clear();
        assert!(!queue.is_drained());
    }

    #[test]
    fn test_concurrent_size_never_drifts() {
        let queue = Arc::new(AudioPacketQueue::new(4096));
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut sent = 0;
                while sent < 2000 {
                    if queue.try_enqueue(packet(7, sent as f64)).is_ok() {
                        sent += 1;
                    }
                    if sent % 500 == 0 {
                        queue.clear();
                    }
                }
            })
        };
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for _ in 0..5000 {
                    queue.dequeue();
                }
            })
        };
        producer.join().unwrap();
        consumer.join().unwrap();
        assert_eq!(queue.size(), queue.len() * 7);
    }
}
