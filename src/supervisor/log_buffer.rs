//! Bounded FIFO of cleaned frpc output lines.
//!
//! The collector is the only producer; `drain` is the only consumer and takes
//! every queued line in one critical section, so insertion order is preserved
//! and no line is returned twice. When full, the oldest line is dropped.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Default maximum number of lines kept between two drains.
/// Can be overridden via `log_buffer_size` in config/global.toml.
pub const DEFAULT_LOG_BUFFER: usize = 10_000;

#[derive(Debug, Default)]
struct Lines {
    queue: VecDeque<String>,
    dropped: u64,
}

#[derive(Debug)]
pub struct LogBuffer {
    inner: Mutex<Lines>,
    max_size: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_BUFFER)
    }
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zero capacity is bumped to one so the latest line is always kept.
    pub fn with_capacity(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            inner: Mutex::new(Lines {
                queue: VecDeque::with_capacity(max_size.min(1024)),
                dropped: 0,
            }),
            max_size,
        }
    }

    /// Mutex 락 획득 헬퍼 — poison 상태여도 버퍼 내용은 유효하므로 복구해서 사용
    fn lock(&self) -> MutexGuard<'_, Lines> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::error!("LogBuffer lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn push(&self, line: String) {
        let mut lines = self.lock();
        if lines.queue.len() >= self.max_size {
            lines.queue.pop_front();
            lines.dropped += 1;
        }
        lines.queue.push_back(line);
    }

    /// Remove and return every queued line, oldest first.
    pub fn drain(&self) -> Vec<String> {
        let mut lines = self.lock();
        lines.queue.drain(..).collect()
    }

    /// Drain into a single text block, one `\n`-terminated line each.
    pub fn drain_text(&self) -> String {
        let lines = self.drain();
        let mut text = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            text.push_str(&line);
            text.push('\n');
        }
        text
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lines evicted by the drop-oldest policy since creation.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn drain_returns_lines_in_order() {
        let buffer = LogBuffer::new();
        buffer.push("line 0".into());
        buffer.push("line 1".into());
        buffer.push("line 2".into());

        assert_eq!(buffer.drain(), vec!["line 0", "line 1", "line 2"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn drain_text_is_strictly_consuming() {
        let buffer = LogBuffer::new();
        buffer.push("start proxy success".into());
        buffer.push("login to server success".into());

        assert_eq!(
            buffer.drain_text(),
            "start proxy success\nlogin to server success\n"
        );
        // 새 출력이 없으면 두 번째 drain은 비어 있어야 함
        assert_eq!(buffer.drain_text(), "");
    }

    #[test]
    fn empty_lines_are_kept() {
        let buffer = LogBuffer::new();
        buffer.push(String::new());
        assert_eq!(buffer.drain_text(), "\n");
    }

    #[test]
    fn ring_drops_oldest() {
        let buffer = LogBuffer::with_capacity(3);
        for i in 0..5 {
            buffer.push(format!("line {}", i));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.dropped(), 2);
        assert_eq!(buffer.drain(), vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn zero_capacity_keeps_latest_line() {
        let buffer = LogBuffer::with_capacity(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.push("a".into());
        buffer.push("b".into());
        assert_eq!(buffer.drain(), vec!["b"]);
    }

    #[test]
    fn concurrent_producer_and_consumer_lose_nothing() {
        let buffer = Arc::new(LogBuffer::with_capacity(100_000));
        let producer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                for i in 0..10_000 {
                    buffer.push(format!("{}", i));
                }
            })
        };

        let mut seen = Vec::new();
        while !producer.is_finished() {
            seen.extend(buffer.drain());
        }
        producer.join().unwrap();
        seen.extend(buffer.drain());

        let expected: Vec<String> = (0..10_000).map(|i| i.to_string()).collect();
        assert_eq!(seen, expected);
    }
}
