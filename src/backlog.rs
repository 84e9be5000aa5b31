//! Backlog of recent chat lines
//!
//! A bounded FIFO replayed to each client right after it logs in.

use std::collections::VecDeque;

use crate::message::ChatLine;

/// Number of chat lines kept for replay
pub const DEFAULT_BACKLOG_CAPACITY: usize = 10;

/// Bounded FIFO of the most recent chat lines, oldest first
#[derive(Debug)]
pub struct Backlog {
    lines: VecDeque<ChatLine>,
    capacity: usize,
}

impl Backlog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line, evicting the oldest ones beyond capacity
    pub fn record(&mut self, line: ChatLine) {
        if self.capacity == 0 {
            return;
        }
        while self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Lines in arrival order
    pub fn iter(&self) -> impl Iterator<Item = &ChatLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for Backlog {
    fn default() -> Self {
        Self::new(DEFAULT_BACKLOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> ChatLine {
        ChatLine {
            text: format!("message {}", n),
            name: "alice".to_string(),
        }
    }

    #[test]
    fn test_backlog_keeps_last_ten_in_order() {
        let mut backlog = Backlog::default();
        for n in 0..15 {
            backlog.record(line(n));
        }

        assert_eq!(backlog.len(), 10);
        let texts: Vec<_> = backlog.iter().map(|l| l.text.clone()).collect();
        let expected: Vec<_> = (5..15).map(|n| format!("message {}", n)).collect();
        assert_eq!(texts, expected);
    }

    #[test]
    fn test_backlog_below_capacity() {
        let mut backlog = Backlog::new(3);
        assert!(backlog.is_empty());
        backlog.record(line(1));
        backlog.record(line(2));
        assert_eq!(backlog.iter().cloned().collect::<Vec<_>>(), vec![line(1), line(2)]);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut backlog = Backlog::new(0);
        backlog.record(line(1));
        assert!(backlog.is_empty());
    }
}
