//! # Smoothing Buffer
//!
//! Sits between the marker scanner and the transcript. Small network chunks
//! are held back briefly so the visible text grows in readable bursts rather
//! than a few characters at a time.
//!
//! ## Policy
//! On every [`SmoothingBuffer::append`] the outstanding flush is cancelled,
//! then:
//! - pending text of at least `threshold` characters, or ending in `.`, `?`,
//!   `!` or whitespace, is flushed immediately;
//! - otherwise one delayed flush is scheduled `delay` from now.
//!
//! Worst-case latency for any appended character is one `delay` interval.
//!
//! ## Timer model
//! The buffer never spawns anything. It records at most one
//! [`ScheduledFlush`]; the owner waits on [`SmoothingBuffer::deadline`] and
//! calls [`SmoothingBuffer::on_timer`] when it elapses. Rescheduling always
//! replaces the previous handle, so two flushes can never race.

use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_DELAY: Duration = Duration::from_millis(50);
pub const DEFAULT_THRESHOLD: usize = 10;

/// Receives batches of visible text.
pub trait FlushSink {
    fn flush(&mut self, text: &str);
}

impl<F: FnMut(&str)> FlushSink for F {
    fn flush(&mut self, text: &str) {
        self(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmoothingPolicy {
    pub delay: Duration,
    pub threshold: usize,
}

impl Default for SmoothingPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// The single outstanding delayed flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledFlush {
    pub deadline: Instant,
}

fn is_natural_break(c: char) -> bool {
    matches!(c, '.' | '?' | '!') || c.is_whitespace()
}

pub struct SmoothingBuffer<S: FlushSink> {
    pending: String,
    scheduled: Option<ScheduledFlush>,
    policy: SmoothingPolicy,
    sink: S,
}

impl<S: FlushSink> SmoothingBuffer<S> {
    pub fn new(policy: SmoothingPolicy, sink: S) -> Self {
        Self {
            pending: String::new(),
            scheduled: None,
            policy,
            sink,
        }
    }

    pub fn append(&mut self, text: &str) {
        self.cancel();
        self.pending.push_str(text);

        let long_enough = self.pending.chars().count() >= self.policy.threshold;
        let at_break = self.pending.chars().last().is_some_and(is_natural_break);
        if long_enough || at_break {
            self.flush();
        } else {
            self.scheduled = Some(ScheduledFlush {
                deadline: Instant::now() + self.policy.delay,
            });
        }
    }

    /// Cancel the outstanding flush and flush unconditionally.
    pub fn flush_now(&mut self) {
        self.cancel();
        self.flush();
    }

    /// Fire the scheduled flush if its deadline has passed.
    pub fn on_timer(&mut self) {
        match self.scheduled {
            Some(s) if s.deadline <= Instant::now() => {
                self.scheduled = None;
                self.flush();
            }
            _ => {}
        }
    }

    /// Wait for the outstanding flush, if any, and fire it.
    pub async fn run_timer(&mut self) {
        if let Some(s) = self.scheduled {
            tokio::time::sleep_until(s.deadline).await;
            self.on_timer();
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.scheduled.map(|s| s.deadline)
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn cancel(&mut self) {
        self.scheduled = None;
    }

    // Whitespace-only text stays pending: no empty renders.
    fn flush(&mut self) {
        if self.pending.trim().is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.pending);
        self.sink.flush(&text);
    }
}

/// Resolve at `deadline`, or never when there is none.
pub async fn elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Default)]
    struct Batches(Vec<String>);

    impl FlushSink for Batches {
        fn flush(&mut self, text: &str) {
            self.0.push(text.to_string());
        }
    }

    fn recording_buffer() -> SmoothingBuffer<Batches> {
        SmoothingBuffer::new(SmoothingPolicy::default(), Batches::default())
    }

    #[rstest]
    #[case::period("Hi.")]
    #[case::question("Why?")]
    #[case::bang("Go!")]
    #[case::space("Hello ")]
    #[case::newline("x\n")]
    #[case::long("abcdefghij")]
    fn test_immediate_flush(#[case] text: &str) {
        let mut b = recording_buffer();
        b.append(text);
        assert_eq!(b.sink_mut().0.as_slice(), [text.to_string()]);
        assert!(b.deadline().is_none());
        assert_eq!(b.pending(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_text_waits_for_delay() {
        let mut b = recording_buffer();
        b.append("abc");
        assert!(b.sink_mut().0.is_empty());
        assert!(b.deadline().is_some());
        b.run_timer().await;
        assert_eq!(b.sink_mut().0.as_slice(), ["abc".to_string()]);
        assert!(b.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_of_short_appends_flushes_once() {
        let mut b = recording_buffer();
        b.append("ab");
        tokio::time::advance(Duration::from_millis(20)).await;
        b.on_timer();
        b.append("cd");
        tokio::time::advance(Duration::from_millis(20)).await;
        b.on_timer();
        b.append("ef");
        assert!(b.sink_mut().0.is_empty());

        // 40ms after the last append: still waiting.
        tokio::time::advance(Duration::from_millis(40)).await;
        b.on_timer();
        assert!(b.sink_mut().0.is_empty());

        tokio::time::advance(Duration::from_millis(10)).await;
        b.on_timer();
        assert_eq!(b.sink_mut().0.as_slice(), ["abcdef".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_append_reschedules_single_timer() {
        let mut b = recording_buffer();
        b.append("a");
        let first = b.deadline().unwrap();
        tokio::time::advance(Duration::from_millis(30)).await;
        b.append("b");
        let second = b.deadline().unwrap();
        assert!(second > first);
        assert_eq!(second - first, Duration::from_millis(30));
    }

    #[test]
    fn test_accumulates_until_threshold() {
        let mut b = recording_buffer();
        for piece in ["ab", "cd", "ef", "gh"] {
            b.append(piece);
        }
        assert!(b.sink_mut().0.is_empty());
        b.append("ij");
        assert_eq!(b.sink_mut().0.as_slice(), ["abcdefghij".to_string()]);
    }

    #[test]
    fn test_threshold_counts_chars_not_bytes() {
        let mut b = recording_buffer();
        b.append("ééééé");
        assert!(b.sink_mut().0.is_empty());
        b.append("ééééé");
        assert_eq!(b.sink_mut().0.len(), 1);
    }

    #[test]
    fn test_flush_now_twice_is_noop_second_time() {
        let mut b = recording_buffer();
        b.append("abc");
        b.flush_now();
        b.flush_now();
        assert_eq!(b.sink_mut().0.as_slice(), ["abc".to_string()]);
        assert!(b.deadline().is_none());
    }

    #[test]
    fn test_flush_now_on_empty_buffer_does_nothing() {
        let mut b = recording_buffer();
        b.flush_now();
        assert!(b.sink_mut().0.is_empty());
    }

    #[test]
    fn test_whitespace_only_is_never_flushed() {
        let mut b = recording_buffer();
        b.append("\n");
        b.append("  ");
        b.flush_now();
        assert!(b.sink_mut().0.is_empty());
        assert_eq!(b.pending(), "\n  ");
        b.append("x.");
        assert_eq!(b.sink_mut().0.as_slice(), ["\n  x.".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_timer_before_deadline_does_nothing() {
        let mut b = recording_buffer();
        b.append("a");
        b.on_timer();
        assert!(b.sink_mut().0.is_empty());
        assert!(b.deadline().is_some());
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = String::new();
        {
            let mut b = SmoothingBuffer::new(SmoothingPolicy::default(), |t: &str| seen.push_str(t));
            b.append("Hello ");
            b.append("wor");
            b.flush_now();
        }
        assert_eq!(seen, "Hello wor");
    }

    #[test]
    fn test_elapsed_without_deadline_stays_pending() {
        let mut fut = tokio_test::task::spawn(elapsed(None));
        tokio_test::assert_pending!(fut.poll());
        tokio_test::assert_pending!(fut.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_with_deadline_resolves_after_it() {
        let deadline = Instant::now() + Duration::from_millis(50);
        let mut fut = tokio_test::task::spawn(elapsed(Some(deadline)));
        tokio_test::assert_pending!(fut.poll());
        tokio::time::advance(Duration::from_millis(50)).await;
        tokio_test::assert_ready!(fut.poll());
    }
}
