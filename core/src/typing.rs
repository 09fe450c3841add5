//! Client-side typing indicator debouncing
//!
//! The server keeps no typing timeout; clients announce `typing_start` on the
//! first keystroke and `typing_stop` once input has been idle for
//! [`TYPING_IDLE`], or right away when the message is sent.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::protocol::ClientEvent;

pub const TYPING_IDLE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

/// Pure state machine behind [`TypingIndicator`].
#[derive(Debug, Clone)]
pub struct TypingDebouncer {
    idle: Duration,
    last_input: Option<Instant>,
}

impl TypingDebouncer {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            last_input: None,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.last_input.is_some()
    }

    /// Record a keystroke. Returns `Start` only for the first one of a burst.
    pub fn keystroke(&mut self, now: Instant) -> Option<TypingSignal> {
        let started = self.last_input.is_none();
        self.last_input = Some(now);
        started.then_some(TypingSignal::Start)
    }

    /// Returns `Stop` once the idle interval has elapsed since the last keystroke.
    pub fn poll(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.last_input {
            Some(last) if now.duration_since(last) >= self.idle => {
                self.last_input = None;
                Some(TypingSignal::Stop)
            }
            _ => None,
        }
    }

    /// Stop immediately, e.g. because the message was sent.
    pub fn flush(&mut self) -> Option<TypingSignal> {
        self.last_input.take().map(|_| TypingSignal::Stop)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.last_input.map(|last| last + self.idle)
    }
}

impl Default for TypingDebouncer {
    fn default() -> Self {
        Self::new(TYPING_IDLE)
    }
}

enum TypingInput {
    Keystroke,
    Flush,
}

/// Background task that turns keystrokes in one chat into start/stop events.
///
/// Dropping the indicator flushes a pending stop.
pub struct TypingIndicator {
    input: mpsc::UnboundedSender<TypingInput>,
    task: JoinHandle<()>,
}

impl TypingIndicator {
    pub(crate) fn spawn(
        chat_id: String,
        user_id: String,
        idle: Duration,
        outgoing: mpsc::UnboundedSender<ClientEvent>,
    ) -> Self {
        let (input, mut rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut debouncer = TypingDebouncer::new(idle);
            let emit = |signal: TypingSignal| {
                let event = match signal {
                    TypingSignal::Start => ClientEvent::TypingStart {
                        chat_id: chat_id.clone(),
                        user_id: user_id.clone(),
                    },
                    TypingSignal::Stop => ClientEvent::TypingStop {
                        chat_id: chat_id.clone(),
                        user_id: user_id.clone(),
                    },
                };
                if outgoing.send(event).is_err() {
                    log::debug!("typing event dropped, connection closed");
                }
            };

            loop {
                let deadline = debouncer.deadline();
                tokio::select! {
                    input = rx.recv() => match input {
                        Some(TypingInput::Keystroke) => {
                            if let Some(signal) = debouncer.keystroke(Instant::now()) {
                                emit(signal);
                            }
                        }
                        Some(TypingInput::Flush) => {
                            if let Some(signal) = debouncer.flush() {
                                emit(signal);
                            }
                        }
                        None => {
                            if let Some(signal) = debouncer.flush() {
                                emit(signal);
                            }
                            break;
                        }
                    },
                    _ = sleep_until(deadline.unwrap_or_else(Instant::now)),
                        if deadline.is_some() =>
                    {
                        if let Some(signal) = debouncer.poll(Instant::now()) {
                            emit(signal);
                        }
                    }
                }
            }
        });

        Self { input, task }
    }

    pub fn keystroke(&self) {
        let _ = self.input.send(TypingInput::Keystroke);
    }

    pub fn flush(&self) {
        let _ = self.input.send(TypingInput::Flush);
    }

    /// Flushes and waits for the background task to finish.
    pub async fn close(self) {
        let Self { input, task } = self;
        drop(input);
        let _ = task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debouncer_burst() {
        let t0 = Instant::now();
        let mut d = TypingDebouncer::default();

        assert_eq!(d.keystroke(t0), Some(TypingSignal::Start));
        assert_eq!(d.keystroke(t0 + Duration::from_secs(1)), None);
        assert_eq!(d.poll(t0 + Duration::from_secs(3)), None);
        assert_eq!(d.deadline(), Some(t0 + Duration::from_secs(4)));
        assert_eq!(d.poll(t0 + Duration::from_secs(4)), Some(TypingSignal::Stop));
        assert_eq!(d.poll(t0 + Duration::from_secs(9)), None);
        assert!(!d.is_typing());
    }

    #[test]
    fn test_flush_only_when_typing() {
        let mut d = TypingDebouncer::default();
        assert_eq!(d.flush(), None);
        d.keystroke(Instant::now());
        assert_eq!(d.flush(), Some(TypingSignal::Stop));
        assert_eq!(d.flush(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_indicator_stops_after_idle() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let indicator = TypingIndicator::spawn("c1".into(), "u1".into(), TYPING_IDLE, tx);

        indicator.keystroke();
        indicator.keystroke();
        assert!(matches!(rx.recv().await, Some(ClientEvent::TypingStart { .. })));

        tokio::time::advance(Duration::from_millis(2500)).await;
        assert!(rx.try_recv().is_err());

        assert!(matches!(rx.recv().await, Some(ClientEvent::TypingStop { .. })));

        indicator.close().await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_indicator_flushes_on_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let indicator = TypingIndicator::spawn("c1".into(), "u1".into(), TYPING_IDLE, tx);

        indicator.keystroke();
        indicator.close().await;

        assert!(matches!(rx.recv().await, Some(ClientEvent::TypingStart { .. })));
        assert!(matches!(rx.recv().await, Some(ClientEvent::TypingStop { .. })));
        assert!(rx.recv().await.is_none());
    }
}
