//! Cancelable one-shot timers that post an event into the orchestrator
//! channel when they fire.
//!
//! Each arming gets a sequence number carried by the posted event. A timer
//! that is canceled or re-armed after its task already posted leaves a stale
//! event in the channel; [`Timer::take_fired`] rejects it.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

pub struct Timer<E> {
    name: &'static str,
    tx: UnboundedSender<E>,
    seq: u64,
    armed: Option<u64>,
    task: Option<JoinHandle<()>>,
}

impl<E: Send + 'static> Timer<E> {
    pub fn new(name: &'static str, tx: UnboundedSender<E>) -> Self {
        Self {
            name,
            tx,
            seq: 0,
            armed: None,
            task: None,
        }
    }

    /// Cancels any pending instance, then arms a new one.
    pub fn schedule(&mut self, delay: Duration, event: impl FnOnce(u64) -> E + Send + 'static) -> u64 {
        self.cancel();
        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;
        let tx = self.tx.clone();
        let deadline = Instant::now() + delay;
        self.armed = Some(seq);
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(event(seq));
        }));
        trace!(target: "feedwarden::timer", timer = self.name, seq, delay_ms = delay.as_millis() as u64, "timer armed");
        seq
    }

    /// Returns `true` when something was pending.
    pub fn cancel(&mut self) -> bool {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.armed.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.armed.is_some()
    }

    /// Accepts a fired event if it belongs to the current arming and disarms
    /// the timer.
    pub fn take_fired(&mut self, seq: u64) -> bool {
        if self.armed == Some(seq) {
            self.armed = None;
            self.task = None;
            true
        } else {
            trace!(target: "feedwarden::timer", timer = self.name, seq, "stale timer event dropped");
            false
        }
    }
}

impl<E> Drop for Timer<E> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Coalesces bursts of triggers into a single event posted once the window
/// elapses without a new trigger.
pub struct Debouncer<E> {
    window: Duration,
    timer: Timer<E>,
    make_event: fn(u64) -> E,
}

impl<E: Send + 'static> Debouncer<E> {
    pub fn new(window: Duration, tx: UnboundedSender<E>, make_event: fn(u64) -> E) -> Self {
        Self {
            window,
            timer: Timer::new("debounce", tx),
            make_event,
        }
    }

    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }

    /// Restarts the window.
    pub fn trigger(&mut self) {
        let make_event = self.make_event;
        self.timer.schedule(self.window, make_event);
    }

    pub fn cancel(&mut self) -> bool {
        self.timer.cancel()
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }

    pub fn take_fired(&mut self, seq: u64) -> bool {
        self.timer.take_fired(seq)
    }
}
