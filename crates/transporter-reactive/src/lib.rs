//! The minimal `Observable`/`Subject`/`BehaviorSubject` surface the core
//! hands a caller a stream from (§6 "Reactive helpers ... provided but
//! out-of-scope for the core spec"). This is not a general-purpose
//! reactive library: no combinators, no schedulers, just enough to
//! publish socket state transitions and session events without every
//! caller reinventing a broadcast channel.
//!
//! `Subject` has no notion of a current value and is grounded on the
//! teacher's event-only `Dynamic<T>` emitter (`aura-agent::reactive::frp`,
//! built on `tokio::sync::broadcast`). `BehaviorSubject` is the
//! time-varying half: it is grounded on `aura-app::bridge::signals::
//! SignalBroadcaster`, which wraps `futures_signals::signal::Mutable` to
//! get a synchronous `get`/`set` plus a `Signal` any `futures_signals`
//! consumer can compose with. A background task bridges every `Mutable`
//! write into a `Subject` so `subscribe()` still hands back the same
//! `Observable` stream type `Subject` does.

use std::sync::Arc;

use futures_signals::signal::{Mutable, Signal, SignalExt};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 128;

/// A subscription to a [`Subject`] or [`BehaviorSubject`]. Lags are
/// resynchronized transparently (the caller only ever sees the most
/// recent values it can still keep up with); a closed source ends the
/// stream.
pub struct Observable<T> {
    initial: Option<T>,
    rx: broadcast::Receiver<T>,
}

impl<T: Clone> Observable<T> {
    pub async fn next(&mut self) -> Option<T> {
        if let Some(value) = self.initial.take() {
            return Some(value);
        }
        loop {
            match self.rx.recv().await {
                Ok(value) => return Some(value),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// A multicast event emitter with no notion of a "current" value (§6).
/// Subscribers only see values emitted after they subscribed.
pub struct Subject<T> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone> Subject<T> {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish a value to every live subscriber; a no-op if there are none.
    pub fn emit(&self, value: T) {
        let _ = self.tx.send(value);
    }

    pub fn subscribe(&self) -> Observable<T> {
        Observable { initial: None, rx: self.tx.subscribe() }
    }
}

impl<T: Clone> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

/// A [`Mutable`]-backed value that replays its current value to every new
/// subscriber before any subsequent emission (§6; the "time-varying
/// value" half of the teacher's `Dynamic<T>`), grounded on
/// `SignalBroadcaster`.
pub struct BehaviorSubject<T: Clone + Send + Sync + 'static> {
    state: Mutable<T>,
    subject: Subject<T>,
}

impl<T: Clone + Send + Sync + 'static> BehaviorSubject<T> {
    /// Spawns the background task that bridges every `state` write into
    /// `subject`'s broadcast channel, so `subscribe()` can return the same
    /// `Observable` type `Subject` does without every caller having to
    /// poll a `Signal` directly.
    pub fn new(initial: T) -> Self {
        let state = Mutable::new(initial);
        let subject = Subject::new();
        let bridge_state = state.clone();
        let bridge_subject = subject.clone();
        tokio::spawn(async move {
            bridge_state
                .signal_cloned()
                .for_each(|value| {
                    bridge_subject.emit(value);
                    std::future::ready(())
                })
                .await;
        });
        Self { state, subject }
    }

    pub fn get(&self) -> T {
        self.state.get_cloned()
    }

    pub fn set(&self, value: T) {
        self.state.set(value);
    }

    /// A `futures_signals::Signal` tracking this value, for callers that
    /// want to compose with the rest of that ecosystem instead of reading
    /// [`BehaviorSubject::subscribe`]'s `Observable`.
    pub fn signal(&self) -> impl Signal<Item = T> {
        self.state.signal_cloned()
    }

    /// Subscribe and immediately receive the current value as the first
    /// item, then every subsequent `set()` in order.
    pub fn subscribe(&self) -> Observable<T> {
        let current = self.get();
        let mut observable = self.subject.subscribe();
        observable.initial = Some(current);
        observable
    }
}

impl<T: Clone + Send + Sync + 'static> Clone for BehaviorSubject<T> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone(), subject: self.subject.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subject_only_delivers_emissions_after_subscription() {
        let subject = Subject::<i32>::new();
        subject.emit(1); // no subscribers yet, dropped
        let mut observable = subject.subscribe();
        subject.emit(2);
        assert_eq!(observable.next().await, Some(2));
    }

    #[tokio::test]
    async fn behavior_subject_replays_the_current_value_first() {
        let subject = BehaviorSubject::new("idle".to_string());
        let mut observable = subject.subscribe();
        assert_eq!(observable.next().await, Some("idle".to_string()));
        subject.set("connected".to_string());
        assert_eq!(observable.next().await, Some("connected".to_string()));
    }

    #[tokio::test]
    async fn behavior_subject_get_reflects_the_latest_set() {
        let subject = BehaviorSubject::new(0);
        subject.set(42);
        assert_eq!(subject.get(), 42);
    }

    #[tokio::test]
    async fn behavior_subject_signal_tracks_every_set() {
        use futures::StreamExt;

        let subject = BehaviorSubject::new(0);
        let mut stream = subject.signal().to_stream();
        assert_eq!(stream.next().await, Some(0));
        subject.set(1);
        assert_eq!(stream.next().await, Some(1));
    }

    #[tokio::test]
    async fn dropping_every_sender_ends_the_observable() {
        let subject = Subject::<i32>::new();
        let mut observable = subject.subscribe();
        drop(subject);
        assert_eq!(observable.next().await, None);
    }
}
