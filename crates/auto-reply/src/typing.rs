//! Transport callbacks while a reply is being produced: typing indicators
//! and early delivery of partial payloads.

use std::{sync::Arc, time::Duration};

use {async_trait::async_trait, parley_common::ReplyPayload, tokio::task::JoinHandle, tracing::trace};

/// Transport hooks invoked by the pipeline.
#[async_trait]
pub trait ReplyHooks: Send + Sync {
    /// Called when a reply starts and again on every typing tick.
    async fn on_reply_start(&self);

    /// Deliver a payload ahead of the final reply. Payloads handed over here
    /// are not repeated in the returned list.
    async fn on_partial_reply(&self, _payload: &ReplyPayload) {}
}

/// Repeats [`ReplyHooks::on_reply_start`] until dropped.
pub struct TypingLoop {
    handle: Option<JoinHandle<()>>,
}

impl TypingLoop {
    /// Fire once right away, then every `interval` until dropped. A zero
    /// interval only fires the first time.
    pub async fn start(hooks: Arc<dyn ReplyHooks>, interval: Duration) -> Self {
        hooks.on_reply_start().await;
        if interval.is_zero() {
            return Self { handle: None };
        }
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                trace!("typing indicator tick");
                hooks.on_reply_start().await;
            }
        });
        Self {
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for TypingLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    #[derive(Default)]
    struct Counter(AtomicUsize);

    #[async_trait]
    impl ReplyHooks for Counter {
        async fn on_reply_start(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn zero_interval_fires_once() {
        let hooks = Arc::new(Counter::default());
        let _typing = TypingLoop::start(hooks.clone(), Duration::ZERO).await;
        assert_eq!(hooks.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ticks_until_dropped() {
        let hooks = Arc::new(Counter::default());
        let typing = TypingLoop::start(hooks.clone(), Duration::from_millis(20)).await;
        tokio::time::sleep(Duration::from_millis(90)).await;
        drop(typing);
        let fired = hooks.0.load(Ordering::SeqCst);
        assert!(fired >= 2, "fired {fired} times");
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(hooks.0.load(Ordering::SeqCst), fired);
    }
}
