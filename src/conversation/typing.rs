use std::time::Duration;

use tokio::{sync::broadcast::error::RecvError, time::Instant};

use crate::hub::{Event, Hub, Subscription};

/// Sender-side typing flag for one connection. Each keystroke pushes back the idle
/// deadline and, at most every half timeout, re-announces the flag so receivers never
/// see it go stale mid-burst. The owner clears it when the deadline passes or the
/// connection ends.
#[derive(Debug)]
pub struct TypingTracker {
    hub: Hub,
    pairing_id: String,
    user_id: String,
    timeout: Duration,
    deadline: Option<Instant>,
    announced_at: Option<Instant>,
}

impl TypingTracker {
    pub fn new(hub: Hub, pairing_id: String, user_id: String, timeout: Duration) -> Self {
        Self { hub, pairing_id, user_id, timeout, deadline: None, announced_at: None }
    }

    pub fn is_typing(&self) -> bool {
        self.deadline.is_some()
    }

    /// When the flag should drop if no further keystroke arrives.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn keystroke(&mut self, now: Instant) {
        let heartbeat_due = match (self.deadline, self.announced_at) {
            (Some(_), Some(announced_at)) => now.duration_since(announced_at) >= self.timeout / 2,
            _ => true,
        };
        if heartbeat_due {
            self.announce(true);
            self.announced_at = Some(now);
        }
        self.deadline = Some(now + self.timeout);
    }

    /// Clears the flag if the deadline has passed. True if it was cleared.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.stop();
                true
            }
            _ => false,
        }
    }

    pub fn stop(&mut self) {
        self.announced_at = None;
        if self.deadline.take().is_some() {
            self.announce(false);
        }
    }

    fn announce(&self, typing: bool) {
        self.hub.publish(Event::Typing {
            pairing_id: self.pairing_id.clone(),
            user_id: self.user_id.clone(),
            typing,
        });
    }
}

impl Drop for TypingTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Receiver-side view of the partner's typing flag. A raised flag that has not been
/// refreshed within the timeout reads as not typing, so a lost "stopped" event never
/// leaves the indicator stuck.
#[derive(Debug, Clone)]
pub struct TypingView {
    timeout: Duration,
    raised_at: Option<Instant>,
}

impl TypingView {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, raised_at: None }
    }

    pub fn update(&mut self, typing: bool, now: Instant) {
        self.raised_at = typing.then_some(now);
    }

    pub fn is_typing(&self, now: Instant) -> bool {
        self.raised_at
            .is_some_and(|raised_at| now.duration_since(raised_at) < self.timeout)
    }

    /// When the current flag goes stale.
    pub fn stale_at(&self) -> Option<Instant> {
        self.raised_at.map(|raised_at| raised_at + self.timeout)
    }
}

/// Calls `callback` whenever `user_id` starts or stops typing in `pairing_id`.
pub fn subscribe_typing(
    hub: &Hub,
    pairing_id: String,
    user_id: String,
    mut callback: impl FnMut(bool) + Send + 'static,
) -> Subscription {
    let mut rx = hub.subscribe();
    Subscription::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(Event::Typing { pairing_id: p, user_id: u, typing })
                    if p == pairing_id && u == user_id =>
                {
                    callback(typing)
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(1500);

    fn typing_events(hub: &Hub) -> tokio::sync::broadcast::Receiver<Event> {
        hub.subscribe()
    }

    #[tokio::test]
    async fn close_keystrokes_share_one_announcement() {
        let hub = Hub::default();
        let mut rx = typing_events(&hub);
        let mut tracker = TypingTracker::new(hub.clone(), "C-1".into(), "a".into(), TIMEOUT);
        let start = Instant::now();

        tracker.keystroke(start);
        tracker.keystroke(start + Duration::from_millis(500));
        assert_eq!(tracker.deadline(), Some(start + Duration::from_millis(2000)));

        assert!(!tracker.expire(start + Duration::from_millis(1600)));
        assert!(tracker.expire(start + Duration::from_millis(2000)));
        assert!(!tracker.is_typing());

        let events: Vec<bool> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| matches!(e, Event::Typing { typing: true, .. }))
            .collect();
        assert_eq!(events, [true, false]);
    }

    #[tokio::test]
    async fn long_bursts_keep_the_receiver_seeing_typing() {
        let hub = Hub::default();
        let mut rx = typing_events(&hub);
        let mut tracker = TypingTracker::new(hub.clone(), "C-1".into(), "a".into(), TIMEOUT);
        let mut view = TypingView::new(TIMEOUT);
        let start = Instant::now();

        for step in 0..=10 {
            let now = start + Duration::from_millis(300 * step);
            tracker.keystroke(now);
            while let Ok(Event::Typing { typing, .. }) = rx.try_recv() {
                view.update(typing, now);
            }
            assert!(view.is_typing(now), "stale at {}ms", 300 * step);
        }
        let now = start + Duration::from_millis(3000);
        assert!(tracker.is_typing());
        assert!(view.is_typing(now + Duration::from_millis(1000)));

        // idle past the deadline: the flag drops
        assert!(tracker.expire(now + TIMEOUT));
        while let Ok(Event::Typing { typing, .. }) = rx.try_recv() {
            view.update(typing, now + TIMEOUT);
        }
        assert!(!view.is_typing(now + TIMEOUT));
    }

    #[tokio::test]
    async fn dropping_the_tracker_clears_the_flag() {
        let hub = Hub::default();
        let mut rx = typing_events(&hub);
        let mut tracker = TypingTracker::new(hub.clone(), "C-1".into(), "a".into(), TIMEOUT);
        tracker.keystroke(Instant::now());
        drop(tracker);

        assert!(matches!(rx.try_recv(), Ok(Event::Typing { typing: true, .. })));
        assert!(matches!(rx.try_recv(), Ok(Event::Typing { typing: false, .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn view_ignores_stale_flags() {
        let mut view = TypingView::new(TIMEOUT);
        let now = Instant::now();
        assert!(!view.is_typing(now));

        view.update(true, now);
        assert!(view.is_typing(now + Duration::from_millis(1000)));
        assert!(!view.is_typing(now + TIMEOUT));
        assert_eq!(view.stale_at(), Some(now + TIMEOUT));

        view.update(false, now);
        assert!(!view.is_typing(now));
    }

    #[tokio::test]
    async fn subscription_filters_by_pairing_and_user() {
        let hub = Hub::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = subscribe_typing(&hub, "C-1".into(), "b".into(), move |typing| {
            let _ = tx.send(typing);
        });

        let typing = |pairing_id: &str, user_id: &str, typing| Event::Typing {
            pairing_id: pairing_id.into(),
            user_id: user_id.into(),
            typing,
        };
        hub.publish(typing("C-2", "b", true));
        hub.publish(typing("C-1", "a", true));
        hub.publish(typing("C-1", "b", true));
        hub.publish(typing("C-1", "b", false));

        assert_eq!(rx.recv().await, Some(true));
        assert_eq!(rx.recv().await, Some(false));
    }
}
