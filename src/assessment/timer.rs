use std::time::Duration;

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Identifies one scheduled timer. Events carrying a ticket that is no longer active
/// are stale and get dropped by [`StimulusTimer::accept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    StimulusHidden,
    AutoAdvance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub ticket: TimerTicket,
    pub kind: TimerKind,
}

struct PendingTimer {
    ticket: TimerTicket,
    handle: JoinHandle<()>,
}

impl Drop for PendingTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Presentation timer for recall stimuli plus the separate post-hide advance timer.
///
/// Expiry is reported as a [`TimerEvent`] on the channel returned by [`StimulusTimer::new`];
/// the owner feeds events back through [`StimulusTimer::accept`], which is what makes
/// completion fire exactly once and never after a cancel.
pub struct StimulusTimer {
    events: mpsc::UnboundedSender<TimerEvent>,
    next_ticket: u64,
    presentation: Option<PendingTimer>,
    advance: Option<PendingTimer>,
    items: Vec<String>,
}

impl StimulusTimer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timer = Self {
            events: tx,
            next_ticket: 0,
            presentation: None,
            advance: None,
            items: Vec::new(),
        };
        (timer, rx)
    }

    fn spawn(&mut self, kind: TimerKind, after: Duration) -> PendingTimer {
        self.next_ticket += 1;
        let ticket = TimerTicket(self.next_ticket);
        let tx = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // Receiver gone means the session was torn down
            let _ = tx.send(TimerEvent { ticket, kind });
        });
        PendingTimer { ticket, handle }
    }

    /// Shows `items` for `duration`. A presentation already running is cancelled first.
    pub fn present(&mut self, items: Vec<String>, duration: Duration) -> TimerTicket {
        if self.cancel_presentation() {
            debug!("Replacing active stimulus presentation");
        }
        let pending = self.spawn(TimerKind::StimulusHidden, duration);
        let ticket = pending.ticket;
        info!("⏱️ Presenting {} stimulus items for {}ms", items.len(), duration.as_millis());
        self.items = items;
        self.presentation = Some(pending);
        ticket
    }

    pub fn schedule_advance(&mut self, delay: Duration) -> TimerTicket {
        self.cancel_advance();
        let pending = self.spawn(TimerKind::AutoAdvance, delay);
        let ticket = pending.ticket;
        debug!("Auto-advance scheduled in {}ms", delay.as_millis());
        self.advance = Some(pending);
        ticket
    }

    pub fn cancel_presentation(&mut self) -> bool {
        self.items.clear();
        self.presentation.take().is_some()
    }

    pub fn cancel_advance(&mut self) -> bool {
        self.advance.take().is_some()
    }

    pub fn cancel_all(&mut self) {
        let presenting = self.cancel_presentation();
        let advancing = self.cancel_advance();
        if presenting || advancing {
            debug!("Cancelled pending stimulus timers");
        }
    }

    pub fn is_presenting(&self) -> bool {
        self.presentation.is_some()
    }

    pub fn is_advance_pending(&self) -> bool {
        self.advance.is_some()
    }

    pub fn visible_items(&self) -> Option<&[String]> {
        self.presentation.as_ref().map(|_| self.items.as_slice())
    }

    /// Consumes a fired event. Returns `true` only for the currently active timer of that
    /// kind, which is then cleared.
    pub fn accept(&mut self, event: TimerEvent) -> bool {
        let slot = match event.kind {
            TimerKind::StimulusHidden => &mut self.presentation,
            TimerKind::AutoAdvance => &mut self.advance,
        };
        let active = slot.as_ref().map_or(false, |pending| pending.ticket == event.ticket);
        if !active {
            debug!("Ignoring stale timer event {:?}", event);
            return false;
        }
        *slot = None;
        if event.kind == TimerKind::StimulusHidden {
            self.items.clear();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn items() -> Vec<String> {
        vec!["Apple".to_string(), "Chair".to_string()]
    }

    #[tokio::test(start_paused = true)]
    async fn hides_after_exact_duration() {
        let (mut timer, mut rx) = StimulusTimer::new();
        let started = Instant::now();
        let ticket = timer.present(items(), Duration::from_millis(5000));
        assert_eq!(timer.visible_items(), Some(items().as_slice()));

        let event = rx.recv().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(5000));
        assert_eq!(event, TimerEvent { ticket, kind: TimerKind::StimulusHidden });
        assert!(timer.accept(event));
        assert!(!timer.is_presenting());
        assert_eq!(timer.visible_items(), None);

        // Same event again is not accepted twice
        assert!(!timer.accept(event));
    }

    #[tokio::test(start_paused = true)]
    async fn re_presenting_cancels_prior_timer() {
        let (mut timer, mut rx) = StimulusTimer::new();
        let started = Instant::now();
        let first = timer.present(items(), Duration::from_millis(5000));
        tokio::time::advance(Duration::from_millis(3000)).await;
        let second = timer.present(vec!["Blue".to_string()], Duration::from_millis(5000));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.ticket, second);
        assert_ne!(event.ticket, first);
        assert_eq!(started.elapsed(), Duration::from_millis(8000));
        assert!(timer.accept(event));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (mut timer, mut rx) = StimulusTimer::new();
        timer.present(items(), Duration::from_millis(5000));
        timer.schedule_advance(Duration::from_millis(500));
        timer.cancel_all();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert!(!timer.is_presenting());
        assert!(!timer.is_advance_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn advance_timer_is_cancellable_on_its_own() {
        let (mut timer, mut rx) = StimulusTimer::new();
        let presentation = timer.present(items(), Duration::from_millis(1000));
        timer.schedule_advance(Duration::from_millis(500));
        assert!(timer.cancel_advance());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.ticket, presentation);
        assert_eq!(event.kind, TimerKind::StimulusHidden);
    }
}
