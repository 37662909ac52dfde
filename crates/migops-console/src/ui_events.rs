use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::commands::AppEvent;

pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 512;

#[derive(Clone)]
pub struct UiEventSender {
    inner: Arc<UiEventQueue>,
}

/// Bounded event queue between the worker and a front end.
///
/// A wizard redraw replaces any redraw still queued and moves to the back,
/// so it never lands ahead of events sent before it. Log lines are the first
/// to go when the queue is full.
pub struct UiEventQueue {
    queue: Mutex<VecDeque<AppEvent>>,
    notify: mpsc::Sender<()>,
    max_len: usize,
}

impl UiEventQueue {
    pub fn new(max_len: usize) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (notify, notify_rx) = mpsc::channel(1);
        (
            Arc::new(Self {
                queue: Mutex::new(VecDeque::new()),
                notify,
                max_len: max_len.max(1),
            }),
            notify_rx,
        )
    }

    pub fn sender(self: &Arc<Self>) -> UiEventSender {
        UiEventSender {
            inner: Arc::clone(self),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AppEvent>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn drain(&self) -> Vec<AppEvent> {
        self.lock().drain(..).collect()
    }

    fn push(&self, event: AppEvent) -> bool {
        let mut queue = self.lock();
        let was_empty = queue.is_empty();

        if matches!(event, AppEvent::Wizard { .. }) {
            if let Some(pos) = queue
                .iter()
                .position(|ev| matches!(ev, AppEvent::Wizard { .. }))
            {
                queue.remove(pos);
                queue.push_back(event);
                return false;
            }
        }

        if queue.len() >= self.max_len {
            if let Some(pos) = queue
                .iter()
                .position(|ev| matches!(ev, AppEvent::Log { .. }))
            {
                queue.remove(pos);
            } else if matches!(event, AppEvent::Log { .. }) {
                return false;
            } else {
                queue.pop_front();
            }
        }

        queue.push_back(event);
        if was_empty {
            let _ = self.notify.try_send(());
        }
        true
    }
}

impl UiEventSender {
    /// Queues `event`; returns false when it was merged into a queued event or dropped.
    pub fn send(&self, event: AppEvent) -> bool {
        self.inner.push(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactGroup;
    use crate::commands::WizardSnapshot;
    use crate::wizard::{InjectWizard, WizardInput};

    fn wizard_event(hint: &str) -> AppEvent {
        let mut wizard = InjectWizard::new();
        wizard.dispatch(WizardInput::Open(ArtifactGroup {
            display_prefix: "LARS/".into(),
            category: "ROOT".into(),
            key_prefix: String::new(),
            files: Vec::new(),
            files_count: 0,
        }));
        let mut snapshot = WizardSnapshot::new(
            wizard.view().unwrap(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            None,
        );
        snapshot.hint = hint.to_string();
        AppEvent::Wizard {
            view: Box::new(snapshot),
        }
    }

    #[test]
    fn wizard_redraws_coalesce() {
        let (queue, _notify) = UiEventQueue::new(8);
        let sender = queue.sender();
        assert!(sender.send(wizard_event("first")));
        assert!(sender.send(AppEvent::Log {
            line: "polling".into()
        }));
        assert!(!sender.send(wizard_event("second")));

        let events = queue.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], AppEvent::Log { line } if line == "polling"));
        match &events[1] {
            AppEvent::Wizard { view } => assert_eq!(view.hint, "second"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn full_queue_drops_logs_first() {
        let (queue, _notify) = UiEventQueue::new(2);
        let sender = queue.sender();
        sender.send(AppEvent::Log { line: "a".into() });
        sender.send(AppEvent::WizardDismissed);
        assert!(sender.send(AppEvent::Clipboard {
            text: "s3://migops/LARS/LANDMARK.jar".into()
        }));
        assert!(!sender.send(AppEvent::Log { line: "b".into() }));

        let events = queue.drain();
        assert!(matches!(events[0], AppEvent::WizardDismissed));
        assert!(matches!(events[1], AppEvent::Clipboard { .. }));
    }
}
