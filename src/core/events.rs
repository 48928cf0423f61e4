//! Synchronous publish/subscribe registry.

use std::collections::HashMap;
use std::hash::Hash;

pub type Subscriber<P> = Box<dyn FnMut(&P) -> anyhow::Result<()>>;

/// Per-topic subscriber lists plus a catch-all list.
///
/// `notify` runs the topic's subscribers in subscription order, then every
/// catch-all subscriber. The first subscriber error stops delivery and is
/// returned to the caller.
pub struct EventHub<T, P> {
    topics: HashMap<T, Vec<Subscriber<P>>>,
    all: Vec<Subscriber<P>>,
}

impl<T: Eq + Hash, P> EventHub<T, P> {
    pub fn new() -> Self {
        Self {
            topics: HashMap::new(),
            all: Vec::new(),
        }
    }

    pub fn subscribe<F>(&mut self, topic: T, callback: F)
    where
        F: FnMut(&P) -> anyhow::Result<()> + 'static,
    {
        self.topics.entry(topic).or_default().push(Box::new(callback));
    }

    pub fn subscribe_all<F>(&mut self, callback: F)
    where
        F: FnMut(&P) -> anyhow::Result<()> + 'static,
    {
        self.all.push(Box::new(callback));
    }

    pub fn notify(&mut self, topic: &T, payload: &P) -> anyhow::Result<()> {
        if let Some(subscribers) = self.topics.get_mut(topic) {
            for callback in subscribers.iter_mut() {
                callback(payload)?;
            }
        }
        for callback in self.all.iter_mut() {
            callback(payload)?;
        }
        Ok(())
    }

    pub fn subscriber_count(&self, topic: &T) -> usize {
        self.topics.get(topic).map_or(0, Vec::len) + self.all.len()
    }
}

impl<T: Eq + Hash, P> Default for EventHub<T, P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Topics broadcast by a plugin run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PluginInitialized,
    BatchProcessed,
    PluginCompleted,
    PluginFailure,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PluginEvent {
    Initialized,
    BatchProcessed { batch: u64, records: usize },
    Completed { batches: u64 },
    Failure { message: String },
}

impl PluginEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Initialized => EventKind::PluginInitialized,
            Self::BatchProcessed { .. } => EventKind::BatchProcessed,
            Self::Completed { .. } => EventKind::PluginCompleted,
            Self::Failure { .. } => EventKind::PluginFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    fn logger(log: &Log, tag: &'static str) -> impl FnMut(&u32) -> anyhow::Result<()> + 'static {
        let log = Rc::clone(log);
        move |payload| {
            log.borrow_mut().push(format!("{tag}:{payload}"));
            Ok(())
        }
    }

    #[test]
    fn test_topic_subscribers_run_before_catch_all() {
        let log = Log::default();
        let mut hub = EventHub::new();
        hub.subscribe_all(logger(&log, "all"));
        hub.subscribe("a", logger(&log, "a1"));
        hub.subscribe("a", logger(&log, "a2"));
        hub.subscribe("b", logger(&log, "b1"));

        hub.notify(&"a", &7).unwrap();
        assert_eq!(*log.borrow(), vec!["a1:7", "a2:7", "all:7"]);
        assert_eq!(hub.subscriber_count(&"a"), 3);
    }

    #[test]
    fn test_unknown_topic_still_reaches_catch_all() {
        let log = Log::default();
        let mut hub = EventHub::new();
        hub.subscribe_all(logger(&log, "all"));
        hub.notify(&"nobody", &1).unwrap();
        assert_eq!(*log.borrow(), vec!["all:1"]);
    }

    #[test]
    fn test_subscriber_error_propagates_and_stops_delivery() {
        let log = Log::default();
        let mut hub = EventHub::new();
        hub.subscribe("a", |_: &u32| bail!("observer broke"));
        hub.subscribe_all(logger(&log, "all"));

        let err = hub.notify(&"a", &1).unwrap_err();
        assert_eq!(err.to_string(), "observer broke");
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_event_kinds() {
        assert_eq!(PluginEvent::Initialized.kind(), EventKind::PluginInitialized);
        assert_eq!(
            PluginEvent::Failure {
                message: "x".into()
            }
            .kind(),
            EventKind::PluginFailure
        );
    }
}
