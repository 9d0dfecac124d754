use std::collections::vec_deque::Drain;
use std::iter::FusedIterator;

use crate::events::ArenaEvent;

/// A zero-allocation opaque iterator that drains edge events from an
/// observer.
///
/// Wraps the internal event queue drain so the public API does not expose
/// `std::collections::vec_deque::Drain` directly. Implements [`Iterator`],
/// [`DoubleEndedIterator`], [`ExactSizeIterator`] and [`FusedIterator`].
///
/// Obtain one from [`ObserverSession::events()`]; the narration or
/// accessibility collaborator polls it after each ingested snapshot. Every
/// event is delivered exactly once: draining is consuming.
///
/// [`ObserverSession::events()`]: crate::ObserverSession::events
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct EventDrain<'a> {
    inner: EventDrainInner<'a>,
}

enum EventDrainInner<'a> {
    Queue(Drain<'a, ArenaEvent>),
    Empty,
}

impl<'a> EventDrain<'a> {
    pub(crate) fn from_drain(drain: Drain<'a, ArenaEvent>) -> Self {
        Self {
            inner: EventDrainInner::Queue(drain),
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            inner: EventDrainInner::Empty,
        }
    }
}

impl Iterator for EventDrain<'_> {
    type Item = ArenaEvent;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            EventDrainInner::Queue(drain) => drain.next(),
            EventDrainInner::Empty => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            EventDrainInner::Queue(drain) => drain.size_hint(),
            EventDrainInner::Empty => (0, Some(0)),
        }
    }
}

impl DoubleEndedIterator for EventDrain<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            EventDrainInner::Queue(drain) => drain.next_back(),
            EventDrainInner::Empty => None,
        }
    }
}

impl ExactSizeIterator for EventDrain<'_> {
    fn len(&self) -> usize {
        match &self.inner {
            EventDrainInner::Queue(drain) => drain.len(),
            EventDrainInner::Empty => 0,
        }
    }
}

impl FusedIterator for EventDrain<'_> {}

impl std::fmt::Debug for EventDrain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDrain")
            .field("remaining", &self.len())
            .finish()
    }
}
