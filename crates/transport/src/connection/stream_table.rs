use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::trace;

use crate::protocol::StreamId;

/// Live streams of one connection, keyed by stream id.
///
/// A stream is inserted when its first header block opens it and removed once
/// its exchange is retired or aborted. Events addressed to an id that is no
/// longer present are dropped here, so a late write for a finished stream
/// never reaches its state machine.
///
/// Closures passed to [`StreamTable::with_stream`] run while the entry is
/// locked and must not call back into the table.
#[derive(Debug)]
pub struct StreamTable<C> {
    streams: DashMap<StreamId, C>,
}

impl<C> StreamTable<C> {
    pub fn new() -> Self {
        Self { streams: DashMap::new() }
    }

    /// Returns false if a stream with this id was already live; the existing
    /// stream is kept.
    pub fn insert(&self, id: StreamId, context: C) -> bool {
        match self.streams.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(context);
                true
            }
        }
    }

    pub fn remove(&self, id: StreamId) -> Option<C> {
        self.streams.remove(&id).map(|(_, context)| context)
    }

    pub fn contains(&self, id: StreamId) -> bool {
        self.streams.contains_key(&id)
    }

    /// Runs `f` against the stream, or does nothing if it is unknown.
    pub fn with_stream<R>(&self, id: StreamId, f: impl FnOnce(&mut C) -> R) -> Option<R> {
        let Some(mut context) = self.streams.get_mut(&id) else {
            trace!(stream_id = %id, "event for unknown stream, ignore");
            return None;
        };
        Some(f(&mut context))
    }

    /// Runs `f` against every live stream and collects what it returns.
    pub fn for_each<R>(&self, mut f: impl FnMut(&mut C) -> R) -> Vec<(StreamId, R)> {
        self.streams.iter_mut().map(|mut entry| (*entry.key(), f(entry.value_mut()))).collect()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl<C> Default for StreamTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn unknown_stream_is_a_no_op() {
        let table = StreamTable::<u32>::new();
        assert!(table.insert(StreamId::new(1), 10));
        assert!(!table.insert(StreamId::new(1), 20));

        assert_eq!(table.with_stream(StreamId::new(1), |value| *value), Some(10));
        assert_eq!(table.with_stream(StreamId::new(3), |value| *value), None);

        assert_eq!(table.remove(StreamId::new(1)), Some(10));
        assert_eq!(table.with_stream(StreamId::new(1), |value| *value), None);
        assert!(table.is_empty());
    }

    #[test]
    fn for_each_visits_every_stream() {
        let table = StreamTable::new();
        for id in [1_u64, 3, 5] {
            table.insert(StreamId::new(id), 0_u32);
        }

        let mut visited = table.for_each(|value| {
            *value += 1;
            *value
        });
        visited.sort();
        assert_eq!(visited, vec![(StreamId::new(1), 1), (StreamId::new(3), 1), (StreamId::new(5), 1)]);
    }

    #[test]
    fn concurrent_insert_and_remove() {
        let table = Arc::new(StreamTable::new());
        let handles: Vec<_> = (0..4_u64)
            .map(|worker| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for i in 0..100 {
                        let id = StreamId::new(worker * 1000 + i);
                        table.insert(id, i);
                        if i % 2 == 0 {
                            table.remove(id);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(table.len(), 200);
    }
}
