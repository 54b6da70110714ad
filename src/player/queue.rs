//! Play queue management.
//!
//! Insertion order is play order. The head is removed when advancement
//! takes it; the track that is currently playing is therefore never in the
//! queue (except as a loop re-append at the tail).

use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::track::{Track, TrackMetadata};

/// FIFO of tracks waiting to play.
#[derive(Debug, Default)]
pub struct PlayQueue {
    items: VecDeque<Arc<Track>>,
}

impl PlayQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get queue length.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Add a track to the end of the queue.
    pub fn push_back(&mut self, track: Arc<Track>) {
        self.items.push_back(track);
    }

    /// Take the next track to play.
    pub fn pop_front(&mut self) -> Option<Arc<Track>> {
        self.items.pop_front()
    }

    /// Last queued track.
    pub fn back(&self) -> Option<&Arc<Track>> {
        self.items.back()
    }

    /// Remove the last occurrence of `track` (by identity).
    pub fn remove(&mut self, track: &Arc<Track>) -> bool {
        match self.items.iter().rposition(|t| Arc::ptr_eq(t, track)) {
            Some(index) => self.items.remove(index).is_some(),
            None => false,
        }
    }

    /// Clear the queue.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Track>> {
        self.items.iter()
    }

    /// Uniformly permute the queued tracks.
    pub fn shuffle(&mut self) {
        self.shuffle_with(&mut rand::rng());
    }

    /// Shuffle with a caller-supplied RNG (Fisher-Yates over the whole queue).
    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.items.make_contiguous().shuffle(rng);
    }

    /// Metadata of up to `limit` upcoming tracks, in play order.
    pub fn upcoming(&self, limit: usize) -> Vec<TrackMetadata> {
        self.items
            .iter()
            .take(limit)
            .map(|t| t.metadata().clone())
            .collect()
    }
}
