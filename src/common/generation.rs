//! Generation counting and generation-deferred reclamation.
//!
//! The writer advances a monotonic generation counter at a cadence of its
//! choosing. Readers take a [`GenerationGuard`] for the duration of their
//! access, which pins the generation that was current when they started. The
//! oldest pinned generation is the *used generation*: any memory retired in an
//! older generation is unreachable by every live reader and can be reused.
//!
//! [`GenerationHoldList`] implements the writer side of the protocol in two
//! stages. Elements freed during the current generation are buffered unstamped
//! (hold-1) and only stamped when the writer moves to a new generation
//! (hold-2). Stamping at the boundary, rather than at free time, guarantees
//! that a reader which could still see the element holds a guard on a
//! generation at or after the stamp until it is done.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::atomic::{AtomicU64, Ordering},
};

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use smallvec::SmallVec;

pub type Generation = u64;

/// Returns `true` if `generation` is strictly older than `used_generation`.
///
/// The comparison is done on the signed difference so that it keeps working
/// when the counter wraps around.
#[inline]
pub(crate) fn is_older(generation: Generation, used_generation: Generation) -> bool {
    (generation.wrapping_sub(used_generation) as i64) < 0
}

/// Hands out reader guards and reports the oldest generation still in use.
///
/// Readers and the writer share one short critical section:
/// [`take_guard`](Self::take_guard), dropping a guard and
/// [`used_generation`](Self::used_generation) each lock a small map of reader
/// counts for a single O(log n) update or lookup, where n is the number of
/// distinct generations with live readers. The lock is never held while a
/// reader does its work, so a reader delays the writer by at most one map
/// update and never for the duration of its read. The handler is not wait-free.
pub struct GenerationHandler {
    current: CachePadded<AtomicU64>,
    // Number of live guards per generation.
    readers: Mutex<BTreeMap<Generation, usize>>,
}

impl Default for GenerationHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationHandler {
    pub fn new() -> Self {
        Self {
            current: CachePadded::new(AtomicU64::new(0)),
            readers: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn current_generation(&self) -> Generation {
        self.current.load(Ordering::Acquire)
    }

    /// Advances the current generation. Writer only.
    pub fn inc_generation(&self) -> Generation {
        self.current.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Pins the current generation until the returned guard is dropped.
    pub fn take_guard(&self) -> GenerationGuard<'_> {
        let mut readers = self.readers.lock();
        // Read under the lock so that `used_generation` never misses a guard
        // whose generation it should have seen.
        let generation = self.current_generation();
        *readers.entry(generation).or_default() += 1;
        GenerationGuard {
            handler: self,
            generation,
        }
    }

    /// The oldest generation a live reader may still be observing. Equals the
    /// current generation when there are no readers.
    pub fn used_generation(&self) -> Generation {
        let readers = self.readers.lock();
        readers
            .keys()
            .next()
            .copied()
            .unwrap_or_else(|| self.current_generation())
    }

    pub fn num_readers(&self) -> usize {
        self.readers.lock().values().sum()
    }

    fn release(&self, generation: Generation) {
        let mut readers = self.readers.lock();
        if let Some(count) = readers.get_mut(&generation) {
            *count -= 1;
            if *count == 0 {
                readers.remove(&generation);
            }
        }
    }
}

/// Keeps a generation pinned in its [`GenerationHandler`].
#[must_use = "the generation is released as soon as the guard is dropped"]
pub struct GenerationGuard<'a> {
    handler: &'a GenerationHandler,
    generation: Generation,
}

impl GenerationGuard<'_> {
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        self.handler.release(self.generation);
    }
}

/// The writer-private two-stage hold list.
///
/// Elements enter hold-1 through [`insert`](Self::insert), move to the
/// generation-stamped hold-2 FIFO on [`transfer`](Self::transfer), and are
/// handed back by [`trim`](Self::trim) once the used generation has passed
/// their stamp. Stamps are never decreasing, so trimming stops at the first
/// element that is not yet eligible.
pub struct GenerationHoldList<T> {
    hold_1: SmallVec<[T; 8]>,
    hold_2: VecDeque<(Generation, T)>,
}

impl<T> Default for GenerationHoldList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> GenerationHoldList<T> {
    pub fn new() -> Self {
        Self {
            hold_1: SmallVec::new(),
            hold_2: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, elem: T) {
        self.hold_1.push(elem);
    }

    /// Stamps every element freed since the last transfer with `generation`.
    pub fn transfer(&mut self, generation: Generation) {
        if self.hold_1.is_empty() {
            return;
        }
        self.hold_2
            .extend(self.hold_1.drain(..).map(|elem| (generation, elem)));
    }

    /// Hands every element stamped before `used_generation` to `reclaim`, in
    /// the order they were freed. Returns the number of reclaimed elements.
    pub fn trim(&mut self, used_generation: Generation, mut reclaim: impl FnMut(T)) -> usize {
        let mut trimmed = 0;
        while let Some((generation, _)) = self.hold_2.front() {
            if !is_older(*generation, used_generation) {
                break;
            }
            if let Some((_, elem)) = self.hold_2.pop_front() {
                reclaim(elem);
                trimmed += 1;
            }
        }
        trimmed
    }

    /// Number of elements held in both stages.
    pub fn len(&self) -> usize {
        self.hold_1.len() + self.hold_2.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hold_1.is_empty() && self.hold_2.is_empty()
    }

    /// Number of elements not yet stamped with a generation.
    pub fn unstamped_len(&self) -> usize {
        self.hold_1.len()
    }
}
