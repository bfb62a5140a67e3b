//! Lookup from a vertex position to every vertex sharing that position.
//!
//! The index is a cache over [`MeshBuffer::vertices`](crate::MeshBuffer). It
//! is never updated incrementally: edits either call
//! [`CoincidenceIndex::invalidate`] or leave the cache to notice its own
//! misses, and [`CoincidenceIndex::ensure_fresh`] rebuilds at most once per
//! interaction tick.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, TryReserveError};

use nalgebra::Vector3;

use crate::mesh::Vertex;

/// Hashable key for a position.
///
/// Positions are keyed by their bit pattern, optionally after snapping to a
/// grid. `-0.0` is folded into `0.0` so that the key agrees with `==`.
/// Non-finite positions have no key and never coincide with anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PositionKey([u64; 3]);

impl PositionKey {
    fn new(p: &Vector3<f64>, quantum: Option<f64>) -> Option<Self> {
        if !p.iter().all(|x| x.is_finite()) {
            return None;
        }
        let snap = |x: f64| match quantum {
            Some(q) => (x / q).round(),
            None => x,
        };
        Some(Self([p.x, p.y, p.z].map(|x| (snap(x) + 0.0).to_bits())))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IndexState {
    /// Never built, or explicitly invalidated since the last build.
    #[default]
    Stale,
    Built,
    /// The last rebuild failed; nothing is served until a rebuild succeeds.
    Error,
}

#[derive(Clone, Debug, Default)]
pub struct CoincidenceIndex {
    positions: HashMap<PositionKey, Vec<Vertex>>,
    state: IndexState,
    /// Set when a lookup misses; the next `ensure_fresh` rebuilds.
    dirty: bool,
    last_rebuild_tick: Option<u64>,
    quantum: Option<f64>,
}

impl CoincidenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an index that treats positions within the same grid cell of
    /// pitch `quantum` as coincident.
    pub fn with_quantum(quantum: Option<f64>) -> Self {
        Self {
            quantum: quantum.filter(|q| *q > 0.0),
            ..Self::default()
        }
    }

    pub fn quantum(&self) -> Option<f64> {
        self.quantum
    }

    /// Whether an index with grid pitch `quantum` keys `a` and `b` together.
    pub fn same_position(a: &Vector3<f64>, b: &Vector3<f64>, quantum: Option<f64>) -> bool {
        match (PositionKey::new(a, quantum), PositionKey::new(b, quantum)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty || self.state != IndexState::Built
    }

    /// Clears and repopulates the index from `vertices`.
    ///
    /// A failure part-way through leaves the index in [`IndexState::Error`]
    /// rather than serving a partial mapping.
    pub fn rebuild(&mut self, vertices: &[Vector3<f64>]) {
        self.rebuild_with(vertices, Self::populate);
    }

    fn rebuild_with(
        &mut self,
        vertices: &[Vector3<f64>],
        populate: impl FnOnce(&mut Self, &[Vector3<f64>]) -> Result<(), TryReserveError>,
    ) {
        self.positions.clear();
        match populate(self, vertices) {
            Ok(()) => {
                self.state = IndexState::Built;
                self.dirty = false;
                log::debug!(
                    "rebuilt coincidence index: {} vertices, {} distinct positions",
                    vertices.len(),
                    self.positions.len(),
                );
            }
            Err(e) => {
                self.positions.clear();
                self.state = IndexState::Error;
                log::error!("failed to rebuild coincidence index: {e}");
            }
        }
    }

    fn populate(&mut self, vertices: &[Vector3<f64>]) -> Result<(), TryReserveError> {
        self.positions.try_reserve(vertices.len())?;
        // Reverse order keeps the lowest index last, the order edits apply in.
        for (i, p) in vertices.iter().enumerate().rev() {
            let Some(key) = PositionKey::new(p, self.quantum) else {
                continue;
            };
            match self.positions.entry(key) {
                Entry::Occupied(mut e) => {
                    e.get_mut().try_reserve(1)?;
                    e.get_mut().push(Vertex::from(i));
                }
                Entry::Vacant(e) => {
                    let mut indices = Vec::new();
                    indices.try_reserve(1)?;
                    indices.push(Vertex::from(i));
                    e.insert(indices);
                }
            }
        }
        Ok(())
    }

    /// Returns every vertex at `position`, or `None` if the position is
    /// unknown or the index is not built.
    ///
    /// A miss marks the index dirty. Non-finite positions are never found
    /// and do not count as a miss.
    pub fn lookup(&mut self, position: &Vector3<f64>) -> Option<&[Vertex]> {
        let key = PositionKey::new(position, self.quantum)?;
        if self.state != IndexState::Built || !self.positions.contains_key(&key) {
            self.dirty = true;
            return None;
        }
        self.positions.get(&key).map(Vec::as_slice)
    }

    /// Marks the index stale. Lookups return `None` until the next rebuild.
    pub fn invalidate(&mut self) {
        if self.state == IndexState::Built {
            self.state = IndexState::Stale;
        }
        self.dirty = true;
    }

    /// Rebuilds the index if it is dirty, unless it has already been rebuilt
    /// during `tick`. Returns whether a rebuild happened.
    pub fn ensure_fresh(&mut self, vertices: &[Vector3<f64>], tick: u64) -> bool {
        if !self.is_dirty() || self.last_rebuild_tick == Some(tick) {
            return false;
        }
        self.last_rebuild_tick = Some(tick);
        self.rebuild(vertices);
        true
    }

    /// Looks up `position`, rebuilding (debounced per tick) on a miss.
    pub fn lookup_fresh(
        &mut self,
        vertices: &[Vector3<f64>],
        position: &Vector3<f64>,
        tick: u64,
    ) -> Option<Vec<Vertex>> {
        if let Some(found) = self.lookup(position) {
            return Some(found.to_vec());
        }
        if self.ensure_fresh(vertices, tick) {
            return self.lookup(position).map(<[Vertex]>::to_vec);
        }
        None
    }

    /// Groups of two or more vertices sharing a position.
    pub fn duplicate_groups(&self) -> impl Iterator<Item = &[Vertex]> {
        self.positions
            .values()
            .filter(|group| group.len() > 1 && self.state == IndexState::Built)
            .map(Vec::as_slice)
    }
}
