use std::collections::BTreeSet;
use std::fmt;

use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mesh::Vertex;

/// Set of vertex indices under active edit.
///
/// Serialized as a plain index array. Deserializing collapses duplicates, so
/// a set read back from disk is always valid as a set; range checks against a
/// particular mesh are done by [`SelectionSet::retain_in_range`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Vertex>", into = "Vec<Vertex>")]
pub struct SelectionSet(BTreeSet<Vertex>);

impl From<Vec<Vertex>> for SelectionSet {
    fn from(indices: Vec<Vertex>) -> Self {
        indices.into_iter().collect()
    }
}

impl From<SelectionSet> for Vec<Vertex> {
    fn from(set: SelectionSet) -> Self {
        set.0.into_iter().collect()
    }
}

impl FromIterator<Vertex> for SelectionSet {
    fn from_iter<T: IntoIterator<Item = Vertex>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SelectionSet {
    type Item = Vertex;
    type IntoIter = std::iter::Copied<std::collections::btree_set::Iter<'a, Vertex>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().copied()
    }
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, v: Vertex) -> bool {
        self.0.contains(&v)
    }

    pub fn iter(&self) -> impl Iterator<Item = Vertex> + '_ {
        self.0.iter().copied()
    }

    /// Flips membership of `v` and returns whether it is now selected.
    pub fn toggle(&mut self, v: Vertex) -> bool {
        if self.0.remove(&v) {
            false
        } else {
            self.0.insert(v);
            true
        }
    }

    pub fn add(&mut self, v: Vertex) -> bool {
        self.0.insert(v)
    }

    pub fn remove(&mut self, v: Vertex) -> bool {
        self.0.remove(&v)
    }

    /// Adds every index in `lo..hi` and returns how many were newly added.
    pub fn add_range(&mut self, lo: usize, hi: usize) -> usize {
        let before = self.0.len();
        self.0.extend((lo..hi).map(Vertex::from));
        self.0.len() - before
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Replaces the whole set with the saved one.
    pub fn restore(&mut self, saved: &SavedSelection) {
        self.0.clone_from(&saved.indices.0);
    }

    /// Drops indices that do not exist in a mesh with `len` vertices and
    /// returns how many were dropped.
    pub fn retain_in_range(&mut self, len: usize) -> usize {
        let before = self.0.len();
        self.0.retain(|&v| usize::from(v) < len);
        before - self.0.len()
    }

    /// Selects every vertex whose world-space position lies strictly inside
    /// the sphere.
    pub fn select_by_sphere(
        &mut self,
        center: &Point3<f64>,
        radius: f64,
        vertices: &[Vector3<f64>],
        to_world: &Isometry3<f64>,
    ) -> usize {
        let before = self.0.len();
        let inside = vertices
            .iter()
            .enumerate()
            .filter(|(_, p)| in_sphere(center, radius, p, to_world))
            .map(|(i, _)| Vertex::from(i));
        self.0.extend(inside);
        self.0.len() - before
    }

    /// Deselects every selected vertex whose world-space position lies
    /// strictly inside the sphere.
    pub fn deselect_by_sphere(
        &mut self,
        center: &Point3<f64>,
        radius: f64,
        vertices: &[Vector3<f64>],
        to_world: &Isometry3<f64>,
    ) -> usize {
        let before = self.0.len();
        self.0.retain(|&v| match vertices.get(usize::from(v)) {
            Some(p) => !in_sphere(center, radius, p, to_world),
            None => true,
        });
        before - self.0.len()
    }
}

fn in_sphere(
    center: &Point3<f64>,
    radius: f64,
    p: &Vector3<f64>,
    to_world: &Isometry3<f64>,
) -> bool {
    let world = to_world.transform_point(&Point3::from(*p));
    (world - center).norm_squared() < radius * radius
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSelection {
    pub name: String,
    pub indices: SelectionSet,
}

/// A destructive change to the saved collection awaiting the caller's
/// yes/no answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirmation<'a> {
    Overwrite { name: &'a str },
    Remove { name: &'a str },
}

impl fmt::Display for Confirmation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confirmation::Overwrite { name } => {
                write!(f, "Replace saved selection {name:?}? This cannot be undone.")
            }
            Confirmation::Remove { name } => {
                write!(f, "Remove saved selection {name:?}? This cannot be undone.")
            }
        }
    }
}

/// Ordered collection of named selections.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SavedSelections(Vec<SavedSelection>);

impl SavedSelections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SavedSelection> {
        self.0.iter()
    }

    pub fn get(&self, index: usize) -> Result<&SavedSelection> {
        self.0.get(index).ok_or(Error::SavedSelectionOutOfRange {
            index,
            len: self.0.len(),
        })
    }

    /// Appends a snapshot of `selection`. An empty name becomes
    /// `"unnamed N"`, where `N` is the number of selections saved before.
    pub fn save(&mut self, name: &str, selection: &SelectionSet) -> &SavedSelection {
        let name = if name.is_empty() {
            format!("unnamed {}", self.0.len())
        } else {
            name.to_owned()
        };
        self.0.push(SavedSelection {
            name,
            indices: selection.clone(),
        });
        &self.0[self.0.len() - 1]
    }

    /// Replaces the indices (and, if `name` is non-empty, the name) of the
    /// saved selection at `index`. Returns `Ok(false)` without changing
    /// anything if `confirm` declines.
    pub fn overwrite(
        &mut self,
        index: usize,
        name: &str,
        selection: &SelectionSet,
        confirm: impl FnOnce(&Confirmation<'_>) -> bool,
    ) -> Result<bool> {
        let len = self.0.len();
        let saved = self
            .0
            .get_mut(index)
            .ok_or(Error::SavedSelectionOutOfRange { index, len })?;
        if !confirm(&Confirmation::Overwrite { name: &saved.name }) {
            return Ok(false);
        }
        if !name.is_empty() {
            saved.name = name.to_owned();
        }
        saved.indices = selection.clone();
        Ok(true)
    }

    /// Removes the saved selection at `index`. Returns `Ok(false)` without
    /// changing anything if `confirm` declines.
    pub fn delete_at(
        &mut self,
        index: usize,
        confirm: impl FnOnce(&Confirmation<'_>) -> bool,
    ) -> Result<bool> {
        let saved = self.get(index)?;
        if !confirm(&Confirmation::Remove { name: &saved.name }) {
            return Ok(false);
        }
        self.0.remove(index);
        Ok(true)
    }
}
