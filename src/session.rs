//! One editing session over one mesh.
//!
//! The session owns every piece of mutable editing state and consumes at
//! most one [`Interaction`] per tick. Rendering, picking and visibility are
//! the caller's business; the session only tells it what changed.

use std::collections::BTreeSet;
use std::path::Path;

use nalgebra::{Isometry3, Point3, Unit, UnitQuaternion, Vector3};

use crate::adjacency::{AdjacencyQuery, ConnectedTriangle};
use crate::coincidence::CoincidenceIndex;
use crate::config::ToolConfig;
use crate::error::{Error, Result};
use crate::format::{self, SessionState};
use crate::mesh::{MeshBuffer, Vertex};
use crate::ops::{Gesture, MoveMode, Pivot};
use crate::selection::{Confirmation, SavedSelection, SavedSelections, SelectionSet};
use crate::texture;

/// Supplies the vertices eligible for interaction this frame, e.g. those
/// inside the view frustum and facing the camera.
pub trait VisibilityFilter {
    fn is_visible(&self, mesh: &MeshBuffer, v: Vertex) -> bool;
}

/// Every vertex is eligible.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllVertices;

impl VisibilityFilter for AllVertices {
    fn is_visible(&self, _mesh: &MeshBuffer, _v: Vertex) -> bool {
        true
    }
}

impl<F: Fn(&MeshBuffer, Vertex) -> bool> VisibilityFilter for F {
    fn is_visible(&self, mesh: &MeshBuffer, v: Vertex) -> bool {
        self(mesh, v)
    }
}

/// Which vertices the renderer offers for picking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisplayMode {
    #[default]
    All,
    HideSelected,
    OnlySelected,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Interaction {
    /// A vertex handle was dragged to a new object-space position.
    Drag { vertex: Vertex, position: Vector3<f64> },
    /// The pivot handle of a move gesture was dragged.
    DragHandle {
        position: Vector3<f64>,
        world_to_camera: Isometry3<f64>,
    },
    /// The rotation handle now reads `rotation`.
    Rotate(UnitQuaternion<f64>),
    /// A vertex handle was clicked.
    Click(Vertex),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    /// Positions were rewritten and normals recomputed.
    VerticesChanged,
    /// The clicked vertex was selected (`true`) or deselected (`false`).
    SelectionChanged(bool),
    /// The clicked vertex shares its position with others; the caller must
    /// pick one with [`EditSession::pick_coincident`].
    Ambiguous(Vec<Vertex>),
}

#[derive(Debug)]
pub struct EditSession {
    config: ToolConfig,
    mesh: MeshBuffer,
    reference: Option<Vec<Vector3<f64>>>,
    selection: SelectionSet,
    saved: SavedSelections,
    coincidence: CoincidenceIndex,
    adjacency: AdjacencyQuery,
    gesture: Gesture,
    tick: u64,
}

impl EditSession {
    pub fn new(mesh: MeshBuffer, config: ToolConfig) -> Result<Self> {
        mesh.validate()?;
        Ok(Self {
            coincidence: CoincidenceIndex::with_quantum(config.weld_quantum),
            config,
            mesh,
            reference: None,
            selection: SelectionSet::new(),
            saved: SavedSelections::new(),
            adjacency: AdjacencyQuery::new(),
            gesture: Gesture::Idle,
            tick: 0,
        })
    }

    /// Swaps in another mesh. The active selection, gesture, reference and
    /// caches are dropped; saved selections are kept.
    pub fn attach(&mut self, mesh: MeshBuffer) -> Result<()> {
        mesh.validate()?;
        self.mesh = mesh;
        self.reference = None;
        self.selection.clear();
        self.gesture = Gesture::Idle;
        self.coincidence.invalidate();
        self.adjacency.clear();
        Ok(())
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    pub fn mesh(&self) -> &MeshBuffer {
        &self.mesh
    }

    pub fn into_mesh(self) -> MeshBuffer {
        self.mesh
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn saved(&self) -> &SavedSelections {
        &self.saved
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn connectivity(&self) -> &AdjacencyQuery {
        &self.adjacency
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Advances to the next tick and applies its interaction, if any.
    pub fn tick(&mut self, interaction: Option<Interaction>) -> Result<Outcome> {
        self.tick += 1;
        match interaction {
            None => Ok(Outcome::Unchanged),
            Some(Interaction::Drag { vertex, position }) => self.drag(vertex, position),
            Some(Interaction::DragHandle {
                position,
                world_to_camera,
            }) => self.drag_handle(&position, &world_to_camera),
            Some(Interaction::Rotate(rotation)) => self.rotate(&rotation),
            Some(Interaction::Click(vertex)) => self.click(vertex),
        }
    }

    /// Vertices the renderer should offer this frame.
    pub fn candidates(&self, filter: &impl VisibilityFilter, mode: DisplayMode) -> Vec<Vertex> {
        (0..self.mesh.vertex_count())
            .map(Vertex::from)
            .filter(|&v| match mode {
                DisplayMode::All => true,
                DisplayMode::HideSelected => !self.selection.contains(v),
                DisplayMode::OnlySelected => self.selection.contains(v),
            })
            .filter(|&v| filter.is_visible(&self.mesh, v))
            .collect()
    }

    fn vertices_changed(&mut self) -> Outcome {
        self.mesh.recompute_normals();
        self.coincidence.invalidate();
        Outcome::VerticesChanged
    }

    fn click(&mut self, vertex: Vertex) -> Result<Outcome> {
        self.mesh.check_vertex(vertex)?;
        if self.selection.remove(vertex) {
            return Ok(Outcome::SelectionChanged(false));
        }
        match self.coincident_group(vertex) {
            Some(group) if group.len() > 1 => Ok(Outcome::Ambiguous(group)),
            Some(_) => {
                self.selection.add(vertex);
                Ok(Outcome::SelectionChanged(true))
            }
            None => {
                log::warn!("coincidence index unavailable; selecting {vertex} directly");
                self.selection.add(vertex);
                Ok(Outcome::SelectionChanged(true))
            }
        }
    }

    /// Every vertex at the current position of `vertex`, including itself.
    ///
    /// A group that no longer matches the mesh is discarded and the index
    /// rebuilt, at most once per tick. `None` means the group is unknown.
    fn coincident_group(&mut self, vertex: Vertex) -> Option<Vec<Vertex>> {
        let vertices = &self.mesh.vertices;
        let old = *vertices.get(usize::from(vertex))?;
        let quantum = self.coincidence.quantum();
        let is_current = |group: &[Vertex]| {
            group.contains(&vertex)
                && group.iter().all(|u| {
                    vertices
                        .get(usize::from(*u))
                        .is_some_and(|p| CoincidenceIndex::same_position(p, &old, quantum))
                })
        };

        let group = self.coincidence.lookup_fresh(vertices, &old, self.tick)?;
        if is_current(&group) {
            return Some(group);
        }
        log::debug!("coincidence group of {vertex} is out of date");
        self.coincidence.invalidate();
        if !self.coincidence.ensure_fresh(vertices, self.tick) {
            return None;
        }
        let group = self.coincidence.lookup(&old)?.to_vec();
        is_current(&group).then_some(group)
    }

    /// Shows the connectivity of one candidate of an ambiguous click.
    pub fn browse_coincident(&mut self, vertex: Vertex) -> Result<&BTreeSet<ConnectedTriangle>> {
        self.mesh.check_vertex(vertex)?;
        Ok(self.adjacency.connected_triangles(&self.mesh, vertex))
    }

    /// Resolves an ambiguous click by selecting `vertex`.
    pub fn pick_coincident(&mut self, vertex: Vertex) -> Result<()> {
        self.mesh.check_vertex(vertex)?;
        self.selection.add(vertex);
        self.adjacency.clear();
        Ok(())
    }

    pub fn show_connectivity(&mut self, vertex: Vertex) -> Result<&BTreeSet<ConnectedTriangle>> {
        self.browse_coincident(vertex)
    }

    pub fn clear_connectivity(&mut self) {
        self.adjacency.clear();
    }

    fn drag(&mut self, vertex: Vertex, position: Vector3<f64>) -> Result<Outcome> {
        self.mesh.check_vertex(vertex)?;
        let selected = self.selection.contains(vertex);
        match &mut self.gesture {
            Gesture::Moving(op) if selected && op.mode() == MoveMode::SnapToPoint => {
                op.snap_to(&mut self.mesh, &position)?;
                Ok(self.vertices_changed())
            }
            Gesture::Unfolding(op) if selected => {
                op.drive(&mut self.mesh, vertex, position)?;
                Ok(self.vertices_changed())
            }
            Gesture::Rotating(_) if selected => Ok(Outcome::Unchanged),
            _ => self.move_vertex(vertex, position),
        }
    }

    /// Moves one vertex and, when welding, every vertex coincident with it.
    fn move_vertex(&mut self, vertex: Vertex, position: Vector3<f64>) -> Result<Outcome> {
        let i = usize::from(vertex);
        if self.mesh.vertices[i] == position {
            return Ok(Outcome::Unchanged);
        }
        let group = if self.config.weld_duplicates {
            self.coincident_group(vertex)
        } else {
            None
        };
        match group {
            Some(group) => {
                for v in group {
                    self.mesh.vertices[usize::from(v)] = position;
                }
            }
            None => self.mesh.vertices[i] = position,
        }
        Ok(self.vertices_changed())
    }

    fn drag_handle(
        &mut self,
        position: &Vector3<f64>,
        world_to_camera: &Isometry3<f64>,
    ) -> Result<Outcome> {
        let Gesture::Moving(op) = &mut self.gesture else {
            return Err(Error::NoActiveGesture);
        };
        if op.drag_handle(&mut self.mesh, position, world_to_camera)? {
            Ok(self.vertices_changed())
        } else {
            Ok(Outcome::Unchanged)
        }
    }

    fn rotate(&mut self, rotation: &UnitQuaternion<f64>) -> Result<Outcome> {
        let Gesture::Rotating(op) = &mut self.gesture else {
            return Err(Error::NoActiveGesture);
        };
        op.update(&mut self.mesh, rotation)?;
        Ok(self.vertices_changed())
    }

    fn after_begin(&mut self, dirty: bool) {
        if dirty {
            self.vertices_changed();
        }
    }

    pub fn begin_move(&mut self) -> Result<()> {
        let result = self
            .gesture
            .begin_move(&self.selection, &mut self.mesh, self.config.move_mode);
        self.finish_begin(result)
    }

    /// Starts rotating about `view_axis`, the camera's forward axis at the
    /// time of the call.
    pub fn begin_rotate(&mut self, view_axis: Unit<Vector3<f64>>) -> Result<()> {
        let result = self
            .gesture
            .begin_rotate(&self.selection, &mut self.mesh, view_axis);
        self.finish_begin(result)
    }

    pub fn begin_unfold(&mut self) -> Result<()> {
        let result = self.gesture.begin_unfold(
            &self.selection,
            &mut self.mesh,
            self.reference.as_deref(),
        );
        self.finish_begin(result)
    }

    fn finish_begin(&mut self, result: Result<bool>) -> Result<()> {
        match result {
            Ok(dirty) => {
                self.after_begin(dirty);
                Ok(())
            }
            Err(e) => {
                // The previous gesture was still committed.
                self.after_begin(true);
                Err(e)
            }
        }
    }

    /// Finalizes the active gesture, if any.
    pub fn commit_gesture(&mut self) -> Result<Outcome> {
        if self.gesture.commit(&mut self.mesh)? {
            Ok(self.vertices_changed())
        } else {
            Ok(Outcome::Unchanged)
        }
    }

    /// Sets the positions unfold measures directions from. They must be
    /// parallel to the mesh's vertices; on mismatch the reference is cleared.
    pub fn set_reference(&mut self, reference: Option<Vec<Vector3<f64>>>) -> Result<()> {
        self.reference = None;
        let Some(reference) = reference else {
            return Ok(());
        };
        if reference.len() != self.mesh.vertex_count() {
            log::warn!(
                "reference has {} vertices, mesh has {}",
                reference.len(),
                self.mesh.vertex_count(),
            );
            return Err(Error::LengthMismatch {
                expected: self.mesh.vertex_count(),
                found: reference.len(),
            });
        }
        self.reference = Some(reference);
        Ok(())
    }

    pub fn reference(&self) -> Option<&[Vector3<f64>]> {
        self.reference.as_deref()
    }

    /// Moves every selected vertex to the origin.
    pub fn zero_selected(&mut self) -> Outcome {
        if self.selection.is_empty() {
            return Outcome::Unchanged;
        }
        for v in &self.selection {
            self.mesh.vertices[usize::from(v)] = Vector3::zeros();
        }
        self.vertices_changed()
    }

    pub fn selection_centroid(&self) -> Result<Vector3<f64>> {
        Pivot::Centroid.resolve(&self.selection, &self.mesh.vertices)
    }

    /// Distance between the two selected vertices, if exactly two are
    /// selected.
    pub fn selection_distance(&self) -> Option<f64> {
        let mut iter = self.selection.iter();
        match (iter.next(), iter.next(), iter.next()) {
            (Some(a), Some(b), None) => {
                Some((self.mesh.position(a)? - self.mesh.position(b)?).norm())
            }
            _ => None,
        }
    }

    pub fn selected_positions(&self) -> Vec<(Vertex, Vector3<f64>)> {
        self.selected_values(&self.mesh.vertices)
    }

    pub fn selected_normals(&self) -> Vec<(Vertex, Vector3<f64>)> {
        self.selected_values(&self.mesh.normals)
    }

    fn selected_values(&self, values: &[Vector3<f64>]) -> Vec<(Vertex, Vector3<f64>)> {
        self.selection
            .iter()
            .filter_map(|v| Some((v, *values.get(usize::from(v))?)))
            .collect()
    }

    pub fn select(&mut self, vertex: Vertex) -> Result<bool> {
        self.mesh.check_vertex(vertex)?;
        Ok(self.selection.add(vertex))
    }

    /// Makes `vertex` the only selected vertex.
    pub fn select_single(&mut self, vertex: Vertex) -> Result<()> {
        self.mesh.check_vertex(vertex)?;
        self.selection.clear();
        self.selection.add(vertex);
        Ok(())
    }

    pub fn deselect(&mut self, vertex: Vertex) -> bool {
        self.selection.remove(vertex)
    }

    pub fn toggle(&mut self, vertex: Vertex) -> Result<bool> {
        self.mesh.check_vertex(vertex)?;
        Ok(self.selection.toggle(vertex))
    }

    /// Adds `lo..hi`, clipped to the mesh.
    pub fn select_range(&mut self, lo: usize, hi: usize) -> usize {
        self.selection
            .add_range(lo, hi.min(self.mesh.vertex_count()))
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn select_by_sphere(
        &mut self,
        center: &Point3<f64>,
        radius: f64,
        to_world: &Isometry3<f64>,
    ) -> usize {
        self.selection
            .select_by_sphere(center, radius, &self.mesh.vertices, to_world)
    }

    pub fn deselect_by_sphere(
        &mut self,
        center: &Point3<f64>,
        radius: f64,
        to_world: &Isometry3<f64>,
    ) -> usize {
        self.selection
            .deselect_by_sphere(center, radius, &self.mesh.vertices, to_world)
    }

    pub fn save_selection(&mut self, name: &str) -> &SavedSelection {
        self.saved.save(name, &self.selection)
    }

    pub fn restore_saved(&mut self, index: usize) -> Result<()> {
        let saved = self.saved.get(index)?;
        self.selection.restore(saved);
        let dropped = self.selection.retain_in_range(self.mesh.vertex_count());
        if dropped > 0 {
            log::warn!("dropped {dropped} saved indices past the end of the mesh");
        }
        Ok(())
    }

    pub fn overwrite_saved(
        &mut self,
        index: usize,
        name: &str,
        confirm: impl FnOnce(&Confirmation<'_>) -> bool,
    ) -> Result<bool> {
        self.saved.overwrite(index, name, &self.selection, confirm)
    }

    pub fn delete_saved(
        &mut self,
        index: usize,
        confirm: impl FnOnce(&Confirmation<'_>) -> bool,
    ) -> Result<bool> {
        self.saved.delete_at(index, confirm)
    }

    fn check_in_range(&self, selection: &SelectionSet) -> Result<()> {
        selection
            .iter()
            .try_for_each(|v| self.mesh.check_vertex(v))
    }

    /// Replaces the selection with the contents of a plain index list. On
    /// any error the selection is left untouched.
    pub fn load_index_list<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let loaded = format::load_index_list(file)?;
        self.check_in_range(&loaded)?;
        self.selection = loaded;
        Ok(())
    }

    pub fn save_index_list<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        format::save_index_list(file, &self.selection)
    }

    pub fn export_texture<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        texture::export_selection(
            file,
            self.config.texture_size,
            &self.selection,
            &self.mesh.uvs,
        )
    }

    /// Replaces the selection with the vertices marked in a texture.
    pub fn import_texture<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        self.selection = texture::import_selection(file, &self.mesh.uvs)?;
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            selection: self.selection.clone(),
            saved: self.saved.clone(),
        }
    }

    /// Restores persisted selections, dropping active indices that do not
    /// exist in the current mesh.
    pub fn restore_state(&mut self, state: SessionState) {
        self.selection = state.selection;
        self.saved = state.saved;
        let dropped = self.selection.retain_in_range(self.mesh.vertex_count());
        if dropped > 0 {
            log::warn!("dropped {dropped} persisted indices past the end of the mesh");
        }
    }
}
