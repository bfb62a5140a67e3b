//! Group transforms of the selected vertices.
//!
//! Every operator follows the same protocol: `start` snapshots the selected
//! positions and a pivot, then each update rewrites every selected vertex
//! from that snapshot plus the accumulated input. Updates never compound, so
//! a gesture can be replayed from any input value.

use std::f64::consts::{PI, TAU};

use nalgebra::{Isometry3, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::idx::IndexedStore;
use crate::mesh::{MeshBuffer, Vertex};
use crate::selection::SelectionSet;

pub enum Pivot {
    /// Mean of the selected positions.
    Centroid,
    /// Mean of the selected positions in X/Y, highest selected Z.
    TopCentroid,
}

impl Pivot {
    pub fn resolve(
        &self,
        selection: &SelectionSet,
        positions: &[Vector3<f64>],
    ) -> Result<Vector3<f64>> {
        if selection.is_empty() {
            return Err(Error::EmptySelection);
        }
        let mut sum: Vector3<f64> = Vector3::zeros();
        let mut max_z = f64::NEG_INFINITY;
        for v in selection {
            let p = position(positions, v)?;
            sum += p;
            max_z = max_z.max(p.z);
        }
        let mut pivot = sum / selection.len() as f64;
        if let Pivot::TopCentroid = self {
            pivot.z = max_z;
        }
        Ok(pivot)
    }
}

fn position(positions: &[Vector3<f64>], v: Vertex) -> Result<&Vector3<f64>> {
    let i = usize::from(v);
    positions.get(i).ok_or(Error::VertexOutOfRange {
        index: i,
        len: positions.len(),
    })
}

/// Snapshot of the selected positions, sized for the whole vertex buffer.
fn capture(
    selection: &SelectionSet,
    mesh: &MeshBuffer,
) -> Result<IndexedStore<Vertex, Vector3<f64>>> {
    if selection.is_empty() {
        return Err(Error::EmptySelection);
    }
    let mut starts = IndexedStore::with_len(mesh.vertex_count());
    for v in selection {
        starts.set(v, *position(&mesh.vertices, v)?);
    }
    Ok(starts)
}

fn check_sized<T>(store: &IndexedStore<Vertex, T>, mesh: &MeshBuffer) -> Result<()> {
    if store.is_sized_for(mesh.vertex_count()) {
        Ok(())
    } else {
        Err(Error::GestureOutdated)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveMode {
    /// Dragging any selected vertex collapses the whole selection onto it.
    SnapToPoint,
    /// The whole selection follows the pivot handle.
    #[default]
    ByDelta,
}

#[derive(Clone, Debug)]
pub struct MoveAll {
    mode: MoveMode,
    starts: IndexedStore<Vertex, Vector3<f64>>,
    pivot: Vector3<f64>,
    offset: Vector3<f64>,
}

impl MoveAll {
    pub fn start(selection: &SelectionSet, mesh: &MeshBuffer, mode: MoveMode) -> Result<Self> {
        let starts = capture(selection, mesh)?;
        let pivot = Pivot::Centroid.resolve(selection, &mesh.vertices)?;
        log::debug!("move gesture started on {} vertices", starts.count());
        Ok(Self {
            mode,
            starts,
            pivot,
            offset: Vector3::zeros(),
        })
    }

    pub fn mode(&self) -> MoveMode {
        self.mode
    }

    pub fn pivot(&self) -> Vector3<f64> {
        self.pivot
    }

    pub fn offset(&self) -> Vector3<f64> {
        self.offset
    }

    /// Where the pivot handle currently sits.
    pub fn handle_position(&self) -> Vector3<f64> {
        self.pivot + self.offset
    }

    /// Moves every selected vertex to its start position plus `offset`.
    pub fn update(&mut self, mesh: &mut MeshBuffer, offset: Vector3<f64>) -> Result<()> {
        check_sized(&self.starts, mesh)?;
        self.offset = offset;
        for (v, start) in self.starts.iter() {
            mesh.vertices[usize::from(v)] = start + offset;
        }
        Ok(())
    }

    /// Applies a drag of the pivot handle to `handle`.
    ///
    /// The delta runs from the pivot to the handle, so the selection follows
    /// the handle rather than moving against it. It is taken in camera space
    /// with Y flipped so that it follows the projected pointer. Returns
    /// whether anything moved.
    pub fn drag_handle(
        &mut self,
        mesh: &mut MeshBuffer,
        handle: &Vector3<f64>,
        world_to_camera: &Isometry3<f64>,
    ) -> Result<bool> {
        if *handle == self.handle_position() {
            return Ok(false);
        }
        let mut delta = world_to_camera.transform_vector(&(handle - self.pivot));
        delta.y = -delta.y;
        self.update(mesh, delta)?;
        Ok(true)
    }

    /// Collapses every selected vertex onto `point`.
    pub fn snap_to(&mut self, mesh: &mut MeshBuffer, point: &Vector3<f64>) -> Result<()> {
        check_sized(&self.starts, mesh)?;
        for v in self.starts.indices() {
            mesh.vertices[usize::from(v)] = *point;
        }
        Ok(())
    }
}

/// Wraps an angle into `(-PI, PI]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(TAU);
    if a > PI {
        a - TAU
    } else {
        a
    }
}

/// Angle of the twist of `rotation` about `axis` (swing-twist decomposition).
/// Components of the rotation about any perpendicular axis are discarded.
pub fn roll_about(rotation: &UnitQuaternion<f64>, axis: &Unit<Vector3<f64>>) -> f64 {
    let projected = rotation.imag().dot(axis.as_ref());
    wrap_angle(2.0 * projected.atan2(rotation.w))
}

/// Orthonormal `(u, v)` spanning the plane perpendicular to `axis`, with
/// `u` as close to +X as possible and `v = axis × u`.
fn plane_basis(axis: &Unit<Vector3<f64>>) -> (Vector3<f64>, Vector3<f64>) {
    let reject = |w: Vector3<f64>| (w - axis.as_ref() * w.dot(axis.as_ref())).try_normalize(1e-9);
    let u = reject(Vector3::x())
        .or_else(|| reject(Vector3::y()))
        .unwrap_or_else(Vector3::y);
    (u, axis.cross(&u))
}

#[derive(Clone, Debug)]
pub struct RotateAll {
    starts: IndexedStore<Vertex, Vector3<f64>>,
    pivot: Vector3<f64>,
    axis: Unit<Vector3<f64>>,
    basis: (Vector3<f64>, Vector3<f64>),
    angle: f64,
}

impl RotateAll {
    /// Starts a rotation about `axis`, usually the view axis at the time the
    /// gesture begins. The axis stays fixed for the whole gesture.
    pub fn start(
        selection: &SelectionSet,
        mesh: &MeshBuffer,
        axis: Unit<Vector3<f64>>,
    ) -> Result<Self> {
        let starts = capture(selection, mesh)?;
        let pivot = Pivot::Centroid.resolve(selection, &mesh.vertices)?;
        log::debug!("rotate gesture started on {} vertices", starts.count());
        Ok(Self {
            starts,
            pivot,
            basis: plane_basis(&axis),
            axis,
            angle: 0.0,
        })
    }

    pub fn pivot(&self) -> Vector3<f64> {
        self.pivot
    }

    pub fn axis(&self) -> Unit<Vector3<f64>> {
        self.axis
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Applies the roll of an absolute handle rotation.
    pub fn update(
        &mut self,
        mesh: &mut MeshBuffer,
        rotation: &UnitQuaternion<f64>,
    ) -> Result<()> {
        self.update_angle(mesh, roll_about(rotation, &self.axis))
    }

    /// Rotates every selected vertex by `angle` radians about the pivot.
    ///
    /// Each offset is re-expressed as a polar angle in the rotation plane,
    /// so only that angle changes; the radius and the component along the
    /// axis are kept from the start position.
    pub fn update_angle(&mut self, mesh: &mut MeshBuffer, angle: f64) -> Result<()> {
        check_sized(&self.starts, mesh)?;
        self.angle = wrap_angle(angle);
        let (u, w) = self.basis;
        for (v, start) in self.starts.iter() {
            let offset = start - self.pivot;
            let height = offset.dot(self.axis.as_ref());
            let planar = offset - self.axis.as_ref() * height;
            let radius = planar.norm();
            let theta = planar.dot(&w).atan2(planar.dot(&u)) + self.angle;
            mesh.vertices[usize::from(v)] = self.pivot
                + self.axis.as_ref() * height
                + (u * theta.cos() + w * theta.sin()) * radius;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
struct Radial {
    direction: Vector3<f64>,
    normalized_radius: f64,
}

/// Lays the selection out radially, driven by how far one vertex has been
/// dragged.
#[derive(Clone, Debug)]
pub struct Unfold {
    pivot: Vector3<f64>,
    starts: IndexedStore<Vertex, Vector3<f64>>,
    radials: IndexedStore<Vertex, Radial>,
    progress: f64,
    driver: Option<(Vertex, Vector3<f64>)>,
}

impl Unfold {
    /// Starts an unfold. Directions and radii come from `reference`, which
    /// must be parallel to the mesh's vertices; travel starts from the
    /// current positions.
    pub fn start(
        selection: &SelectionSet,
        mesh: &MeshBuffer,
        reference: &[Vector3<f64>],
    ) -> Result<Self> {
        if reference.len() != mesh.vertex_count() {
            return Err(Error::LengthMismatch {
                expected: mesh.vertex_count(),
                found: reference.len(),
            });
        }
        let starts = capture(selection, mesh)?;
        let pivot = Pivot::TopCentroid.resolve(selection, reference)?;

        let mut radials = IndexedStore::with_len(mesh.vertex_count());
        let mut max_radius: f64 = 0.0;
        for v in selection {
            let mut direction = pivot - reference[usize::from(v)];
            direction.z = 0.0;
            let radius = direction.norm();
            max_radius = max_radius.max(radius);
            radials.set(
                v,
                Radial {
                    direction: direction.try_normalize(0.0).unwrap_or_else(Vector3::zeros),
                    normalized_radius: radius,
                },
            );
        }
        for v in selection {
            let radial = &mut radials[v];
            radial.normalized_radius = if max_radius > 0.0 {
                radial.normalized_radius / max_radius
            } else {
                0.0
            };
        }

        log::debug!("unfold gesture started on {} vertices", starts.count());
        Ok(Self {
            pivot,
            starts,
            radials,
            progress: 0.0,
            driver: None,
        })
    }

    pub fn pivot(&self) -> Vector3<f64> {
        self.pivot
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn driver(&self) -> Option<Vertex> {
        self.driver.map(|(v, _)| v)
    }

    pub fn normalized_radius(&self, v: Vertex) -> Option<f64> {
        self.radials.get(v).map(|r| r.normalized_radius)
    }

    /// Moves every selected vertex from its start along its radial
    /// direction. Travel scales with the vertex's normalized radius and never
    /// exceeds `progress`.
    pub fn update_progress(&mut self, mesh: &mut MeshBuffer, progress: f64) -> Result<()> {
        check_sized(&self.starts, mesh)?;
        self.progress = progress.max(0.0);
        for (v, start) in self.starts.iter() {
            let radial = self.radials[v];
            let travel = (radial.normalized_radius * self.progress).clamp(0.0, self.progress);
            mesh.vertices[usize::from(v)] = start + radial.direction * travel;
        }
        Ok(())
    }

    /// Feeds the dragged position of `driver`. Progress is the distance the
    /// driver has moved since it became the driver; switching to another
    /// driver restarts from zero at that vertex's position.
    pub fn drive(
        &mut self,
        mesh: &mut MeshBuffer,
        driver: Vertex,
        position: Vector3<f64>,
    ) -> Result<()> {
        let current = self.driver;
        let anchor = match current {
            Some((v, anchor)) if v == driver => anchor,
            _ => {
                self.driver = Some((driver, position));
                self.progress = 0.0;
                position
            }
        };
        self.update_progress(mesh, (position - anchor).norm())
    }

    /// Re-applies the last progress and forgets the driver.
    pub fn commit(&mut self, mesh: &mut MeshBuffer) -> Result<()> {
        self.update_progress(mesh, self.progress)?;
        self.driver = None;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureKind {
    Idle,
    Moving,
    Rotating,
    Unfolding,
}

/// The single active group transform. Starting one finalizes the previous.
#[derive(Clone, Debug, Default)]
pub enum Gesture {
    #[default]
    Idle,
    Moving(MoveAll),
    Rotating(RotateAll),
    Unfolding(Unfold),
}

impl Gesture {
    pub fn kind(&self) -> GestureKind {
        match self {
            Gesture::Idle => GestureKind::Idle,
            Gesture::Moving(_) => GestureKind::Moving,
            Gesture::Rotating(_) => GestureKind::Rotating,
            Gesture::Unfolding(_) => GestureKind::Unfolding,
        }
    }

    /// Finalizes the active gesture and returns to idle. Returns whether the
    /// vertices were rewritten.
    pub fn commit(&mut self, mesh: &mut MeshBuffer) -> Result<bool> {
        let dirty = match std::mem::take(self) {
            Gesture::Unfolding(mut unfold) => {
                unfold.commit(mesh)?;
                true
            }
            Gesture::Idle | Gesture::Moving(_) | Gesture::Rotating(_) => false,
        };
        log::debug!("gesture committed");
        Ok(dirty)
    }

    pub fn begin_move(
        &mut self,
        selection: &SelectionSet,
        mesh: &mut MeshBuffer,
        mode: MoveMode,
    ) -> Result<bool> {
        let dirty = self.commit(mesh)?;
        *self = Gesture::Moving(MoveAll::start(selection, mesh, mode)?);
        Ok(dirty)
    }

    pub fn begin_rotate(
        &mut self,
        selection: &SelectionSet,
        mesh: &mut MeshBuffer,
        axis: Unit<Vector3<f64>>,
    ) -> Result<bool> {
        let dirty = self.commit(mesh)?;
        *self = Gesture::Rotating(RotateAll::start(selection, mesh, axis)?);
        Ok(dirty)
    }

    /// Starts an unfold using `reference` positions, or the current vertices
    /// if there is no reference.
    pub fn begin_unfold(
        &mut self,
        selection: &SelectionSet,
        mesh: &mut MeshBuffer,
        reference: Option<&[Vector3<f64>]>,
    ) -> Result<bool> {
        let dirty = self.commit(mesh)?;
        let unfold = match reference {
            Some(reference) => Unfold::start(selection, mesh, reference)?,
            None => Unfold::start(selection, mesh, &mesh.vertices)?,
        };
        *self = Gesture::Unfolding(unfold);
        Ok(dirty)
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::mesh::tests::{quad, v};

    const EPS: f64 = 1e-9;

    fn assert_close(a: &Vector3<f64>, b: &Vector3<f64>) {
        assert!((a - b).norm() < EPS, "{a:?} != {b:?}");
    }

    fn all_selected(mesh: &MeshBuffer) -> SelectionSet {
        (0..mesh.vertex_count()).map(Vertex::from).collect()
    }

    fn line_mesh(points: &[[f64; 3]]) -> MeshBuffer {
        MeshBuffer::new(points.iter().map(|p| Vector3::from(*p)).collect(), vec![])
            .expect("valid mesh")
    }

    #[test]
    fn test_empty_selection_is_rejected() {
        let mesh = quad();
        let empty = SelectionSet::new();
        assert!(matches!(
            MoveAll::start(&empty, &mesh, MoveMode::ByDelta),
            Err(Error::EmptySelection)
        ));
        assert!(matches!(
            RotateAll::start(&empty, &mesh, Vector3::z_axis()),
            Err(Error::EmptySelection)
        ));
        assert!(matches!(
            Unfold::start(&empty, &mesh, &mesh.vertices),
            Err(Error::EmptySelection)
        ));
    }

    #[test]
    fn test_pivots() {
        let mesh = line_mesh(&[[0., 0., 0.], [2., 0., 1.], [1., 3., -1.]]);
        let sel = all_selected(&mesh);
        assert_close(
            &Pivot::Centroid.resolve(&sel, &mesh.vertices).expect("pivot"),
            &Vector3::new(1., 1., 0.),
        );
        assert_close(
            &Pivot::TopCentroid.resolve(&sel, &mesh.vertices).expect("pivot"),
            &Vector3::new(1., 1., 1.),
        );
    }

    #[test]
    fn test_move_leaves_unselected_alone() {
        let mut mesh = quad();
        let sel: SelectionSet = [v(0), v(2)].into_iter().collect();
        let mut op = MoveAll::start(&sel, &mesh, MoveMode::ByDelta).expect("start");
        assert_close(&op.pivot(), &Vector3::new(0.5, 0.5, 0.));

        op.update(&mut mesh, Vector3::new(0., 0., 2.)).expect("update");
        op.update(&mut mesh, Vector3::new(0., 0., 1.)).expect("update");
        assert_close(&mesh.vertices[0], &Vector3::new(0., 0., 1.));
        assert_close(&mesh.vertices[2], &Vector3::new(1., 1., 1.));
        assert_close(&mesh.vertices[1], &Vector3::new(1., 0., 0.));
    }

    #[test]
    fn test_move_handle_in_camera_space() {
        let mut mesh = quad();
        let sel = all_selected(&mesh);
        let mut op = MoveAll::start(&sel, &mesh, MoveMode::ByDelta).expect("start");
        let camera = Isometry3::identity();

        // The selection follows the handle in X; camera Y is flipped.
        let handle = op.pivot() + Vector3::new(1., 2., 0.);
        assert!(op.drag_handle(&mut mesh, &handle, &camera).expect("drag"));
        assert_close(&op.offset(), &Vector3::new(1., -2., 0.));
        assert_close(&mesh.vertices[0], &Vector3::new(1., -2., 0.));

        let unchanged = op.handle_position();
        assert!(!op.drag_handle(&mut mesh, &unchanged, &camera).expect("drag"));
    }

    #[test]
    fn test_snap_to_point_merges_selection() {
        let mut mesh = quad();
        let sel: SelectionSet = [v(1), v(3)].into_iter().collect();
        let mut op = MoveAll::start(&sel, &mesh, MoveMode::SnapToPoint).expect("start");
        let target = Vector3::new(4., 4., 4.);
        op.snap_to(&mut mesh, &target).expect("snap");
        assert_eq!(mesh.vertices[1], target);
        assert_eq!(mesh.vertices[3], target);
        assert_eq!(mesh.vertices[0], Vector3::zeros());
    }

    #[test]
    fn test_update_after_vertex_count_change_is_outdated() {
        let mut mesh = quad();
        let mut op = MoveAll::start(&all_selected(&mesh), &mesh, MoveMode::ByDelta).expect("start");
        mesh.vertices.push(Vector3::zeros());
        assert!(matches!(
            op.update(&mut mesh, Vector3::x()),
            Err(Error::GestureOutdated)
        ));
    }

    #[test]
    fn test_rotate_identity_and_half_turn() {
        let mut mesh = quad();
        let baseline = mesh.vertices.clone();
        let sel = all_selected(&mesh);
        let mut op = RotateAll::start(&sel, &mesh, Vector3::z_axis()).expect("start");
        let pivot = op.pivot();

        op.update_angle(&mut mesh, 0.0).expect("update");
        for (a, b) in mesh.vertices.iter().zip(&baseline) {
            assert_close(a, b);
        }

        op.update_angle(&mut mesh, PI).expect("update");
        for (a, b) in mesh.vertices.iter().zip(&baseline) {
            assert_close(&(a - pivot), &-(b - pivot));
        }
    }

    #[test]
    fn test_rotate_quarter_turn_is_counterclockwise_about_axis() {
        let mut mesh = line_mesh(&[[1., 0., 0.], [-1., 0., 0.]]);
        let mut op = RotateAll::start(&all_selected(&mesh), &mesh, Vector3::z_axis()).expect("start");
        op.update_angle(&mut mesh, FRAC_PI_2).expect("update");
        assert_close(&mesh.vertices[0], &Vector3::new(0., 1., 0.));
        assert_close(&mesh.vertices[1], &Vector3::new(0., -1., 0.));
    }

    #[test]
    fn test_rotate_keeps_axial_component() {
        let mut mesh = line_mesh(&[[1., 0., 1.], [-1., 0., -1.]]);
        let mut op = RotateAll::start(&all_selected(&mesh), &mesh, Vector3::z_axis()).expect("start");
        op.update_angle(&mut mesh, PI).expect("update");
        assert_close(&mesh.vertices[0], &Vector3::new(-1., 0., 1.));
        assert_close(&mesh.vertices[1], &Vector3::new(1., 0., -1.));
    }

    #[test]
    fn test_rotate_uses_only_roll() {
        let mut mesh = line_mesh(&[[1., 0., 0.], [-1., 0., 0.]]);
        let mut op = RotateAll::start(&all_selected(&mesh), &mesh, Vector3::z_axis()).expect("start");
        let pitch = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.4);
        let roll = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.7);
        op.update(&mut mesh, &(pitch * roll)).expect("update");
        assert!((op.angle() - 0.7).abs() < EPS);
        assert_close(&mesh.vertices[0], &Vector3::new(0.7_f64.cos(), 0.7_f64.sin(), 0.));
    }

    #[test]
    fn test_rotate_about_view_axis() {
        let mut mesh = line_mesh(&[[0., 1., 0.], [0., -1., 0.]]);
        let mut op = RotateAll::start(&all_selected(&mesh), &mesh, Vector3::x_axis()).expect("start");
        op.update_angle(&mut mesh, FRAC_PI_2).expect("update");
        assert_close(&mesh.vertices[0], &Vector3::new(0., 0., 1.));
    }

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(3.0 * PI) - PI).abs() < EPS);
        assert!((wrap_angle(-FRAC_PI_2) + FRAC_PI_2).abs() < EPS);
        assert!((wrap_angle(TAU + 0.25) - 0.25).abs() < EPS);
        assert_eq!(wrap_angle(0.0), 0.0);
    }

    /// Radii 0.5, 1.0 and 0.5 from a pivot at the origin; the middle vertex
    /// sets the pivot height.
    fn unfold_mesh() -> MeshBuffer {
        line_mesh(&[[0.5, 0., 0.], [-1., 0., 1.], [0.5, 0., 0.]])
    }

    #[test]
    fn test_unfold_scales_travel_by_radius() {
        let mut mesh = unfold_mesh();
        let baseline = mesh.vertices.clone();
        let mut op = Unfold::start(&all_selected(&mesh), &mesh, &baseline).expect("start");
        assert_close(&op.pivot(), &Vector3::new(0., 0., 1.));
        assert_eq!(op.normalized_radius(v(0)), Some(0.5));
        assert_eq!(op.normalized_radius(v(1)), Some(1.0));

        op.update_progress(&mut mesh, 0.0).expect("update");
        assert_eq!(mesh.vertices, baseline);

        op.update_progress(&mut mesh, 2.0).expect("update");
        assert_close(&(mesh.vertices[0] - baseline[0]), &Vector3::new(-1., 0., 0.));
        assert_close(&(mesh.vertices[1] - baseline[1]), &Vector3::new(2., 0., 0.));
    }

    #[test]
    fn test_unfold_vertex_at_pivot_stays_put() {
        let mut mesh = line_mesh(&[[0., 0., 0.], [0., 0., 0.]]);
        let baseline = mesh.vertices.clone();
        let mut op = Unfold::start(&all_selected(&mesh), &mesh, &baseline).expect("start");
        op.update_progress(&mut mesh, 3.0).expect("update");
        assert_eq!(mesh.vertices, baseline);
    }

    #[test]
    fn test_unfold_reference_length_must_match() {
        let mesh = unfold_mesh();
        let short = vec![Vector3::zeros(); 2];
        assert!(matches!(
            Unfold::start(&all_selected(&mesh), &mesh, &short),
            Err(Error::LengthMismatch { expected: 3, found: 2 })
        ));
    }

    #[test]
    fn test_unfold_driver_switch_resets_progress() {
        let mut mesh = unfold_mesh();
        let baseline = mesh.vertices.clone();
        let mut op = Unfold::start(&all_selected(&mesh), &mesh, &baseline).expect("start");

        let anchor = Vector3::new(5., 5., 5.);
        op.drive(&mut mesh, v(1), anchor).expect("drive");
        assert_eq!(op.progress(), 0.0);
        op.drive(&mut mesh, v(1), anchor + Vector3::new(0., 2., 0.)).expect("drive");
        assert!((op.progress() - 2.0).abs() < EPS);
        assert_eq!(op.driver(), Some(v(1)));

        op.drive(&mut mesh, v(0), Vector3::new(9., 9., 9.)).expect("drive");
        assert_eq!(op.progress(), 0.0);
        assert_eq!(op.driver(), Some(v(0)));
        assert_eq!(mesh.vertices, baseline);
    }

    #[test]
    fn test_switching_gesture_commits_unfold() {
        let mut mesh = unfold_mesh();
        let baseline = mesh.vertices.clone();
        let sel = all_selected(&mesh);
        let mut gesture = Gesture::default();
        gesture.begin_unfold(&sel, &mut mesh, None).expect("begin");
        assert_eq!(gesture.kind(), GestureKind::Unfolding);

        if let Gesture::Unfolding(unfold) = &mut gesture {
            unfold.update_progress(&mut mesh, 2.0).expect("update");
        }
        // Something else clobbers the positions before the switch.
        mesh.vertices = baseline.clone();

        assert!(gesture.begin_move(&sel, &mut mesh, MoveMode::ByDelta).expect("begin"));
        assert_eq!(gesture.kind(), GestureKind::Moving);
        assert_close(&(mesh.vertices[1] - baseline[1]), &Vector3::new(2., 0., 0.));

        assert!(!gesture.begin_rotate(&sel, &mut mesh, Vector3::z_axis()).expect("begin"));
        assert_eq!(gesture.kind(), GestureKind::Rotating);
        assert!(!gesture.commit(&mut mesh).expect("commit"));
        assert_eq!(gesture.kind(), GestureKind::Idle);
    }

    #[test]
    fn test_failed_begin_leaves_idle() {
        let mut mesh = quad();
        let mut gesture = Gesture::default();
        gesture
            .begin_move(&all_selected(&mesh), &mut mesh, MoveMode::ByDelta)
            .expect("begin");
        let result = gesture.begin_rotate(&SelectionSet::new(), &mut mesh, Vector3::z_axis());
        assert!(matches!(result, Err(Error::EmptySelection)));
        assert_eq!(gesture.kind(), GestureKind::Idle);
    }

    proptest! {
        #[test]
        fn proptest_move_adds_offset(
            dx in -10.0..10.0_f64,
            dy in -10.0..10.0_f64,
            dz in -10.0..10.0_f64,
            mask in prop::collection::vec(any::<bool>(), 4),
        ) {
            let mut mesh = quad();
            let before = mesh.vertices.clone();
            let sel: SelectionSet = (0..4).filter(|&i| mask[i]).map(Vertex::from).collect();
            prop_assume!(!sel.is_empty());

            let d = Vector3::new(dx, dy, dz);
            let mut op = MoveAll::start(&sel, &mesh, MoveMode::ByDelta).expect("start");
            op.update(&mut mesh, d).expect("update");
            for i in 0..4 {
                let expected = if mask[i] { before[i] + d } else { before[i] };
                prop_assert_eq!(mesh.vertices[i], expected);
            }
        }
    }
}
