use std::collections::HashMap;
use std::path::Path;

use derive_more::{Display, From, Into};
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::idx::Index;

#[derive(
    Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash, Debug, From, Into, Display, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Vertex(usize);

#[derive(Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash, Debug, From, Into, Display)]
pub struct Face(usize);

#[derive(Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash, Debug)]
pub struct Corner {
    pub face: Face,
    pub index: usize,
}

impl Index for Vertex {}

/// Vertex data of the mesh being edited.
///
/// Positions, normals and UVs are parallel arrays of length `V`; every
/// triangle corner indexes into them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshBuffer {
    pub vertices: Vec<Vector3<f64>>,
    pub normals: Vec<Vector3<f64>>,
    pub uvs: Vec<Vector2<f64>>,
    pub triangles: Vec<[Vertex; 3]>,
}

impl MeshBuffer {
    /// Builds a buffer from positions and triangles, computing normals and
    /// leaving UVs zeroed.
    pub fn new(vertices: Vec<Vector3<f64>>, triangles: Vec<[Vertex; 3]>) -> Result<Self> {
        let len = vertices.len();
        let mut mesh = Self {
            vertices,
            normals: vec![Vector3::zeros(); len],
            uvs: vec![Vector2::zeros(); len],
            triangles,
        };
        mesh.validate()?;
        mesh.recompute_normals();
        Ok(mesh)
    }

    pub fn with_uvs(mut self, uvs: Vec<Vector2<f64>>) -> Result<Self> {
        if uvs.len() != self.vertices.len() {
            return Err(Error::LengthMismatch {
                expected: self.vertices.len(),
                found: uvs.len(),
            });
        }
        self.uvs = uvs;
        Ok(self)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn faces(&self) -> impl Iterator<Item = Face> {
        (0..self.triangles.len()).map(Face)
    }

    pub fn position(&self, v: Vertex) -> Option<&Vector3<f64>> {
        self.vertices.get(v.0)
    }

    pub fn check_vertex(&self, v: Vertex) -> Result<()> {
        if v.is_valid(self) {
            Ok(())
        } else {
            Err(Error::VertexOutOfRange {
                index: v.0,
                len: self.vertices.len(),
            })
        }
    }

    /// Checks that the per-vertex arrays agree in length and that every
    /// triangle references an existing vertex.
    pub fn validate(&self) -> Result<()> {
        let len = self.vertices.len();
        for found in [self.normals.len(), self.uvs.len()] {
            if found != len {
                return Err(Error::LengthMismatch { expected: len, found });
            }
        }
        for tri in &self.triangles {
            for v in tri {
                self.check_vertex(*v)?;
            }
        }
        Ok(())
    }

    /// Recomputes per-vertex normals as the area-weighted sum of the normals
    /// of the faces touching each vertex.
    pub fn recompute_normals(&mut self) {
        let mut sums = vec![Vector3::zeros(); self.vertices.len()];
        for f in self.faces() {
            let n = f.area_normal(self);
            for v in f.to_vertices(self) {
                sums[v.0] += n;
            }
        }
        for n in &mut sums {
            if n.norm_squared() != 0. {
                n.normalize_mut();
            }
        }
        self.normals = sums;
    }

    pub fn load_obj<P: AsRef<Path>>(path: P) -> Result<Self> {
        let obj = obj::Obj::load(path.as_ref())?;
        Self::from_obj(&obj.data)
    }

    /// Converts OBJ data into a buffer with one vertex per distinct
    /// position/uv/normal tuple, the way renderers split seams. Polygons are
    /// fan-triangulated.
    pub fn from_obj(data: &obj::ObjData) -> Result<Self> {
        let mut mesh = Self::default();
        let mut tuple_to_vertex: HashMap<(usize, Option<usize>, Option<usize>), Vertex> =
            HashMap::new();

        let polys = data
            .objects
            .iter()
            .flat_map(|o| &o.groups)
            .flat_map(|g| &g.polys);
        for poly in polys {
            let mut corners = Vec::with_capacity(poly.0.len());
            for tuple in &poly.0 {
                let key = (tuple.0, tuple.1, tuple.2);
                let v = match tuple_to_vertex.get(&key) {
                    Some(v) => *v,
                    None => {
                        let v = Vertex(mesh.vertices.len());
                        let p = lookup_obj(&data.position, tuple.0)?;
                        mesh.vertices.push(Vector3::new(p[0], p[1], p[2]).cast());
                        let uv: Vector2<f64> = match tuple.1 {
                            Some(t) => Vector2::from(*lookup_obj(&data.texture, t)?).cast(),
                            None => Vector2::zeros(),
                        };
                        mesh.uvs.push(uv);
                        tuple_to_vertex.insert(key, v);
                        v
                    }
                };
                corners.push(v);
            }
            for i in 1..corners.len().saturating_sub(1) {
                mesh.triangles.push([corners[0], corners[i], corners[i + 1]]);
            }
        }
        mesh.normals = vec![Vector3::zeros(); mesh.vertices.len()];
        mesh.recompute_normals();
        Ok(mesh)
    }
}

fn lookup_obj<T>(array: &[T], index: usize) -> Result<&T> {
    array.get(index).ok_or(Error::VertexOutOfRange {
        index,
        len: array.len(),
    })
}

pub struct FaceCornersIter {
    face: Face,
    index: usize,
    count: usize,
}

impl Iterator for FaceCornersIter {
    type Item = Corner;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let index = self.index;
        self.index += 1;
        Some(Corner {
            face: self.face,
            index,
        })
    }
}

impl Face {
    pub fn to_vertices(self, mesh: &MeshBuffer) -> &[Vertex; 3] {
        &mesh.triangles[self.0]
    }

    pub fn corners(&self) -> FaceCornersIter {
        FaceCornersIter {
            face: *self,
            index: 0,
            count: 3,
        }
    }

    /// Returns the corner of this face that references `v`, if any.
    pub fn corner_of(&self, mesh: &MeshBuffer, v: Vertex) -> Option<Corner> {
        self.corners().find(|c| c.to_vertex(mesh) == v)
    }

    /// Face normal scaled by twice the triangle's area.
    pub fn area_normal(&self, mesh: &MeshBuffer) -> Vector3<f64> {
        let [a, b, c] = *self.to_vertices(mesh);
        let a = mesh.vertices[a.0];
        (mesh.vertices[b.0] - a).cross(&(mesh.vertices[c.0] - a))
    }
}

impl Vertex {
    pub fn to_point(self, mesh: &MeshBuffer) -> &Vector3<f64> {
        &mesh.vertices[self.0]
    }

    pub fn is_valid(&self, mesh: &MeshBuffer) -> bool {
        self.0 < mesh.vertices.len()
    }
}

impl Corner {
    pub fn to_vertex(self, mesh: &MeshBuffer) -> Vertex {
        mesh.triangles[self.face.0][self.index]
    }

    pub fn next(&self) -> Corner {
        Self {
            face: self.face,
            index: (self.index + 1) % 3,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    pub(crate) fn v(i: usize) -> Vertex {
        Vertex::from(i)
    }

    /// Unit quad in the XY plane split into two triangles.
    pub(crate) fn quad() -> MeshBuffer {
        MeshBuffer::new(
            vec![
                Vector3::new(0., 0., 0.),
                Vector3::new(1., 0., 0.),
                Vector3::new(1., 1., 0.),
                Vector3::new(0., 1., 0.),
            ],
            vec![[v(0), v(1), v(2)], [v(0), v(2), v(3)]],
        )
        .expect("valid quad")
    }

    #[test]
    fn test_rejects_out_of_range_triangle() {
        let err = MeshBuffer::new(vec![Vector3::zeros(); 2], vec![[v(0), v(1), v(2)]]);
        assert!(matches!(
            err,
            Err(Error::VertexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_normals_point_up_for_ccw_quad() {
        let mesh = quad();
        for n in &mesh.normals {
            assert!((n - Vector3::z()).norm() < 1e-12);
        }
    }

    #[test]
    fn test_corner_walk() {
        let mesh = quad();
        let f = Face::from(1);
        let c = f.corner_of(&mesh, v(3)).expect("corner");
        assert_eq!(c.index, 2);
        assert_eq!(c.next().to_vertex(&mesh), v(0));
        assert_eq!(c.next().next().to_vertex(&mesh), v(2));
        assert_eq!(c.next().next().next(), c);
    }

    #[test]
    fn test_obj_uv_seams_split_vertices() {
        let text = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vt 0.5 0.5
f 1/1 2/2 3/3 4/4
f 2/5 1/1 4/4
";
        let data = obj::ObjData::load_buf(text.as_bytes()).expect("valid obj");
        let mesh = MeshBuffer::from_obj(&data).expect("convert");
        // The second position is used with two different UVs.
        assert_eq!(mesh.vertex_count(), 5);
        assert_eq!(mesh.face_count(), 3);
        assert_eq!(mesh.triangles[0], [v(0), v(1), v(2)]);
        assert_eq!(mesh.triangles[1], [v(0), v(2), v(3)]);
        assert_eq!(mesh.triangles[2], [v(4), v(0), v(3)]);
        assert_eq!(mesh.vertices[4], mesh.vertices[1]);
        assert_eq!(mesh.uvs[4], Vector2::new(0.5, 0.5));
        mesh.validate().expect("valid");
    }

    #[test]
    fn test_with_uvs_checks_length() {
        let mesh = quad();
        assert!(mesh.clone().with_uvs(vec![Vector2::zeros(); 3]).is_err());
        let mesh = mesh.with_uvs(vec![Vector2::new(0.5, 0.5); 4]).expect("uvs");
        assert_eq!(mesh.uvs[3], Vector2::new(0.5, 0.5));
    }
}
