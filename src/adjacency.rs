use std::collections::BTreeSet;

use crate::mesh::{Face, MeshBuffer, Vertex};

/// A triangle rotated so that its first corner is the queried vertex.
///
/// The winding is preserved, so `[root, a, b]` has the two edges `root-a`
/// and `root-b` emanating from the root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectedTriangle {
    pub face: Face,
    pub corners: [Vertex; 3],
}

impl ConnectedTriangle {
    pub fn root(&self) -> Vertex {
        self.corners[0]
    }

    /// The two edges that start at the root.
    pub fn root_edges(&self) -> [(Vertex, Vertex); 2] {
        let [r, a, b] = self.corners;
        [(r, a), (r, b)]
    }
}

/// On-demand query of the triangles around one vertex, for connectivity
/// display. Each query scans every triangle.
#[derive(Clone, Debug, Default)]
pub struct AdjacencyQuery {
    vertex: Option<Vertex>,
    triangles: BTreeSet<ConnectedTriangle>,
}

impl AdjacencyQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current result with the triangles around `vertex`.
    pub fn connected_triangles(
        &mut self,
        mesh: &MeshBuffer,
        vertex: Vertex,
    ) -> &BTreeSet<ConnectedTriangle> {
        self.triangles = connected_triangles(mesh, vertex);
        self.vertex = Some(vertex);
        &self.triangles
    }

    pub fn vertex(&self) -> Option<Vertex> {
        self.vertex
    }

    pub fn triangles(&self) -> &BTreeSet<ConnectedTriangle> {
        &self.triangles
    }

    pub fn clear(&mut self) {
        self.vertex = None;
        self.triangles.clear();
    }
}

pub fn connected_triangles(mesh: &MeshBuffer, vertex: Vertex) -> BTreeSet<ConnectedTriangle> {
    mesh.faces()
        .filter_map(|face| {
            let root = face.corner_of(mesh, vertex)?;
            let a = root.next();
            let b = a.next();
            Some(ConnectedTriangle {
                face,
                corners: [vertex, a.to_vertex(mesh), b.to_vertex(mesh)],
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use nalgebra::Vector3;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mesh::tests::{quad, v};

    #[test]
    fn test_rerooted_by_rotation() {
        let mesh = quad();
        let found = connected_triangles(&mesh, v(2));
        let corners: Vec<[Vertex; 3]> = found.iter().map(|t| t.corners).collect();
        // [0, 1, 2] -> [2, 0, 1] and [0, 2, 3] -> [2, 3, 0]
        assert_eq!(corners, vec![[v(2), v(0), v(1)], [v(2), v(3), v(0)]]);
        for t in &found {
            assert_eq!(t.root(), v(2));
        }
    }

    #[test]
    fn test_isolated_vertex_has_no_triangles() {
        let mut mesh = quad();
        mesh.vertices.push(Vector3::new(5., 5., 5.));
        assert!(connected_triangles(&mesh, v(4)).is_empty());
    }

    #[test]
    fn test_query_and_clear() {
        let mesh = quad();
        let mut query = AdjacencyQuery::new();
        assert_eq!(query.connected_triangles(&mesh, v(1)).len(), 1);
        assert_eq!(query.vertex(), Some(v(1)));
        let edges = query.triangles().iter().next().map(|t| t.root_edges());
        assert_eq!(edges, Some([(v(1), v(2)), (v(1), v(0))]));

        query.clear();
        assert!(query.triangles().is_empty());
        assert_eq!(query.vertex(), None);
    }
}
