use std::path::{Path, PathBuf};

use eyre::{Context, Result, eyre};
use seamweld::coincidence::CoincidenceIndex;
use seamweld::{EditSession, MeshBuffer, ToolConfig, Vertex, adjacency};
use serde::Serialize;

/// Seamweld command-line interface
///
/// Inspects seams and connectivity of OBJ meshes and converts vertex
/// selections between index lists and UV textures.
#[derive(Debug, clap::Parser)]
#[command(version)]
pub(crate) struct Args {
    /// JSON tool configuration.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub subcommand: Subcommand,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Subcommand {
    /// Print vertex, triangle and seam counts of a mesh as JSON.
    Info {
        /// OBJ file.
        mesh: PathBuf,
    },
    /// Print every vertex sharing the position of a vertex.
    Coincident {
        /// OBJ file.
        mesh: PathBuf,
        vertex: usize,
    },
    /// Print the triangles around a vertex, rotated to start at it.
    Connectivity {
        /// OBJ file.
        mesh: PathBuf,
        vertex: usize,
    },
    /// Render a selection file into a texture over the mesh's UVs.
    ExportTexture {
        /// OBJ file.
        mesh: PathBuf,
        /// Plain index list.
        selection: PathBuf,
        /// Output image (jpg, png, tga or exr).
        output: PathBuf,
        /// Edge length in texels; defaults to the configured size.
        #[arg(short, long)]
        size: Option<u32>,
    },
    /// Select the vertices marked in a texture and write them as an index
    /// list.
    ImportTexture {
        /// OBJ file.
        mesh: PathBuf,
        /// Input image.
        texture: PathBuf,
        /// Output index list.
        output: PathBuf,
    },
}

#[derive(Serialize)]
struct MeshInfo {
    vertices: usize,
    triangles: usize,
    coincident_groups: usize,
    coincident_vertices: usize,
}

#[derive(Serialize)]
struct TriangleInfo {
    face: usize,
    corners: [Vertex; 3],
}

pub(crate) fn exec(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => ToolConfig::load(path)
            .wrap_err_with(|| format!("error loading config {}", path.display()))?,
        None => ToolConfig::default(),
    };

    match args.subcommand {
        Subcommand::Info { mesh } => {
            let mesh = load_mesh(&mesh)?;
            let mut index = CoincidenceIndex::with_quantum(config.weld_quantum);
            index.rebuild(&mesh.vertices);
            let (groups, vertices) = index
                .duplicate_groups()
                .fold((0, 0), |(g, v), group| (g + 1, v + group.len()));
            write_json_output(&MeshInfo {
                vertices: mesh.vertex_count(),
                triangles: mesh.face_count(),
                coincident_groups: groups,
                coincident_vertices: vertices,
            })
        }

        Subcommand::Coincident { mesh, vertex } => {
            let mesh = load_mesh(&mesh)?;
            let vertex = Vertex::from(vertex);
            mesh.check_vertex(vertex)?;
            let mut index = CoincidenceIndex::with_quantum(config.weld_quantum);
            index.rebuild(&mesh.vertices);
            let mut group = index
                .lookup(vertex.to_point(&mesh))
                .ok_or_else(|| eyre!("coincidence index could not be built"))?
                .to_vec();
            group.sort();
            write_json_output(&group)
        }

        Subcommand::Connectivity { mesh, vertex } => {
            let mesh = load_mesh(&mesh)?;
            let vertex = Vertex::from(vertex);
            mesh.check_vertex(vertex)?;
            let triangles: Vec<TriangleInfo> = adjacency::connected_triangles(&mesh, vertex)
                .into_iter()
                .map(|t| TriangleInfo {
                    face: t.face.into(),
                    corners: t.corners,
                })
                .collect();
            write_json_output(&triangles)
        }

        Subcommand::ExportTexture {
            mesh,
            selection,
            output,
            size,
        } => {
            let config = ToolConfig {
                texture_size: size.unwrap_or(config.texture_size),
                ..config
            };
            let mut session = EditSession::new(load_mesh(&mesh)?, config)?;
            session
                .load_index_list(&selection)
                .wrap_err_with(|| format!("error reading selection {}", selection.display()))?;
            session
                .export_texture(&output)
                .wrap_err_with(|| format!("error writing texture {}", output.display()))?;
            log::info!(
                "wrote {} selected vertices to {}",
                session.selection().len(),
                output.display()
            );
            Ok(())
        }

        Subcommand::ImportTexture {
            mesh,
            texture,
            output,
        } => {
            let mut session = EditSession::new(load_mesh(&mesh)?, config)?;
            session
                .import_texture(&texture)
                .wrap_err_with(|| format!("error reading texture {}", texture.display()))?;
            session.save_index_list(&output)?;
            log::info!(
                "wrote {} selected vertices to {}",
                session.selection().len(),
                output.display()
            );
            Ok(())
        }
    }
}

fn load_mesh(path: &Path) -> Result<MeshBuffer> {
    MeshBuffer::load_obj(path).wrap_err_with(|| format!("error loading mesh {}", path.display()))
}

fn write_json_output<T: Serialize>(value: &T) -> Result<()> {
    serde_json::to_writer_pretty(std::io::stdout(), value)
        .context("error serializing data and writing to stdout")?;
    println!();
    Ok(())
}
