//! Selection exchange through textures.
//!
//! Export marks one white texel per selected vertex at its UV on a black
//! image. Import selects every vertex whose bilinearly sampled red channel is
//! non-zero. Row 0 of the image is the top, so `v` is flipped to keep `v = 0`
//! at the bottom.

use std::path::Path;

use image::{DynamicImage, ImageFormat, Rgba, Rgba32FImage, RgbaImage};
use nalgebra::Vector2;

use crate::error::{Error, Result};
use crate::mesh::Vertex;
use crate::selection::SelectionSet;

const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    Jpg,
    Png,
    Tga,
    Exr,
}

impl TextureFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jpg") => Ok(Self::Jpg),
            Some("png") => Ok(Self::Png),
            Some("tga") => Ok(Self::Tga),
            Some("exr") => Ok(Self::Exr),
            _ => Err(Error::UnsupportedFormat(path.to_owned())),
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::Tga => ImageFormat::Tga,
            Self::Exr => ImageFormat::OpenExr,
        }
    }

    /// Converts to a pixel layout the encoder accepts.
    fn encodable(self, image: RgbaImage) -> DynamicImage {
        let image = DynamicImage::ImageRgba8(image);
        match self {
            Self::Jpg => DynamicImage::ImageRgb8(image.to_rgb8()),
            Self::Png | Self::Tga => image,
            Self::Exr => DynamicImage::ImageRgba32F(image.to_rgba32f()),
        }
    }
}

/// Renders the selection into a `size` x `size` mask.
pub fn render_selection(
    selection: &SelectionSet,
    uvs: &[Vector2<f64>],
    size: u32,
) -> Result<RgbaImage> {
    let mut image = RgbaImage::from_pixel(size, size, BLACK);
    if size == 0 {
        return Ok(image);
    }
    for v in selection {
        let uv = uv_of(uvs, v)?;
        let x = texel(uv.x, size);
        let y = size - 1 - texel(uv.y, size);
        image.put_pixel(x, y, WHITE);
    }
    Ok(image)
}

/// Writes the selection mask to `path`, choosing the encoding from the
/// extension. Unsupported extensions fail before anything is rendered.
pub fn export_selection<P: AsRef<Path>>(
    path: P,
    size: u32,
    selection: &SelectionSet,
    uvs: &[Vector2<f64>],
) -> Result<()> {
    let path = path.as_ref();
    let format = TextureFormat::from_path(path)?;
    let image = render_selection(selection, uvs, size)?;
    format
        .encodable(image)
        .save_with_format(path, format.image_format())?;
    log::debug!(
        "exported {} selected vertices to {}",
        selection.len(),
        path.display()
    );
    Ok(())
}

/// Selects every vertex whose UV samples a non-zero red channel.
pub fn select_from_image(image: &Rgba32FImage, uvs: &[Vector2<f64>]) -> SelectionSet {
    uvs.iter()
        .enumerate()
        .filter(|(_, uv)| sample_red(image, uv) != 0.0)
        .map(|(i, _)| Vertex::from(i))
        .collect()
}

pub fn import_selection<P: AsRef<Path>>(path: P, uvs: &[Vector2<f64>]) -> Result<SelectionSet> {
    let image = image::open(path)?.to_rgba32f();
    Ok(select_from_image(&image, uvs))
}

fn uv_of(uvs: &[Vector2<f64>], v: Vertex) -> Result<&Vector2<f64>> {
    let i = usize::from(v);
    uvs.get(i).ok_or(Error::VertexOutOfRange {
        index: i,
        len: uvs.len(),
    })
}

fn texel(coord: f64, size: u32) -> u32 {
    ((coord * size as f64) as i64).clamp(0, size as i64 - 1) as u32
}

/// Bilinear sample of the red channel with texel centers at half-integers
/// and clamped edges.
fn sample_red(image: &Rgba32FImage, uv: &Vector2<f64>) -> f32 {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return 0.0;
    }
    let fx = uv.x * w as f64 - 0.5;
    let fy = (1.0 - uv.y) * h as f64 - 0.5;
    let (x0, y0) = (fx.floor(), fy.floor());
    let (tx, ty) = ((fx - x0) as f32, (fy - y0) as f32);

    let clamp = |c: f64, len: u32| (c as i64).clamp(0, len as i64 - 1) as u32;
    let red = |x: f64, y: f64| image.get_pixel(clamp(x, w), clamp(y, h)).0[0];

    let top = red(x0, y0) * (1.0 - tx) + red(x0 + 1.0, y0) * tx;
    let bottom = red(x0, y0 + 1.0) * (1.0 - tx) + red(x0 + 1.0, y0 + 1.0) * tx;
    top * (1.0 - ty) + bottom * ty
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mesh::tests::v;

    fn uvs() -> Vec<Vector2<f64>> {
        vec![
            Vector2::new(0.1, 0.1),
            Vector2::new(0.5, 0.5),
            Vector2::new(0.9, 0.2),
            Vector2::new(1.0, 1.0),
        ]
    }

    fn set(indices: &[usize]) -> SelectionSet {
        indices.iter().map(|&i| v(i)).collect()
    }

    #[test]
    fn test_render_places_texels_with_v_up() {
        let image = render_selection(&set(&[0, 3]), &uvs(), 16).expect("render");
        // u = 0.1, v = 0.1 -> texel (1, 1) counted from the bottom.
        assert_eq!(*image.get_pixel(1, 14), WHITE);
        // u = v = 1.0 clamps into the top-right texel.
        assert_eq!(*image.get_pixel(15, 0), WHITE);
        let white = image.pixels().filter(|p| **p == WHITE).count();
        assert_eq!(white, 2);
        assert_eq!(*image.get_pixel(8, 8), BLACK);
    }

    #[test]
    fn test_render_rejects_missing_uv() {
        assert!(matches!(
            render_selection(&set(&[9]), &uvs(), 16),
            Err(Error::VertexOutOfRange { index: 9, len: 4 })
        ));
    }

    #[test]
    fn test_unsupported_extension_fails_before_writing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mask.bmp");
        let err = export_selection(&path, 16, &set(&[0]), &uvs());
        assert!(matches!(err, Err(Error::UnsupportedFormat(_))));
        assert!(!path.exists());
        assert!(TextureFormat::from_path(Path::new("mask")).is_err());
    }

    #[test]
    fn test_png_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mask.png");
        export_selection(&path, 32, &set(&[1, 2]), &uvs()).expect("export");
        assert_eq!(import_selection(&path, &uvs()).expect("import"), set(&[1, 2]));
    }

    #[test]
    fn test_tga_and_exr_are_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["mask.tga", "mask.exr"] {
            let path = dir.path().join(name);
            export_selection(&path, 32, &set(&[1]), &uvs()).expect("export");
            assert_eq!(import_selection(&path, &uvs()).expect("import"), set(&[1]));
        }
    }
}
