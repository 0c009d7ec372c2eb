//! Z-buffered triangle rasterizer with a camera headlight.

use glam::{DVec3, DVec4};
use image::{Rgb, RgbImage};

use crate::render::camera::Camera;
use crate::render::vtp::PolyData;

const SURFACE: [f64; 3] = [214.0, 218.0, 226.0];
const AMBIENT: f64 = 0.12;

#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    x: f64,
    y: f64,
    depth: f64,
}

/// Render `poly` as seen from `camera` onto a fresh `width`×`height` image.
pub fn rasterize(
    poly: &PolyData,
    camera: &Camera,
    width: u32,
    height: u32,
    background: [u8; 3],
) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, Rgb(background));
    let mut depth = vec![f64::INFINITY; (width as usize) * (height as usize)];

    let aspect = width as f64 / height.max(1) as f64;
    let clip_from_world = camera.projection_matrix(aspect) * camera.view_matrix();
    let (w, h) = (width as f64, height as f64);

    let project = |p: DVec3| -> Option<ScreenVertex> {
        let clip: DVec4 = clip_from_world * p.extend(1.0);
        if clip.w <= f64::EPSILON {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        Some(ScreenVertex {
            x: (ndc.x + 1.0) * 0.5 * w,
            y: (1.0 - ndc.y) * 0.5 * h,
            depth: ndc.z,
        })
    };

    let projected: Vec<Option<ScreenVertex>> = poly.points.iter().map(|p| project(*p)).collect();

    for tri in &poly.triangles {
        let [i0, i1, i2] = tri.map(|i| i as usize);
        let (Some(a), Some(b), Some(c)) = (projected[i0], projected[i1], projected[i2]) else {
            continue;
        };
        let (p0, p1, p2) = (poly.points[i0], poly.points[i1], poly.points[i2]);
        let normal = (p1 - p0).cross(p2 - p0).normalize_or_zero();
        let centroid = (p0 + p1 + p2) / 3.0;
        let to_eye = (camera.position - centroid).normalize_or_zero();
        // Two-sided lighting
        let intensity = (AMBIENT + (1.0 - AMBIENT) * normal.dot(to_eye).abs()).min(1.0);
        let color = Rgb(SURFACE.map(|c| (c * intensity).round() as u8));

        fill_triangle(&mut image, &mut depth, a, b, c, color);
    }
    image
}

fn edge(a: &ScreenVertex, b: &ScreenVertex, x: f64, y: f64) -> f64 {
    (b.x - a.x) * (y - a.y) - (b.y - a.y) * (x - a.x)
}

fn fill_triangle(
    image: &mut RgbImage,
    depth: &mut [f64],
    a: ScreenVertex,
    b: ScreenVertex,
    c: ScreenVertex,
    color: Rgb<u8>,
) {
    let area = edge(&a, &b, c.x, c.y);
    if area.abs() < f64::EPSILON {
        return;
    }
    let (width, height) = image.dimensions();
    let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as u32;
    let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as u32;
    let max_x = (a.x.max(b.x).max(c.x).ceil() as i64).min(width as i64 - 1);
    let max_y = (a.y.max(b.y).max(c.y).ceil() as i64).min(height as i64 - 1);
    if max_x < 0 || max_y < 0 {
        return;
    }

    for y in min_y..=max_y as u32 {
        for x in min_x..=max_x as u32 {
            let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
            let w0 = edge(&b, &c, px, py) / area;
            let w1 = edge(&c, &a, px, py) / area;
            let w2 = edge(&a, &b, px, py) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let z = w0 * a.depth + w1 * b.depth + w2 * c.depth;
            if !(-1.0..=1.0).contains(&z) {
                continue;
            }
            let slot = (y * width + x) as usize;
            if z < depth[slot] {
                depth[slot] = z;
                image.put_pixel(x, y, color);
            }
        }
    }
}
