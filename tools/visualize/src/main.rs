//! Diagnostic visualizer: writes PNG slices of the noise and scalar fields
//! through the z = 0 plane to data/debug/.
//! Not part of the main pipeline; no tests, no clippy target.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use glam::DVec3;
use portal_core::field::{FieldSource, JuliaSet, JuliaSettings, ScalarField};
use portal_core::mesh::Mesh;
use portal_core::noise::{NoiseParams, VersorMap};
use portal_core::portal::{PortalMap, PortalTransform};

const W: usize = 384;
const H: usize = 384;
/// Half-width of the sampled square in world units.
const EXTENT: f64 = 2.0;

// ── Colour helpers ────────────────────────────────────────────────────────────

/// Signed value → diverging map: negative = blue, positive = red, zero = white.
fn diverging(v: f64, range: f64) -> [u8; 3] {
    if !v.is_finite() {
        return [40, 0, 0];
    }
    let t = (v / range).clamp(-1.0, 1.0);
    let fade = (255.0 * (1.0 - t.abs())) as u8;
    if t < 0.0 {
        [fade, fade, 255]
    } else {
        [255, fade, fade]
    }
}

/// Unit direction → RGB, each component mapped from [-1, 1] to [0, 255].
fn direction_rgb(d: DVec3) -> [u8; 3] {
    let c = (d * 0.5 + DVec3::splat(0.5)).clamp(DVec3::ZERO, DVec3::ONE) * 255.0;
    [c.x as u8, c.y as u8, c.z as u8]
}

fn gray(v: f64) -> [u8; 3] {
    let c = (v.clamp(0.0, 1.0) * 255.0) as u8;
    [c, c, c]
}

// ── Slicing ───────────────────────────────────────────────────────────────────

fn world(r: usize, c: usize) -> DVec3 {
    let x = (c as f64 / (W - 1) as f64 * 2.0 - 1.0) * EXTENT;
    let y = (1.0 - r as f64 / (H - 1) as f64 * 2.0) * EXTENT;
    DVec3::new(x, y, 0.0)
}

fn render(out_dir: &Path, name: &str, pixel: impl Fn(DVec3) -> [u8; 3]) -> Result<()> {
    let mut img = image::RgbImage::new(W as u32, H as u32);
    for r in 0..H {
        for c in 0..W {
            img.put_pixel(c as u32, r as u32, image::Rgb(pixel(world(r, c))));
        }
    }
    let path = out_dir.join(name);
    img.save(&path).with_context(|| format!("failed to save {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn julia(source: FieldSource) -> JuliaSet {
    let settings = JuliaSettings { source, ..JuliaSettings::default() };
    let mut js = JuliaSet::new(settings, &NoiseParams::default());
    js.set_input_mesh(&Mesh::uv_sphere(1.0, 32, 16), true);
    let mut portals = PortalMap::new();
    portals.push(PortalTransform::build(
        DVec3::splat(0.6),
        DVec3::new(0.0, 0.0, 45.0),
        DVec3::new(0.8, 0.0, 0.0),
    ));
    js.set_portal_map(portals);
    js
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let out_dir = Path::new("data/debug");
    fs::create_dir_all(out_dir).context("cannot create data/debug/")?;

    let noise = VersorMap::new(&NoiseParams::default());

    // ── 1. versor_direction.png ──────────────────────────────────────────────
    render(out_dir, "versor_direction.png", |p| direction_rgb(noise.versor().get_field_value(p)))?;

    // ── 2. modulus_factor.png ────────────────────────────────────────────────
    render(out_dir, "modulus_factor.png", |p| gray(noise.modulus().factor(p) / 1.8))?;

    // ── 3. signed_distance.png ───────────────────────────────────────────────
    let sdf = julia(FieldSource::SignedDistance);
    render(out_dir, "signed_distance.png", |p| diverging(sdf.distance_value(p), 1.0))?;

    // ── 4. escape_value.png ──────────────────────────────────────────────────
    let escape = julia(FieldSource::QuaternionEscape);
    render(out_dir, "escape_value.png", |p| diverging(escape.escape_value(p), 2.0))?;

    // ── 5 & 6. Perturbed pass fields ─────────────────────────────────────────
    for k in 1..=2 {
        let pass = sdf.pass(0, k)?;
        render(out_dir, &format!("pass_{k}.png"), |p| diverging(pass.sample(p), 1.0))?;
    }

    println!("Done.");
    Ok(())
}
