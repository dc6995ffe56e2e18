/// Batch fractal generator: loads a Wavefront OBJ, runs the portal pipeline
/// with parameters from a JSON document and command-line overrides, writes
/// the extracted mesh back out as OBJ.
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use glam::{DVec2, DVec3};
use portal_core::generator::{FieldMode, FractalGenerator, FractalParams};
use portal_core::mesh::Mesh;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Distance,
    Quaternion,
    Blended,
}

impl From<Mode> for FieldMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Distance => FieldMode::SignedDistance,
            Mode::Quaternion => FieldMode::QuaternionEscape,
            Mode::Blended => FieldMode::Blended,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "fractalize", about = "Grow a portal-iterated fractal from an OBJ mesh")]
struct Args {
    /// Input mesh (Wavefront OBJ)
    input: PathBuf,

    /// Output mesh (Wavefront OBJ)
    #[arg(short, long, default_value = "fractal.obj")]
    output: PathBuf,

    /// JSON parameter document; omitted fields take their defaults
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Write per-pass reports as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,

    /// Extraction passes per portal (1-8)
    #[arg(long)]
    iterations: Option<usize>,

    /// Noise displacement weight (0-10)
    #[arg(long)]
    alpha: Option<f64>,

    /// Noise sampling offset (0-10)
    #[arg(long)]
    beta: Option<f64>,

    /// Cells along the longest axis of each pass box
    #[arg(long)]
    resolution: Option<usize>,

    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Halve the sampling grid
    #[arg(long)]
    low_res: bool,

    /// Merge coincident output vertices
    #[arg(long)]
    weld: bool,

    /// Answer distance queries with a linear scan
    #[arg(long)]
    no_bvh: bool,
}

impl Args {
    fn apply_overrides(&self, params: &mut FractalParams) {
        if let Some(seed) = self.seed {
            params.seed = seed;
        }
        if let Some(n) = self.iterations {
            params.max_iterations = n;
        }
        if let Some(a) = self.alpha {
            params.alpha = a;
        }
        if let Some(b) = self.beta {
            params.beta = b;
        }
        if let Some(r) = self.resolution {
            params.resolution = r;
        }
        if let Some(m) = self.mode {
            params.field_mode = m.into();
        }
        params.is_low_res |= self.low_res;
        params.weld_vertices |= self.weld;
        if self.no_bvh {
            params.use_bvh = false;
        }
    }
}

// ── OBJ import ───────────────────────────────────────────────────────────────

fn vec3s(flat: &[f32]) -> Vec<DVec3> {
    flat.chunks_exact(3).map(|c| DVec3::new(c[0] as f64, c[1] as f64, c[2] as f64)).collect()
}

fn vec2s(flat: &[f32]) -> Vec<DVec2> {
    flat.chunks_exact(2).map(|c| DVec2::new(c[0] as f64, c[1] as f64)).collect()
}

/// Merge every model into one mesh. The first model with a material names
/// the output material.
fn mesh_from_models(models: &[tobj::Model], materials: &[tobj::Material]) -> Result<Mesh> {
    let mut merged = Mesh::new();
    for model in models {
        let m = &model.mesh;
        let mut part = Mesh::from_parts(vec3s(&m.positions), vec3s(&m.normals), vec2s(&m.texcoords), m.indices.clone())
            .with_context(|| format!("model '{}'", model.name))?;
        part.material = m.material_id.and_then(|id| materials.get(id)).map(|mat| mat.name.clone());
        if merged.material.is_none() {
            merged.material = part.material.clone();
        }
        merged.append(&part);
    }
    Ok(merged)
}

fn load_obj(path: &Path) -> Result<Mesh> {
    let options = tobj::LoadOptions { triangulate: true, single_index: true, ..Default::default() };
    let (models, materials) =
        tobj::load_obj(path, &options).with_context(|| format!("cannot read OBJ {}", path.display()))?;
    let materials = materials.unwrap_or_else(|e| {
        warn!(error = %e, "material library not loaded");
        Vec::new()
    });
    let mesh = mesh_from_models(&models, &materials)?;
    if mesh.triangle_count() == 0 {
        bail!("{} contains no triangles", path.display());
    }
    Ok(mesh)
}

// ── OBJ export ───────────────────────────────────────────────────────────────

fn write_obj<W: Write>(mesh: &Mesh, out: &mut W) -> io::Result<()> {
    writeln!(out, "# fractalize: {} vertices, {} triangles", mesh.vertex_count(), mesh.triangle_count())?;
    for p in &mesh.positions {
        writeln!(out, "v {} {} {}", p.x, p.y, p.z)?;
    }
    for t in &mesh.uvs {
        writeln!(out, "vt {} {}", t.x, t.y)?;
    }
    for n in &mesh.normals {
        writeln!(out, "vn {} {} {}", n.x, n.y, n.z)?;
    }
    if let Some(material) = &mesh.material {
        writeln!(out, "usemtl {material}")?;
    }
    let has_uvs = !mesh.uvs.is_empty();
    let has_normals = !mesh.normals.is_empty();
    for tri in mesh.indices.chunks_exact(3) {
        write!(out, "f")?;
        for &i in tri {
            let i = i + 1;
            match (has_uvs, has_normals) {
                (true, true) => write!(out, " {i}/{i}/{i}")?,
                (true, false) => write!(out, " {i}/{i}")?,
                (false, true) => write!(out, " {i}//{i}")?,
                (false, false) => write!(out, " {i}")?,
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

// ── Entry point ──────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut params = match &args.params {
        Some(path) => {
            let json = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
            FractalParams::from_json(&json).with_context(|| format!("invalid parameters in {}", path.display()))?
        }
        None => FractalParams::default(),
    };
    args.apply_overrides(&mut params);

    let input = load_obj(&args.input)?;
    info!(
        path = %args.input.display(),
        vertices = input.vertex_count(),
        triangles = input.triangle_count(),
        "loaded input mesh"
    );

    let result = FractalGenerator::new().generate(&input, &params).context("fractal generation failed")?;

    let file = fs::File::create(&args.output).with_context(|| format!("cannot create {}", args.output.display()))?;
    let mut out = BufWriter::new(file);
    write_obj(&result.mesh, &mut out).and_then(|_| out.flush())?;
    info!(
        path = %args.output.display(),
        triangles = result.mesh.triangle_count(),
        elapsed_ms = result.generation_time_ms,
        "wrote fractal mesh"
    );

    if let Some(path) = &args.report {
        fs::write(path, serde_json::to_string_pretty(&result.passes)?)
            .with_context(|| format!("cannot write {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_model(material_id: Option<usize>) -> tobj::Model {
        let mesh = tobj::Mesh {
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            texcoords: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            indices: vec![0, 1, 2],
            material_id,
            ..Default::default()
        };
        tobj::Model::new(mesh, "tri".into())
    }

    #[test]
    fn models_merge_with_offset_indices() {
        let material = tobj::Material { name: "lambert2SG".into(), ..Default::default() };
        let mesh = mesh_from_models(&[triangle_model(Some(0)), triangle_model(None)], &[material]).unwrap();
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(mesh.uvs.len(), 6);
        assert_eq!(mesh.material.as_deref(), Some("lambert2SG"));
        assert!(mesh.bounds.max.abs_diff_eq(DVec3::new(1.0, 1.0, 0.0), 1e-12));
    }

    #[test]
    fn obj_faces_are_one_based() {
        let mesh = Mesh::cuboid(DVec3::ZERO, DVec3::ONE);
        let mut buf = Vec::new();
        write_obj(&mesh, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("v ")).count(), 8);
        let faces: Vec<&str> = text.lines().filter(|l| l.starts_with("f ")).collect();
        assert_eq!(faces.len(), 12);
        assert!(faces.iter().all(|f| f.split_whitespace().skip(1).all(|v| v != "0" && !v.starts_with("0/"))));
    }

    #[test]
    fn overrides_replace_document_values() {
        let args = Args::parse_from(["fractalize", "in.obj", "--iterations", "5", "--mode", "quaternion", "--no-bvh"]);
        let mut params = FractalParams::default();
        args.apply_overrides(&mut params);
        assert_eq!(params.max_iterations, 5);
        assert_eq!(params.field_mode, FieldMode::QuaternionEscape);
        assert!(!params.use_bvh);
        assert_eq!(params.alpha, FractalParams::default().alpha);
    }
}
