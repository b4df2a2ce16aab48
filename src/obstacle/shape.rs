//! Per-kind obstacle payloads.

use std::fmt::{self, Write};

use derive_more::IsVariant;
use glam::Vec3;
use itertools::Itertools;

use crate::{
    material::MaterialId,
    obstacle::ObstacleType,
    wire::{DecodeError, F32_SIZE, Packer, U8_SIZE, U32_SIZE, Unpacker, VEC3_SIZE},
};

const MIN_TETRA_VOLUME: f32 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct TeleporterShape {
    pub border: f32,
    pub horizontal: bool,
}

impl Default for TeleporterShape {
    fn default() -> Self {
        TeleporterShape { border: 1.0, horizontal: false }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshFace {
    pub vertices: Vec<u32>,
    pub material: MaterialId,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshShape {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<MeshFace>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArcShape {
    /// Degrees
    pub sweep: f32,
    /// Inner radius as a fraction of the outer radius
    pub ratio: f32,
    pub divisions: u32,
    pub materials: [MaterialId; 4],
}

impl Default for ArcShape {
    fn default() -> Self {
        ArcShape { sweep: 360.0, ratio: 0.5, divisions: 16, materials: Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConeShape {
    /// Degrees
    pub sweep: f32,
    pub divisions: u32,
    pub materials: [MaterialId; 4],
}

impl Default for ConeShape {
    fn default() -> Self {
        ConeShape { sweep: 360.0, divisions: 16, materials: Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SphereShape {
    pub divisions: u32,
    pub hemisphere: bool,
    pub materials: [MaterialId; 2],
}

impl Default for SphereShape {
    fn default() -> Self {
        SphereShape { divisions: 4, hemisphere: false, materials: Default::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TetraShape {
    pub vertices: [Vec3; 4],
    pub materials: [MaterialId; 4],
}

impl TetraShape {
    pub fn volume(&self) -> f32 {
        let [a, b, c, d] = self.vertices;
        (b - a).dot((c - a).cross(d - a)).abs() / 6.0
    }
}

/// The kind-specific part of an obstacle. One variant per [`ObstacleType`].
#[derive(Debug, Clone, PartialEq)]
#[derive(IsVariant)]
pub enum Shape {
    Wall,
    Box,
    Pyramid { flip_z: bool },
    Base,
    Teleporter(TeleporterShape),
    Mesh(MeshShape),
    Arc(ArcShape),
    Cone(ConeShape),
    Sphere(SphereShape),
    Tetra(TetraShape),
}

impl Shape {
    pub const fn kind(&self) -> ObstacleType {
        match self {
            Shape::Wall => ObstacleType::Wall,
            Shape::Box => ObstacleType::Box,
            Shape::Pyramid { .. } => ObstacleType::Pyramid,
            Shape::Base => ObstacleType::Base,
            Shape::Teleporter(_) => ObstacleType::Teleporter,
            Shape::Mesh(_) => ObstacleType::Mesh,
            Shape::Arc(_) => ObstacleType::Arc,
            Shape::Cone(_) => ObstacleType::Cone,
            Shape::Sphere(_) => ObstacleType::Sphere,
            Shape::Tetra(_) => ObstacleType::Tetra,
        }
    }

    /// Does this kind of shape reference materials at all?
    pub const fn has_materials(&self) -> bool {
        matches!(
            self,
            Shape::Mesh(_) | Shape::Arc(_) | Shape::Cone(_) | Shape::Sphere(_) | Shape::Tetra(_)
        )
    }

    pub fn materials(&self) -> Vec<MaterialId> {
        match self {
            Shape::Mesh(m) => m.faces.iter().map(|f| f.material).collect(),
            Shape::Arc(a) => a.materials.to_vec(),
            Shape::Cone(c) => c.materials.to_vec(),
            Shape::Sphere(s) => s.materials.to_vec(),
            Shape::Tetra(t) => t.materials.to_vec(),
            _ => Vec::new(),
        }
    }

    /// Replaces every referenced material with `f(material)`.
    pub fn map_materials(&mut self, mut f: impl FnMut(MaterialId) -> MaterialId) {
        let mut apply = |m: &mut MaterialId| *m = f(*m);
        match self {
            Shape::Mesh(m) => m.faces.iter_mut().for_each(|face| apply(&mut face.material)),
            Shape::Arc(a) => a.materials.iter_mut().for_each(apply),
            Shape::Cone(c) => c.materials.iter_mut().for_each(apply),
            Shape::Sphere(s) => s.materials.iter_mut().for_each(apply),
            Shape::Tetra(t) => t.materials.iter_mut().for_each(apply),
            Shape::Wall | Shape::Box | Shape::Pyramid { .. } | Shape::Base | Shape::Teleporter(_) => {}
        }
    }

    /// Geometry checks that depend on the kind. `size` is the obstacle's size.
    pub fn is_valid(&self, size: Vec3) -> bool {
        let positive = size.x > 0.0 && size.y > 0.0 && size.z > 0.0;
        match self {
            Shape::Wall => size.y > 0.0 && size.z > 0.0,
            Shape::Box | Shape::Pyramid { .. } | Shape::Base => positive,
            Shape::Teleporter(t) => {
                size.x >= 0.0 && size.y > 0.0 && size.z > 0.0 && t.border.is_finite() && t.border >= 0.0
            }
            Shape::Mesh(m) => {
                !m.faces.is_empty()
                    && m.vertices.iter().all(|v| v.is_finite())
                    && m.faces.iter().all(|f| {
                        f.vertices.len() >= 3
                            && f.vertices.iter().all(|&i| (i as usize) < m.vertices.len())
                    })
            }
            Shape::Arc(a) => {
                positive
                    && a.divisions >= 1
                    && a.sweep > 0.0
                    && a.sweep <= 360.0
                    && (0.0..1.0).contains(&a.ratio)
            }
            Shape::Cone(c) => positive && c.divisions >= 1 && c.sweep > 0.0 && c.sweep <= 360.0,
            Shape::Sphere(s) => positive && s.divisions >= 1,
            Shape::Tetra(t) => {
                t.vertices.iter().all(|v| v.is_finite()) && t.volume() > MIN_TETRA_VOLUME
            }
        }
    }

    pub fn pack_size(&self) -> usize {
        match self {
            Shape::Wall | Shape::Box | Shape::Base => 0,
            Shape::Pyramid { .. } => U8_SIZE,
            Shape::Teleporter(_) => F32_SIZE + U8_SIZE,
            Shape::Mesh(m) => {
                U32_SIZE
                    + m.vertices.len() * VEC3_SIZE
                    + U32_SIZE
                    + m.faces
                        .iter()
                        .map(|f| U32_SIZE + f.vertices.len() * U32_SIZE + U32_SIZE)
                        .sum::<usize>()
            }
            Shape::Arc(_) => 2 * F32_SIZE + U32_SIZE + 4 * U32_SIZE,
            Shape::Cone(_) => F32_SIZE + U32_SIZE + 4 * U32_SIZE,
            Shape::Sphere(_) => U32_SIZE + U8_SIZE + 2 * U32_SIZE,
            Shape::Tetra(_) => 4 * VEC3_SIZE + 4 * U32_SIZE,
        }
    }

    pub fn pack(&self, p: &mut Packer) {
        match self {
            Shape::Wall | Shape::Box | Shape::Base => {}
            Shape::Pyramid { flip_z } => {
                p.bool(*flip_z);
            }
            Shape::Teleporter(t) => {
                p.f32(t.border).bool(t.horizontal);
            }
            Shape::Mesh(m) => {
                p.count(m.vertices.len());
                for &v in &m.vertices {
                    p.vec3(v);
                }
                p.count(m.faces.len());
                for face in &m.faces {
                    p.count(face.vertices.len());
                    for &i in &face.vertices {
                        p.u32(i);
                    }
                    face.material.pack(p);
                }
            }
            Shape::Arc(a) => {
                p.f32(a.sweep).f32(a.ratio).u32(a.divisions);
                pack_materials(&a.materials, p);
            }
            Shape::Cone(c) => {
                p.f32(c.sweep).u32(c.divisions);
                pack_materials(&c.materials, p);
            }
            Shape::Sphere(s) => {
                p.u32(s.divisions).bool(s.hemisphere);
                pack_materials(&s.materials, p);
            }
            Shape::Tetra(t) => {
                for &v in &t.vertices {
                    p.vec3(v);
                }
                pack_materials(&t.materials, p);
            }
        }
    }

    /// Decodes the payload for `kind`. The match is exhaustive, so adding a
    /// kind without a decoder does not compile.
    pub fn unpack(kind: ObstacleType, u: &mut Unpacker) -> Result<Self, DecodeError> {
        Ok(match kind {
            ObstacleType::Wall => Shape::Wall,
            ObstacleType::Box => Shape::Box,
            ObstacleType::Base => Shape::Base,
            ObstacleType::Pyramid => Shape::Pyramid { flip_z: u.bool()? },
            ObstacleType::Teleporter => {
                Shape::Teleporter(TeleporterShape { border: u.f32()?, horizontal: u.bool()? })
            }
            ObstacleType::Mesh => {
                let n = u.count(VEC3_SIZE)?;
                let vertices = (0..n).map(|_| u.vec3()).collect::<Result<_, _>>()?;
                let n = u.count(2 * U32_SIZE)?;
                let faces = (0..n)
                    .map(|_| -> Result<MeshFace, DecodeError> {
                        let k = u.count(U32_SIZE)?;
                        let vertices = (0..k).map(|_| u.u32()).collect::<Result<_, _>>()?;
                        Ok(MeshFace { vertices, material: MaterialId::unpack(u)? })
                    })
                    .collect::<Result<_, _>>()?;
                Shape::Mesh(MeshShape { vertices, faces })
            }
            ObstacleType::Arc => Shape::Arc(ArcShape {
                sweep: u.f32()?,
                ratio: u.f32()?,
                divisions: u.u32()?,
                materials: unpack_materials(u)?,
            }),
            ObstacleType::Cone => Shape::Cone(ConeShape {
                sweep: u.f32()?,
                divisions: u.u32()?,
                materials: unpack_materials(u)?,
            }),
            ObstacleType::Sphere => Shape::Sphere(SphereShape {
                divisions: u.u32()?,
                hemisphere: u.bool()?,
                materials: unpack_materials(u)?,
            }),
            ObstacleType::Tetra => Shape::Tetra(TetraShape {
                vertices: [u.vec3()?, u.vec3()?, u.vec3()?, u.vec3()?],
                materials: unpack_materials(u)?,
            }),
        })
    }

    pub fn print(&self, out: &mut impl Write, indent: &str) -> fmt::Result {
        match self {
            Shape::Wall | Shape::Box | Shape::Base => {}
            Shape::Pyramid { flip_z } => {
                if *flip_z {
                    writeln!(out, "{indent}flipz")?;
                }
            }
            Shape::Teleporter(t) => {
                writeln!(out, "{indent}border {}", t.border)?;
                if t.horizontal {
                    writeln!(out, "{indent}horizontal")?;
                }
            }
            Shape::Mesh(m) => {
                for v in &m.vertices {
                    writeln!(out, "{indent}vertex {} {} {}", v.x, v.y, v.z)?;
                }
                for face in &m.faces {
                    writeln!(out, "{indent}face")?;
                    writeln!(out, "{indent}  vertices {}", face.vertices.iter().join(" "))?;
                    writeln!(out, "{indent}  matref {}", face.material.0)?;
                    writeln!(out, "{indent}endface")?;
                }
            }
            Shape::Arc(a) => {
                writeln!(out, "{indent}angle {}", a.sweep)?;
                writeln!(out, "{indent}ratio {}", a.ratio)?;
                writeln!(out, "{indent}divisions {}", a.divisions)?;
                print_materials(&a.materials, out, indent)?;
            }
            Shape::Cone(c) => {
                writeln!(out, "{indent}angle {}", c.sweep)?;
                writeln!(out, "{indent}divisions {}", c.divisions)?;
                print_materials(&c.materials, out, indent)?;
            }
            Shape::Sphere(s) => {
                writeln!(out, "{indent}divisions {}", s.divisions)?;
                if s.hemisphere {
                    writeln!(out, "{indent}hemisphere")?;
                }
                print_materials(&s.materials, out, indent)?;
            }
            Shape::Tetra(t) => {
                for v in &t.vertices {
                    writeln!(out, "{indent}vertex {} {} {}", v.x, v.y, v.z)?;
                }
                print_materials(&t.materials, out, indent)?;
            }
        }
        Ok(())
    }
}

fn pack_materials(materials: &[MaterialId], p: &mut Packer) {
    for m in materials {
        m.pack(p);
    }
}

fn unpack_materials<const N: usize>(u: &mut Unpacker) -> Result<[MaterialId; N], DecodeError> {
    let mut out = [MaterialId::default(); N];
    for m in &mut out {
        *m = MaterialId::unpack(u)?;
    }
    Ok(out)
}

fn print_materials(materials: &[MaterialId], out: &mut impl Write, indent: &str) -> fmt::Result {
    writeln!(out, "{indent}matref {}", materials.iter().map(|m| m.0).join(" "))
}
