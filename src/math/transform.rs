use std::fmt::{self, Display, Formatter};

use glam::{Affine3A, Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::wire::{DecodeError, F32_SIZE, Packer, U8_SIZE, U32_SIZE, Unpacker, VEC3_SIZE};

/// A single step of a [`Transform`].
#[derive(Debug, Copy, Clone, PartialEq)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformOp {
    Shift(Vec3),
    Scale(Vec3),
    /// `x += s.x * z`, `y += s.y * z`, `z += s.z * x`
    Shear(Vec3),
    /// Rotation by `degrees` around `axis` (need not be normalized).
    Spin { degrees: f32, axis: Vec3 },
}

impl TransformOp {
    const SHIFT: u8 = 0;
    const SCALE: u8 = 1;
    const SHEAR: u8 = 2;
    const SPIN: u8 = 3;

    const fn tag(&self) -> u8 {
        match self {
            TransformOp::Shift(_) => Self::SHIFT,
            TransformOp::Scale(_) => Self::SCALE,
            TransformOp::Shear(_) => Self::SHEAR,
            TransformOp::Spin { .. } => Self::SPIN,
        }
    }

    fn affine(&self) -> Affine3A {
        match *self {
            TransformOp::Shift(v) => Affine3A::from_translation(v),
            TransformOp::Scale(v) => Affine3A::from_scale(v),
            TransformOp::Shear(s) => Affine3A::from_mat3(Mat3::from_cols(
                Vec3::new(1.0, 0.0, s.z),
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(s.x, s.y, 1.0),
            )),
            TransformOp::Spin { degrees, axis } => Affine3A::from_quat(Quat::from_axis_angle(
                axis.normalize_or_zero(),
                degrees.to_radians(),
            )),
        }
    }

    fn is_valid(&self) -> bool {
        match *self {
            TransformOp::Shift(v) | TransformOp::Shear(v) => v.is_finite(),
            TransformOp::Scale(v) => v.is_finite() && v.x != 0.0 && v.y != 0.0 && v.z != 0.0,
            TransformOp::Spin { degrees, axis } => {
                degrees.is_finite() && axis.is_finite() && axis.length_squared() > 0.0
            }
        }
    }

    const fn pack_size(&self) -> usize {
        match self {
            TransformOp::Spin { .. } => U8_SIZE + F32_SIZE + VEC3_SIZE,
            _ => U8_SIZE + VEC3_SIZE,
        }
    }

    fn pack(&self, p: &mut Packer) {
        p.u8(self.tag());
        match *self {
            TransformOp::Shift(v) | TransformOp::Scale(v) | TransformOp::Shear(v) => {
                p.vec3(v);
            }
            TransformOp::Spin { degrees, axis } => {
                p.f32(degrees).vec3(axis);
            }
        }
    }

    fn unpack(u: &mut Unpacker) -> Result<Self, DecodeError> {
        Ok(match u.u8()? {
            Self::SHIFT => TransformOp::Shift(u.vec3()?),
            Self::SCALE => TransformOp::Scale(u.vec3()?),
            Self::SHEAR => TransformOp::Shear(u.vec3()?),
            Self::SPIN => TransformOp::Spin { degrees: u.f32()?, axis: u.vec3()? },
            tag => return Err(DecodeError::UnknownTransformOp(tag)),
        })
    }
}

impl Display for TransformOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TransformOp::Shift(v) => write!(f, "shift {} {} {}", v.x, v.y, v.z),
            TransformOp::Scale(v) => write!(f, "scale {} {} {}", v.x, v.y, v.z),
            TransformOp::Shear(v) => write!(f, "shear {} {} {}", v.x, v.y, v.z),
            TransformOp::Spin { degrees, axis } => {
                write!(f, "spin {} {} {} {}", degrees, axis.x, axis.y, axis.z)
            }
        }
    }
}

/// An ordered list of affine operations, applied first to last.
///
/// Composition is by concatenation: `a.append(&b)` yields a transform that
/// applies `a` and then `b`. Keeping the operations (rather than only the
/// resulting matrix) lets the transform be printed and sent over the wire
/// exactly as authored.
#[derive(Debug, Clone, Default, PartialEq)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transform {
    ops: Vec<TransformOp>,
}

impl Transform {
    pub const fn identity() -> Self {
        Transform { ops: Vec::new() }
    }

    pub fn from_ops(ops: impl IntoIterator<Item = TransformOp>) -> Self {
        Transform { ops: ops.into_iter().collect() }
    }

    pub fn shift(v: Vec3) -> Self {
        Self::from_ops([TransformOp::Shift(v)])
    }

    pub fn ops(&self) -> &[TransformOp] {
        &self.ops
    }

    /// Appends `after`, so that it is applied after everything already here.
    pub fn append(&mut self, after: &Transform) -> &mut Self {
        self.ops.extend_from_slice(&after.ops);
        self
    }

    /// `self` followed by `after`, as a new transform.
    pub fn then(&self, after: &Transform) -> Transform {
        let mut t = self.clone();
        t.append(after);
        t
    }

    pub fn affine(&self) -> Affine3A {
        self.ops.iter().fold(Affine3A::IDENTITY, |acc, op| op.affine() * acc)
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.affine().transform_point3(point)
    }

    pub fn is_valid(&self) -> bool {
        self.ops.iter().all(TransformOp::is_valid)
    }

    pub fn pack_size(&self) -> usize {
        U32_SIZE + self.ops.iter().map(TransformOp::pack_size).sum::<usize>()
    }

    pub fn pack(&self, p: &mut Packer) {
        p.count(self.ops.len());
        for op in &self.ops {
            op.pack(p);
        }
    }

    pub fn unpack(u: &mut Unpacker) -> Result<Self, DecodeError> {
        let n = u.count(U8_SIZE + VEC3_SIZE)?;
        let ops = (0..n).map(|_| TransformOp::unpack(u)).collect::<Result<_, _>>()?;
        Ok(Transform { ops })
    }

    /// Writes one line per operation, each prefixed with `indent`.
    pub fn print(&self, out: &mut impl fmt::Write, indent: &str) -> fmt::Result {
        for op in &self.ops {
            writeln!(out, "{indent}{op}")?;
        }
        Ok(())
    }
}
