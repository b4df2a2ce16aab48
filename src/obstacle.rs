//! Obstacles: the concrete, collidable leaves of the world.
//!
//! Every obstacle is an [`ObstacleCore`] carrying the attributes all kinds
//! share (placement, team, tint, pass-through flags, ...) plus a [`Shape`]
//! holding whatever is specific to its [`ObstacleType`].

use std::fmt::{self, Display, Formatter, Write};

use enum_iterator::Sequence;
use enum_map::Enum;
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

use crate::{
    math::Transform,
    physics::DriverId,
    wire::{
        DecodeError, F32_SIZE, Packer, U8_SIZE, U16_SIZE, U32_SIZE, Unpacker, VEC3_SIZE,
        VEC4_SIZE, string_size,
    },
};

pub mod modifier;
pub mod shape;

pub use modifier::ObstacleModifier;
pub use shape::{
    ArcShape, ConeShape, MeshFace, MeshShape, Shape, SphereShape, TeleporterShape, TetraShape,
};

/// The fixed set of obstacle kinds, in wire order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[derive(Sequence, Enum)]
#[serde(rename_all = "lowercase")]
pub enum ObstacleType {
    Wall,
    Box,
    Pyramid,
    Base,
    Teleporter,
    Mesh,
    Arc,
    Cone,
    Sphere,
    Tetra,
}

// Tags go out as a single byte and live in the upper half of an obstacle id
const_assert!(<ObstacleType as Sequence>::CARDINALITY <= u8::MAX as usize);

impl ObstacleType {
    pub fn tag(self) -> u8 {
        self.into_usize() as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        enum_iterator::all::<ObstacleType>().nth(tag as usize)
    }

    pub const fn name(self) -> &'static str {
        use ObstacleType::*;
        match self {
            Wall => "wall",
            Box => "box",
            Pyramid => "pyramid",
            Base => "base",
            Teleporter => "teleporter",
            Mesh => "mesh",
            Arc => "arc",
            Cone => "cone",
            Sphere => "sphere",
            Tetra => "tetra",
        }
    }
}

impl Display for ObstacleType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Where an obstacle came from.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ObstacleSource {
    /// Placed directly by the world file.
    #[default]
    WorldFile,
    /// Produced by expanding a group instance.
    GroupDef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleCore {
    pub name: String,
    /// Local transform, applied to the placement below.
    pub transform: Transform,
    pub pos: Vec3,
    pub size: Vec3,
    /// Degrees about +Z
    pub rotation: f32,
    pub team: u16,
    pub tint: Vec4,
    pub phydrv: Option<DriverId>,
    pub drive_through: u8,
    pub shoot_through: u8,
    pub ricochet: bool,
    pub source: ObstacleSource,
}

impl Default for ObstacleCore {
    fn default() -> Self {
        ObstacleCore {
            name: String::new(),
            transform: Transform::identity(),
            pos: Vec3::ZERO,
            size: Vec3::ONE,
            rotation: 0.0,
            team: 0,
            tint: Vec4::ONE,
            phydrv: None,
            drive_through: 0,
            shoot_through: 0,
            ricochet: false,
            source: ObstacleSource::WorldFile,
        }
    }
}

impl ObstacleCore {
    const RICOCHET_BIT: u8 = 1 << 0;
    const GROUP_DEF_BIT: u8 = 1 << 1;

    fn is_valid(&self) -> bool {
        self.pos.is_finite()
            && self.size.is_finite()
            && self.rotation.is_finite()
            && self.tint.is_finite()
            && self.transform.is_valid()
    }

    fn pack_size(&self) -> usize {
        string_size(&self.name)
            + self.transform.pack_size()
            + 2 * VEC3_SIZE
            + F32_SIZE
            + U16_SIZE
            + VEC4_SIZE
            + U32_SIZE
            + 3 * U8_SIZE
    }

    fn pack(&self, p: &mut Packer) {
        p.string(&self.name);
        self.transform.pack(p);
        p.vec3(self.pos).vec3(self.size).f32(self.rotation).u16(self.team).vec4(self.tint);
        DriverId::pack_opt(self.phydrv, p);

        let mut state = 0;
        if self.ricochet {
            state |= Self::RICOCHET_BIT;
        }
        if self.source == ObstacleSource::GroupDef {
            state |= Self::GROUP_DEF_BIT;
        }
        p.u8(self.drive_through).u8(self.shoot_through).u8(state);
    }

    fn unpack(u: &mut Unpacker) -> Result<Self, DecodeError> {
        let name = u.string()?;
        let transform = Transform::unpack(u)?;
        let pos = u.vec3()?;
        let size = u.vec3()?;
        let rotation = u.f32()?;
        let team = u.u16()?;
        let tint = u.vec4()?;
        let phydrv = DriverId::unpack_opt(u)?;
        let drive_through = u.u8()?;
        let shoot_through = u.u8()?;
        let state = u.u8()?;
        Ok(ObstacleCore {
            name,
            transform,
            pos,
            size,
            rotation,
            team,
            tint,
            phydrv,
            drive_through,
            shoot_through,
            ricochet: state & Self::RICOCHET_BIT != 0,
            source: if state & Self::GROUP_DEF_BIT != 0 {
                ObstacleSource::GroupDef
            } else {
                ObstacleSource::WorldFile
            },
        })
    }

    fn print(&self, out: &mut impl Write, indent: &str) -> fmt::Result {
        if !self.name.is_empty() {
            writeln!(out, "{indent}name {}", self.name)?;
        }
        let (p, s) = (self.pos, self.size);
        writeln!(out, "{indent}position {} {} {}", p.x, p.y, p.z)?;
        writeln!(out, "{indent}size {} {} {}", s.x, s.y, s.z)?;
        if self.rotation != 0.0 {
            writeln!(out, "{indent}rotation {}", self.rotation)?;
        }
        self.transform.print(out, indent)?;
        if self.team != 0 {
            writeln!(out, "{indent}team {}", self.team)?;
        }
        if self.tint != Vec4::ONE {
            let t = self.tint;
            writeln!(out, "{indent}tint {} {} {} {}", t.x, t.y, t.z, t.w)?;
        }
        if let Some(drv) = self.phydrv {
            writeln!(out, "{indent}phydrv {drv}")?;
        }
        if self.drive_through != 0 {
            writeln!(out, "{indent}drivethrough {:#04x}", self.drive_through)?;
        }
        if self.shoot_through != 0 {
            writeln!(out, "{indent}shootthrough {:#04x}", self.shoot_through)?;
        }
        if self.ricochet {
            writeln!(out, "{indent}ricochet")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Obstacle {
    pub core: ObstacleCore,
    pub shape: Shape,
}

impl Obstacle {
    pub fn new(shape: Shape) -> Self {
        Obstacle { core: ObstacleCore::default(), shape }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.core.name = name.into();
        self
    }

    pub fn with_position(mut self, pos: Vec3) -> Self {
        self.core.pos = pos;
        self
    }

    pub fn with_size(mut self, size: Vec3) -> Self {
        self.core.size = size;
        self
    }

    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.core.rotation = degrees;
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.core.transform = transform;
        self
    }

    pub const fn kind(&self) -> ObstacleType {
        self.shape.kind()
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.core.name = name.into();
    }

    /// Places `xform` on top of the obstacle's own transform.
    pub fn apply_transform(&mut self, xform: &Transform) {
        self.core.transform.append(xform);
    }

    pub fn copy_with_transform(&self, xform: &Transform) -> Obstacle {
        let mut copy = self.clone();
        copy.apply_transform(xform);
        copy
    }

    /// The obstacle's position after its transform.
    pub fn world_position(&self) -> Vec3 {
        self.core.transform.transform_point(self.core.pos)
    }

    pub fn is_valid(&self) -> bool {
        self.core.is_valid() && self.shape.is_valid(self.core.size)
    }

    /// The box equivalent of a base, for clients that have no base primitive.
    pub fn to_box(&self) -> Option<Obstacle> {
        self.shape.is_base().then(|| Obstacle { core: self.core.clone(), shape: Shape::Box })
    }

    pub fn pack_size(&self) -> usize {
        U8_SIZE + self.core.pack_size() + self.shape.pack_size()
    }

    pub fn pack(&self, p: &mut Packer) {
        p.u8(self.kind().tag());
        self.core.pack(p);
        self.shape.pack(p);
    }

    /// Decodes a self-describing obstacle, dispatching on its leading tag.
    pub fn unpack(u: &mut Unpacker) -> Result<Self, DecodeError> {
        let tag = u.u8()?;
        let kind = ObstacleType::from_tag(tag).ok_or(DecodeError::UnknownObstacleType(tag))?;
        let core = ObstacleCore::unpack(u)?;
        let shape = Shape::unpack(kind, u)?;
        Ok(Obstacle { core, shape })
    }

    pub fn print(&self, out: &mut impl Write, indent: &str) -> fmt::Result {
        let inner = format!("{indent}  ");
        writeln!(out, "{indent}{}", self.kind())?;
        self.core.print(out, &inner)?;
        self.shape.print(out, &inner)?;
        writeln!(out, "{indent}end")
    }
}

#[cfg(test)]
mod tests {
    use assertables::assert_starts_with;
    use test_case::test_case;

    use super::*;
    use crate::{material::MaterialId, math::TransformOp};

    fn sample(shape: Shape) -> Obstacle {
        let mut obs = Obstacle::new(shape)
            .with_name("sample")
            .with_position(Vec3::new(1.0, 2.0, 3.0))
            .with_size(Vec3::new(4.0, 5.0, 6.0))
            .with_rotation(30.0)
            .with_transform(Transform::from_ops([TransformOp::Scale(Vec3::splat(2.0))]));
        obs.core.team = 3;
        obs.core.tint = Vec4::new(0.5, 0.5, 1.0, 1.0);
        obs.core.phydrv = Some(DriverId(1));
        obs.core.drive_through = 0xff;
        obs.core.ricochet = true;
        obs.core.source = ObstacleSource::GroupDef;
        obs
    }

    #[test]
    fn tags_follow_declaration_order() {
        let tags = enum_iterator::all::<ObstacleType>().map(ObstacleType::tag).collect::<Vec<_>>();
        assert_eq!(tags, (0..10).collect::<Vec<u8>>());
        assert_eq!(ObstacleType::from_tag(4), Some(ObstacleType::Teleporter));
        assert_eq!(ObstacleType::from_tag(10), None);
    }

    #[test_case(Shape::Wall)]
    #[test_case(Shape::Pyramid { flip_z: true })]
    #[test_case(Shape::Teleporter(TeleporterShape { border: 0.5, horizontal: true }))]
    #[test_case(Shape::Sphere(SphereShape { divisions: 8, hemisphere: true, materials: [MaterialId(1), MaterialId(2)] }))]
    #[test_case(Shape::Tetra(TetraShape { vertices: [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z], materials: [MaterialId(3); 4] }))]
    fn pack_size_matches_and_decodes(shape: Shape) {
        let obs = sample(shape);
        let mut p = Packer::new();
        obs.pack(&mut p);
        assert_eq!(p.len(), obs.pack_size());

        let mut u = Unpacker::new(p.as_bytes());
        assert_eq!(Obstacle::unpack(&mut u).unwrap(), obs);
        u.finish().unwrap();
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut p = Packer::new();
        sample(Shape::Box).pack(&mut p);
        let mut bytes = p.into_bytes();
        bytes[0] = 42;
        assert_eq!(
            Obstacle::unpack(&mut Unpacker::new(&bytes)),
            Err(DecodeError::UnknownObstacleType(42))
        );
    }

    #[test]
    fn truncated_obstacle_is_rejected() {
        let mut p = Packer::new();
        sample(Shape::Cone(ConeShape::default())).pack(&mut p);
        let bytes = p.into_bytes();
        let res = Obstacle::unpack(&mut Unpacker::new(&bytes[..bytes.len() - 3]));
        assert!(matches!(res, Err(DecodeError::UnexpectedEof { .. })), "{res:?}");
    }

    #[test]
    fn transform_moves_world_position() {
        let obs = Obstacle::new(Shape::Box)
            .with_position(Vec3::new(1.0, 0.0, 0.0))
            .copy_with_transform(&Transform::shift(Vec3::new(5.0, 0.0, 0.0)));
        assert!(obs.world_position().abs_diff_eq(Vec3::new(6.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn base_converts_to_box() {
        let mut base = sample(Shape::Base);
        base.core.team = 2;
        let boxed = base.to_box().unwrap();
        assert_eq!(boxed.kind(), ObstacleType::Box);
        assert_eq!(boxed.core, base.core);
        assert!(sample(Shape::Box).to_box().is_none());
    }

    #[test]
    fn zero_sized_box_is_invalid() {
        assert!(Obstacle::new(Shape::Box).is_valid());
        assert!(!Obstacle::new(Shape::Box).with_size(Vec3::new(1.0, 0.0, 1.0)).is_valid());
    }

    #[test]
    fn print_looks_like_a_world_file_block() {
        let mut s = String::new();
        sample(Shape::Box).print(&mut s, "").unwrap();
        assert_starts_with!(s.as_str(), "box\n  name sample\n");
        assert!(s.ends_with("end\n"), "{s}");
        assert!(s.contains("  team 3\n"), "{s}");
    }
}
