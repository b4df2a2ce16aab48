use std::fmt::{self, Write};

use glam::Vec4;

use crate::{
    material::{MaterialId, MaterialMap},
    math::Transform,
    physics::DriverId,
    wire::{DecodeError, Packer, U8_SIZE, U16_SIZE, U32_SIZE, Unpacker, VEC4_SIZE, string_size},
};

/// A placement of a named [`GroupDefinition`][`super::GroupDefinition`].
///
/// The template is referenced by name only and resolved when the world is
/// built. Every override is optional; `None` (or `false` for ricochet) means
/// the attribute is inherited from the enclosing context untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupInstance {
    groupdef: String,
    name: Option<String>,
    transform: Transform,
    team: Option<u16>,
    tint: Option<Vec4>,
    phydrv: Option<DriverId>,
    material: Option<MaterialId>,
    drive_through: Option<u8>,
    shoot_through: Option<u8>,
    ricochet: bool,
    mat_map: MaterialMap,
}

mod bits {
    pub const TEAM: u8 = 1 << 0;
    pub const TINT: u8 = 1 << 1;
    pub const PHYDRV: u8 = 1 << 2;
    pub const MATERIAL: u8 = 1 << 3;
    pub const DRIVE_THROUGH: u8 = 1 << 4;
    pub const SHOOT_THROUGH: u8 = 1 << 5;
    pub const RICOCHET: u8 = 1 << 6;
    pub const NAME: u8 = 1 << 7;
}

impl GroupInstance {
    /// An empty `groupdef` makes a placeholder that never resolves.
    pub fn new(groupdef: impl Into<String>) -> Self {
        GroupInstance { groupdef: groupdef.into(), ..Default::default() }
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub fn set_team(&mut self, team: u16) -> &mut Self {
        self.team = Some(team);
        self
    }

    pub fn set_tint(&mut self, tint: Vec4) -> &mut Self {
        self.tint = Some(tint);
        self
    }

    pub fn set_physics_driver(&mut self, phydrv: DriverId) -> &mut Self {
        self.phydrv = Some(phydrv);
        self
    }

    pub fn set_transform(&mut self, transform: Transform) -> &mut Self {
        self.transform = transform;
        self
    }

    pub fn set_material(&mut self, material: MaterialId) -> &mut Self {
        self.material = Some(material);
        self
    }

    pub fn set_drive_through(&mut self, mask: u8) -> &mut Self {
        self.drive_through = Some(mask);
        self
    }

    pub fn set_shoot_through(&mut self, mask: u8) -> &mut Self {
        self.shoot_through = Some(mask);
        self
    }

    pub fn set_can_ricochet(&mut self) -> &mut Self {
        self.ricochet = true;
        self
    }

    pub fn add_material_swap(&mut self, src: MaterialId, dst: MaterialId) -> &mut Self {
        self.mat_map.insert(src, dst);
        self
    }

    pub fn get_group_def(&self) -> &str {
        &self.groupdef
    }

    /// The instance's own name, or `""` if it has none.
    pub fn get_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    pub fn get_transform(&self) -> &Transform {
        &self.transform
    }

    pub fn team(&self) -> Option<u16> {
        self.team
    }

    pub fn tint(&self) -> Option<Vec4> {
        self.tint
    }

    pub fn phydrv(&self) -> Option<DriverId> {
        self.phydrv
    }

    pub fn material(&self) -> Option<MaterialId> {
        self.material
    }

    pub fn drive_through(&self) -> Option<u8> {
        self.drive_through
    }

    pub fn shoot_through(&self) -> Option<u8> {
        self.shoot_through
    }

    pub fn can_ricochet(&self) -> bool {
        self.ricochet
    }

    pub fn material_map(&self) -> &MaterialMap {
        &self.mat_map
    }

    fn flag_bits(&self) -> u8 {
        [
            (self.team.is_some(), bits::TEAM),
            (self.tint.is_some(), bits::TINT),
            (self.phydrv.is_some(), bits::PHYDRV),
            (self.material.is_some(), bits::MATERIAL),
            (self.drive_through.is_some(), bits::DRIVE_THROUGH),
            (self.shoot_through.is_some(), bits::SHOOT_THROUGH),
            (self.ricochet, bits::RICOCHET),
            (self.name.is_some(), bits::NAME),
        ]
        .into_iter()
        .filter(|&(set, _)| set)
        .fold(0, |acc, (_, bit)| acc | bit)
    }

    pub fn pack_size(&self) -> usize {
        string_size(&self.groupdef)
            + self.transform.pack_size()
            + U8_SIZE
            + self.name.as_deref().map_or(0, string_size)
            + self.team.map_or(0, |_| U16_SIZE)
            + self.tint.map_or(0, |_| VEC4_SIZE)
            + self.phydrv.map_or(0, |_| U32_SIZE)
            + self.material.map_or(0, |_| U32_SIZE)
            + self.drive_through.map_or(0, |_| U8_SIZE)
            + self.shoot_through.map_or(0, |_| U8_SIZE)
            + self.mat_map.pack_size()
    }

    pub fn pack(&self, p: &mut Packer) {
        p.string(&self.groupdef);
        self.transform.pack(p);
        p.u8(self.flag_bits());
        if let Some(name) = &self.name {
            p.string(name);
        }
        if let Some(team) = self.team {
            p.u16(team);
        }
        if let Some(tint) = self.tint {
            p.vec4(tint);
        }
        if let Some(phydrv) = self.phydrv {
            DriverId::pack_opt(Some(phydrv), p);
        }
        if let Some(material) = self.material {
            material.pack(p);
        }
        if let Some(mask) = self.drive_through {
            p.u8(mask);
        }
        if let Some(mask) = self.shoot_through {
            p.u8(mask);
        }
        self.mat_map.pack(p);
    }

    pub fn unpack(u: &mut Unpacker) -> Result<Self, DecodeError> {
        let groupdef = u.string()?;
        let transform = Transform::unpack(u)?;
        let flags = u.u8()?;
        let set = |bit: u8| flags & bit != 0;

        let name = if set(bits::NAME) { Some(u.string()?) } else { None };
        let team = if set(bits::TEAM) { Some(u.u16()?) } else { None };
        let tint = if set(bits::TINT) { Some(u.vec4()?) } else { None };
        // A present-but-negative driver decodes as "no driver", same as absent
        let phydrv = if set(bits::PHYDRV) { DriverId::unpack_opt(u)? } else { None };
        let material = if set(bits::MATERIAL) { Some(MaterialId::unpack(u)?) } else { None };
        let drive_through = if set(bits::DRIVE_THROUGH) { Some(u.u8()?) } else { None };
        let shoot_through = if set(bits::SHOOT_THROUGH) { Some(u.u8()?) } else { None };
        let mat_map = MaterialMap::unpack(u)?;

        Ok(GroupInstance {
            groupdef,
            name,
            transform,
            team,
            tint,
            phydrv,
            material,
            drive_through,
            shoot_through,
            ricochet: set(bits::RICOCHET),
            mat_map,
        })
    }

    pub fn print(&self, out: &mut impl Write, indent: &str) -> fmt::Result {
        let inner = format!("{indent}  ");
        writeln!(out, "{indent}group {}", self.groupdef)?;
        if let Some(name) = &self.name {
            writeln!(out, "{inner}name {name}")?;
        }
        self.transform.print(out, &inner)?;
        if let Some(team) = self.team {
            writeln!(out, "{inner}team {team}")?;
        }
        if let Some(t) = self.tint {
            writeln!(out, "{inner}tint {} {} {} {}", t.x, t.y, t.z, t.w)?;
        }
        if let Some(phydrv) = self.phydrv {
            writeln!(out, "{inner}phydrv {phydrv}")?;
        }
        if let Some(material) = self.material {
            writeln!(out, "{inner}matref {}", material.0)?;
        }
        if let Some(mask) = self.drive_through {
            writeln!(out, "{inner}drivethrough {mask:#04x}")?;
        }
        if let Some(mask) = self.shoot_through {
            writeln!(out, "{inner}shootthrough {mask:#04x}")?;
        }
        if self.ricochet {
            writeln!(out, "{inner}ricochet")?;
        }
        for (src, dst) in self.mat_map.iter() {
            writeln!(out, "{inner}matswap {} {}", src.0, dst.0)?;
        }
        writeln!(out, "{indent}end")
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    fn roundtrip(inst: &GroupInstance) -> GroupInstance {
        let mut p = Packer::new();
        inst.pack(&mut p);
        assert_eq!(p.len(), inst.pack_size());
        let mut u = Unpacker::new(p.as_bytes());
        let back = GroupInstance::unpack(&mut u).unwrap();
        u.finish().unwrap();
        back
    }

    #[test]
    fn unset_overrides_cost_one_flag_byte() {
        let plain = GroupInstance::new("T");
        let size = plain.pack_size();
        assert_eq!(size, string_size("T") + Transform::identity().pack_size() + 1 + U32_SIZE);
        assert_eq!(roundtrip(&plain), plain);
    }

    #[test]
    fn every_override_survives_the_wire() {
        let mut inst = GroupInstance::new("tower");
        inst.set_name("north")
            .set_transform(Transform::shift(Vec3::new(5.0, 0.0, 0.0)))
            .set_team(2)
            .set_tint(Vec4::new(1.0, 0.0, 0.0, 1.0))
            .set_physics_driver(DriverId(4))
            .set_material(MaterialId(9))
            .set_drive_through(0x0f)
            .set_shoot_through(0xf0)
            .set_can_ricochet()
            .add_material_swap(MaterialId(1), MaterialId(2));
        assert_eq!(roundtrip(&inst), inst);
    }

    #[test]
    fn setters_only_touch_their_own_field() {
        let mut inst = GroupInstance::new("T");
        inst.set_team(1);
        assert_eq!(inst.team(), Some(1));
        assert_eq!(inst.tint(), None);
        assert_eq!(inst.material(), None);
        assert!(!inst.can_ricochet());
        assert_eq!(inst.get_name(), "");
    }

    #[test]
    fn print_lists_overrides() {
        let mut inst = GroupInstance::new("T");
        inst.set_team(2).set_can_ricochet();
        let mut s = String::new();
        inst.print(&mut s, "  ").unwrap();
        assert_eq!(s, "  group T\n    team 2\n    ricochet\n  end\n");
    }
}
