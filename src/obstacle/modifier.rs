use glam::Vec4;

use crate::{
    group::GroupInstance,
    material::{MaterialId, MaterialMap},
    obstacle::Obstacle,
    physics::DriverId,
};

/// The accumulated overrides of a chain of nested group instances.
///
/// For team, tint, physics driver and material, the outermost instance that
/// sets a value wins. Pass-through masks and ricochet accumulate, and material
/// swaps chain so the innermost swap is applied first. A material override
/// set inside an instance with swaps is itself swapped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObstacleModifier {
    team: Option<u16>,
    tint: Option<Vec4>,
    phydrv: Option<DriverId>,
    material: Option<MaterialId>,
    drive_through: u8,
    shoot_through: u8,
    ricochet: bool,
    mat_map: MaterialMap,
}

impl ObstacleModifier {
    /// No overrides at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// The modifier for obstacles placed by `group` inside `self`'s context.
    pub fn derive(&self, group: &GroupInstance) -> ObstacleModifier {
        ObstacleModifier {
            team: self.team.or(group.team()),
            tint: self.tint.or(group.tint()),
            phydrv: self.phydrv.or(group.phydrv()),
            // an inner override still passes through the outer swaps
            material: self.material.or_else(|| group.material().map(|m| self.mat_map.resolve(m))),
            drive_through: self.drive_through | group.drive_through().unwrap_or(0),
            shoot_through: self.shoot_through | group.shoot_through().unwrap_or(0),
            ricochet: self.ricochet || group.can_ricochet(),
            mat_map: group.material_map().then(&self.mat_map),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn execute(&self, obs: &mut Obstacle) {
        let core = &mut obs.core;
        if let Some(team) = self.team {
            core.team = team;
        }
        if let Some(tint) = self.tint {
            core.tint = tint;
        }
        if let Some(phydrv) = self.phydrv {
            core.phydrv = Some(phydrv);
        }
        core.drive_through |= self.drive_through;
        core.shoot_through |= self.shoot_through;
        core.ricochet |= self.ricochet;

        if let Some(material) = self.material {
            obs.shape.map_materials(|_| material);
        } else if !self.mat_map.is_empty() {
            obs.shape.map_materials(|m| self.mat_map.resolve(m));
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::obstacle::{ConeShape, Shape};

    fn cone() -> Obstacle {
        let mut cone = ConeShape::default();
        cone.materials = [MaterialId(1), MaterialId(2), MaterialId(1), MaterialId(3)];
        Obstacle::new(Shape::Cone(cone)).with_size(Vec3::splat(10.0))
    }

    #[test]
    fn empty_modifier_changes_nothing() {
        let mut obs = cone();
        obs.core.team = 4;
        obs.core.drive_through = 1;
        let before = obs.clone();
        ObstacleModifier::new().execute(&mut obs);
        assert_eq!(obs, before);
    }

    #[test]
    fn outer_overrides_win() {
        let mut outer = GroupInstance::new("A");
        outer.set_team(1).set_drive_through(0x01);
        let mut inner = GroupInstance::new("B");
        inner.set_team(2).set_tint(Vec4::new(0.0, 1.0, 0.0, 1.0)).set_drive_through(0x10);

        let m = ObstacleModifier::new().derive(&outer).derive(&inner);
        let mut obs = cone();
        m.execute(&mut obs);

        assert_eq!(obs.core.team, 1);
        assert_eq!(obs.core.tint, Vec4::new(0.0, 1.0, 0.0, 1.0));
        assert_eq!(obs.core.drive_through, 0x11);
    }

    #[test]
    fn material_override_beats_swaps() {
        let mut group = GroupInstance::new("A");
        group.set_material(MaterialId(7)).add_material_swap(MaterialId(1), MaterialId(5));
        let mut obs = cone();
        ObstacleModifier::new().derive(&group).execute(&mut obs);
        assert_eq!(obs.shape.materials(), vec![MaterialId(7); 4]);
    }

    #[test]
    fn outer_swaps_apply_to_inner_material_override() {
        let mut outer = GroupInstance::new("A");
        outer.add_material_swap(MaterialId(7), MaterialId(8));
        let mut inner = GroupInstance::new("B");
        inner.set_material(MaterialId(7));

        let mut obs = cone();
        ObstacleModifier::new().derive(&outer).derive(&inner).execute(&mut obs);
        assert_eq!(obs.shape.materials(), vec![MaterialId(8); 4]);
    }

    #[test]
    fn outer_material_override_is_not_swapped_by_inner() {
        let mut outer = GroupInstance::new("A");
        outer.set_material(MaterialId(7));
        let mut inner = GroupInstance::new("B");
        inner.add_material_swap(MaterialId(7), MaterialId(8));

        let mut obs = cone();
        ObstacleModifier::new().derive(&outer).derive(&inner).execute(&mut obs);
        assert_eq!(obs.shape.materials(), vec![MaterialId(7); 4]);
    }

    #[test]
    fn swaps_chain_inner_then_outer() {
        let mut outer = GroupInstance::new("A");
        outer.add_material_swap(MaterialId(5), MaterialId(6));
        let mut inner = GroupInstance::new("B");
        inner.add_material_swap(MaterialId(1), MaterialId(5));

        let mut obs = cone();
        ObstacleModifier::new().derive(&outer).derive(&inner).execute(&mut obs);
        assert_eq!(
            obs.shape.materials(),
            vec![MaterialId(6), MaterialId(2), MaterialId(6), MaterialId(3)]
        );
    }
}
