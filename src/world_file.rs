//! Reading worlds described in TOML.
//!
//! ```toml
//! physics_drivers = ["conveyor"]
//!
//! [[materials]]
//! name = "brick"
//! color = [0.8, 0.3, 0.2, 1.0]
//!
//! [[groups]]
//! name = "tower"
//! obstacles = [{ kind = "sphere", size = [5, 5, 20], materials = ["brick", "brick"] }]
//!
//! [[instances]]
//! group = "tower"
//! transform = [{ shift = [100, 0, 0] }]
//! team = 2
//! ```

use std::{fs, path::Path};

use anyhow::{Context, anyhow, bail, ensure};
use glam::{Vec3, Vec4};
use log::debug;
use serde::Deserialize;

use crate::{
    group::{GroupDefinition, GroupDefinitionMgr, GroupInstance},
    material::{Material, MaterialId, MaterialMgr},
    math::Transform,
    obstacle::{
        ArcShape, ConeShape, MeshFace, MeshShape, Obstacle, ObstacleType, Shape, SphereShape,
        TeleporterShape, TetraShape,
    },
    physics::{DriverId, PhysicsDriverMgr},
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldDescription {
    pub materials: Vec<Material>,
    pub physics_drivers: Vec<String>,
    pub obstacles: Vec<ObstacleDesc>,
    pub instances: Vec<InstanceDesc>,
    pub groups: Vec<GroupDesc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GroupDesc {
    pub name: String,
    pub obstacles: Vec<ObstacleDesc>,
    pub instances: Vec<InstanceDesc>,
}

/// One obstacle. Only the shape fields relevant to `kind` are read.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObstacleDesc {
    pub kind: ObstacleType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default = "ObstacleDesc::default_size")]
    pub size: Vec3,
    /// Degrees around the z axis
    #[serde(default)]
    pub rotation: f32,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub team: u16,
    pub tint: Option<Vec4>,
    pub phydrv: Option<String>,
    #[serde(default)]
    pub drive_through: u8,
    #[serde(default)]
    pub shoot_through: u8,
    #[serde(default)]
    pub ricochet: bool,
    #[serde(default)]
    pub materials: Vec<String>,

    pub flip_z: Option<bool>,
    pub border: Option<f32>,
    pub horizontal: Option<bool>,
    pub sweep: Option<f32>,
    pub ratio: Option<f32>,
    pub divisions: Option<u32>,
    pub hemisphere: Option<bool>,
    #[serde(default)]
    pub vertices: Vec<Vec3>,
    #[serde(default)]
    pub faces: Vec<FaceDesc>,
}

impl ObstacleDesc {
    fn default_size() -> Vec3 {
        Vec3::ONE
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FaceDesc {
    pub vertices: Vec<u32>,
    pub material: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceDesc {
    pub group: String,
    pub name: Option<String>,
    #[serde(default)]
    pub transform: Transform,
    pub team: Option<u16>,
    pub tint: Option<Vec4>,
    pub phydrv: Option<String>,
    pub material: Option<String>,
    pub drive_through: Option<u8>,
    pub shoot_through: Option<u8>,
    #[serde(default)]
    pub ricochet: bool,
    /// `[from, to]` material name pairs
    #[serde(default)]
    pub swaps: Vec<[String; 2]>,
}

/// A world read from a description, ready to build.
#[derive(Debug, Default)]
pub struct LoadedWorld {
    pub groups: GroupDefinitionMgr,
    pub materials: MaterialMgr,
    pub drivers: PhysicsDriverMgr,
}

impl WorldDescription {
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("failed to parse world description")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)
            .with_context(|| format!("failed to read world description {}", path.display()))?;
        Self::from_toml(&s).with_context(|| format!("in {}", path.display()))
    }

    /// Registers the materials and drivers, then fills the manager's
    /// top-level definition and templates. Names are resolved here; group
    /// references are left for the build.
    pub fn into_world(self) -> anyhow::Result<LoadedWorld> {
        let mut world = LoadedWorld::default();
        for material in self.materials {
            world.materials.add_material(material);
        }
        for driver in self.physics_drivers {
            world.drivers.add_driver(driver);
        }

        for (i, desc) in self.obstacles.into_iter().enumerate() {
            let obs = world.obstacle(desc).with_context(|| format!("top-level obstacle {i}"))?;
            world.groups.top_mut().add_obstacle(obs);
        }
        for (i, desc) in self.instances.into_iter().enumerate() {
            let inst = world.instance(desc).with_context(|| format!("top-level instance {i}"))?;
            world.groups.top_mut().add_group_instance(inst);
        }

        for group in self.groups {
            ensure!(!group.name.is_empty(), "group definitions need a name");
            let mut def = GroupDefinition::new(group.name);
            for (i, desc) in group.obstacles.into_iter().enumerate() {
                let obs = world
                    .obstacle(desc)
                    .with_context(|| format!("obstacle {i} of group {:?}", def.get_name()))?;
                def.add_obstacle(obs);
            }
            for (i, desc) in group.instances.into_iter().enumerate() {
                let inst = world
                    .instance(desc)
                    .with_context(|| format!("instance {i} of group {:?}", def.get_name()))?;
                def.add_group_instance(inst);
            }
            world.groups.add_group_def(def);
        }

        debug!(
            target: "world_file",
            "Loaded {} materials, {} drivers, {} group definitions",
            world.materials.len(),
            world.drivers.len(),
            world.groups.group_defs().len()
        );
        Ok(world)
    }
}

impl LoadedWorld {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        WorldDescription::load(path)?.into_world()
    }

    fn material(&self, name: &str) -> anyhow::Result<MaterialId> {
        self.materials.find_material(name).ok_or_else(|| anyhow!("unknown material {name:?}"))
    }

    fn driver(&self, name: &str) -> anyhow::Result<DriverId> {
        self.drivers.find_driver(name).ok_or_else(|| anyhow!("unknown physics driver {name:?}"))
    }

    /// Resolves exactly `N` material names; an empty list means all default.
    fn material_array<const N: usize>(&self, names: &[String]) -> anyhow::Result<[MaterialId; N]> {
        let mut out = [MaterialId::default(); N];
        if names.is_empty() {
            return Ok(out);
        }
        ensure!(names.len() == N, "expected {N} materials, got {}", names.len());
        for (slot, name) in out.iter_mut().zip(names) {
            *slot = self.material(name)?;
        }
        Ok(out)
    }

    fn shape(&self, d: &ObstacleDesc) -> anyhow::Result<Shape> {
        let shape = match d.kind {
            ObstacleType::Wall => Shape::Wall,
            ObstacleType::Box => Shape::Box,
            ObstacleType::Pyramid => Shape::Pyramid { flip_z: d.flip_z.unwrap_or(false) },
            ObstacleType::Base => Shape::Base,
            ObstacleType::Teleporter => {
                let default = TeleporterShape::default();
                Shape::Teleporter(TeleporterShape {
                    border: d.border.unwrap_or(default.border),
                    horizontal: d.horizontal.unwrap_or(default.horizontal),
                })
            }
            ObstacleType::Mesh => {
                let faces = d
                    .faces
                    .iter()
                    .map(|f| {
                        let material = match &f.material {
                            Some(name) => self.material(name)?,
                            None => MaterialId::default(),
                        };
                        Ok(MeshFace { vertices: f.vertices.clone(), material })
                    })
                    .collect::<anyhow::Result<_>>()?;
                Shape::Mesh(MeshShape { vertices: d.vertices.clone(), faces })
            }
            ObstacleType::Arc => {
                let default = ArcShape::default();
                Shape::Arc(ArcShape {
                    sweep: d.sweep.unwrap_or(default.sweep),
                    ratio: d.ratio.unwrap_or(default.ratio),
                    divisions: d.divisions.unwrap_or(default.divisions),
                    materials: self.material_array(&d.materials)?,
                })
            }
            ObstacleType::Cone => {
                let default = ConeShape::default();
                Shape::Cone(ConeShape {
                    sweep: d.sweep.unwrap_or(default.sweep),
                    divisions: d.divisions.unwrap_or(default.divisions),
                    materials: self.material_array(&d.materials)?,
                })
            }
            ObstacleType::Sphere => {
                let default = SphereShape::default();
                Shape::Sphere(SphereShape {
                    divisions: d.divisions.unwrap_or(default.divisions),
                    hemisphere: d.hemisphere.unwrap_or(default.hemisphere),
                    materials: self.material_array(&d.materials)?,
                })
            }
            ObstacleType::Tetra => {
                let Ok(vertices) = <[Vec3; 4]>::try_from(d.vertices.as_slice()) else {
                    bail!("tetras need exactly 4 vertices, got {}", d.vertices.len());
                };
                Shape::Tetra(TetraShape { vertices, materials: self.material_array(&d.materials)? })
            }
        };
        ensure!(
            shape.has_materials() || d.materials.is_empty(),
            "{} obstacles take no materials",
            d.kind
        );
        Ok(shape)
    }

    fn obstacle(&self, d: ObstacleDesc) -> anyhow::Result<Obstacle> {
        let mut obs = Obstacle::new(self.shape(&d)?)
            .with_name(d.name)
            .with_position(d.position)
            .with_size(d.size)
            .with_rotation(d.rotation)
            .with_transform(d.transform);
        let core = &mut obs.core;
        core.team = d.team;
        if let Some(tint) = d.tint {
            core.tint = tint;
        }
        core.phydrv = d.phydrv.as_deref().map(|name| self.driver(name)).transpose()?;
        core.drive_through = d.drive_through;
        core.shoot_through = d.shoot_through;
        core.ricochet = d.ricochet;
        Ok(obs)
    }

    fn instance(&self, d: InstanceDesc) -> anyhow::Result<GroupInstance> {
        let mut inst = GroupInstance::new(d.group);
        inst.set_transform(d.transform);
        if let Some(name) = d.name {
            inst.set_name(name);
        }
        if let Some(team) = d.team {
            inst.set_team(team);
        }
        if let Some(tint) = d.tint {
            inst.set_tint(tint);
        }
        if let Some(name) = &d.phydrv {
            inst.set_physics_driver(self.driver(name)?);
        }
        if let Some(name) = &d.material {
            inst.set_material(self.material(name)?);
        }
        if let Some(mask) = d.drive_through {
            inst.set_drive_through(mask);
        }
        if let Some(mask) = d.shoot_through {
            inst.set_shoot_through(mask);
        }
        if d.ricochet {
            inst.set_can_ricochet();
        }
        for [src, dst] in &d.swaps {
            inst.add_material_swap(self.material(src)?, self.material(dst)?);
        }
        Ok(inst)
    }
}
