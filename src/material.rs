//! Material registry and material swap tables.
//!
//! Obstacles never own materials, they refer to them by [`MaterialId`], an
//! index into a [`MaterialMgr`]. The same registry contents must be present on
//! both ends of the wire for the ids to mean the same thing.

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};

use derive_more::{Deref, From};
use glam::Vec4;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::wire::{DecodeError, Packer, U32_SIZE, Unpacker};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize, From)]
pub struct MaterialId(pub u32);

impl MaterialId {
    pub fn pack(self, p: &mut Packer) {
        p.u32(self.0);
    }

    pub fn unpack(u: &mut Unpacker) -> Result<Self, DecodeError> {
        Ok(MaterialId(u.u32()?))
    }
}

impl Display for MaterialId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "mat#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    #[serde(default)]
    pub texture: Option<String>,
    #[serde(default = "Material::default_color")]
    pub color: Vec4,
}

impl Material {
    fn default_color() -> Vec4 {
        Vec4::ONE
    }

    pub fn new(name: impl Into<String>) -> Self {
        Material { name: name.into(), texture: None, color: Self::default_color() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MaterialMgr {
    materials: Vec<Material>,
}

impl MaterialMgr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a material, returning the id of an identical existing one if
    /// there is one.
    pub fn add_material(&mut self, material: Material) -> MaterialId {
        if let Some(i) = self.materials.iter().position(|m| *m == material) {
            return MaterialId(i as u32);
        }
        debug!(target: "materials", "Adding material {:?}", material.name);
        self.materials.push(material);
        MaterialId((self.materials.len() - 1) as u32)
    }

    pub fn find_material(&self, name: &str) -> Option<MaterialId> {
        self.materials.iter().position(|m| m.name == name).map(|i| MaterialId(i as u32))
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

/// Source → destination material swaps, kept in id order so the packed form
/// is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[derive(Deref)]
pub struct MaterialMap(BTreeMap<MaterialId, MaterialId>);

impl MaterialMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, src: MaterialId, dst: MaterialId) -> Option<MaterialId> {
        self.0.insert(src, dst)
    }

    /// The swapped material, or `id` itself if it is not mapped.
    pub fn resolve(&self, id: MaterialId) -> MaterialId {
        self.0.get(&id).copied().unwrap_or(id)
    }

    /// A map equivalent to applying `self` and then `after`.
    pub fn then(&self, after: &MaterialMap) -> MaterialMap {
        let mut combined: BTreeMap<_, _> =
            self.0.iter().map(|(&src, &dst)| (src, after.resolve(dst))).collect();
        for (&src, &dst) in after.iter() {
            combined.entry(src).or_insert(dst);
        }
        MaterialMap(combined)
    }

    pub fn pack_size(&self) -> usize {
        U32_SIZE + self.0.len() * 2 * U32_SIZE
    }

    pub fn pack(&self, p: &mut Packer) {
        p.count(self.0.len());
        for (&src, &dst) in self.iter() {
            src.pack(p);
            dst.pack(p);
        }
    }

    pub fn unpack(u: &mut Unpacker) -> Result<Self, DecodeError> {
        let n = u.count(2 * U32_SIZE)?;
        let mut map = MaterialMap::new();
        for _ in 0..n {
            let src = MaterialId::unpack(u)?;
            let dst = MaterialId::unpack(u)?;
            map.insert(src, dst);
        }
        Ok(map)
    }
}

impl FromIterator<(MaterialId, MaterialId)> for MaterialMap {
    fn from_iter<T: IntoIterator<Item = (MaterialId, MaterialId)>>(iter: T) -> Self {
        MaterialMap(iter.into_iter().collect())
    }
}
