use std::{
    cmp::Ordering,
    fmt::{self, Write},
};

use enum_map::EnumMap;
use log::{debug, trace, warn};

use crate::{
    group::{ExpansionContext, GroupInstance},
    math::Transform,
    obstacle::{Obstacle, ObstacleModifier, ObstacleSource, ObstacleType},
    wire::{DecodeError, Packer, U8_SIZE, U32_SIZE, Unpacker, string_size},
};

/// A named collection of obstacles (one list per [`ObstacleType`]) and nested
/// [`GroupInstance`]s.
///
/// The order within each list is the insertion order. For the world
/// definition that order is what [`ObstacleId`][`crate::ObstacleId`] indices
/// refer to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupDefinition {
    name: String,
    lists: EnumMap<ObstacleType, Vec<Obstacle>>,
    groups: Vec<GroupInstance>,
}

impl GroupDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        GroupDefinition { name: name.into(), ..Default::default() }
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_list(&self, kind: ObstacleType) -> &[Obstacle] {
        &self.lists[kind]
    }

    pub fn get_groups(&self) -> &[GroupInstance] {
        &self.groups
    }

    /// All obstacles, list by list in type order.
    pub fn obstacles(&self) -> impl Iterator<Item = &Obstacle> {
        self.lists.values().flatten()
    }

    pub fn obstacle_count(&self) -> usize {
        self.lists.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacle_count() == 0 && self.groups.is_empty()
    }

    pub fn add_obstacle(&mut self, obstacle: Obstacle) {
        self.lists[obstacle.kind()].push(obstacle);
    }

    pub fn add_group_instance(&mut self, group: GroupInstance) {
        self.groups.push(group);
    }

    /// Drops every obstacle and instance, keeping the name.
    pub fn clear(&mut self) {
        self.lists.values_mut().for_each(Vec::clear);
        self.groups.clear();
    }

    pub fn tighten(&mut self) {
        self.lists.values_mut().for_each(Vec::shrink_to_fit);
        self.groups.shrink_to_fit();
    }

    /// Reorders each list by `compare`. This changes which obstacle an
    /// index-based id refers to.
    pub fn sort<F>(&mut self, mut compare: F)
    where
        F: FnMut(&Obstacle, &Obstacle) -> Ordering,
    {
        for list in self.lists.values_mut() {
            list.sort_by(&mut compare);
        }
    }

    /// Expands this definition into `world`.
    ///
    /// Every obstacle here is copied with `xform` placed on top of its own
    /// transform and `modifier`'s overrides applied. Every nested instance is
    /// resolved by name against `defs` and expanded recursively with its own
    /// transform and overrides composed in. Instances naming a missing
    /// definition, or one that is already being expanded further up (a
    /// cycle), are skipped and recorded in `ctx`'s report.
    pub fn make_groups(
        &self,
        xform: &Transform,
        modifier: &ObstacleModifier,
        defs: &[GroupDefinition],
        world: &mut GroupDefinition,
        ctx: &mut ExpansionContext,
    ) {
        let depth = ctx.depth();
        let synthesized = depth > 0;
        let report = ctx.report_mut();
        report.max_depth = report.max_depth.max(depth);

        for (kind, list) in self.lists.iter() {
            for (pos, obs) in list.iter().enumerate() {
                let mut copy = obs.copy_with_transform(xform);
                modifier.execute(&mut copy);
                if synthesized {
                    copy.core.source = ObstacleSource::GroupDef;
                }
                if !copy.is_valid() {
                    debug!(target: "expand", "Dropping invalid {kind} {:?} from {:?}", copy.name(), self.name);
                    ctx.report_mut().invalid_dropped += 1;
                    continue;
                }
                if kind == ObstacleType::Teleporter {
                    let name = ctx.make_tele_name(copy.name(), pos);
                    copy.set_name(name);
                }
                ctx.report_mut().produced[kind] += 1;
                world.add_obstacle(copy);
            }
        }

        for (index, group) in self.groups.iter().enumerate() {
            let Some(def_ix) = find_index(defs, group.get_group_def()) else {
                warn!(target: "expand", "Group definition {:?} is missing", group.get_group_def());
                ctx.report_mut().unresolved.push(group.get_group_def().to_string());
                continue;
            };
            if !ctx.enter(def_ix) {
                warn!(target: "expand", "Avoided recursion into group definition {:?}", group.get_group_def());
                ctx.report_mut().cycles.push(group.get_group_def().to_string());
                continue;
            }

            let group_xform = group.get_transform().then(xform);
            let group_mod = modifier.derive(group);
            ctx.append_group_name(group, index);
            trace!(target: "expand", "Expanding {:?} at depth {}", group.get_group_def(), ctx.depth());

            defs[def_ix].make_groups(&group_xform, &group_mod, defs, world, ctx);

            ctx.pop_group_name();
            ctx.leave(def_ix);
        }
    }

    /// Turns every base into an equivalent box.
    pub fn replace_bases_with_boxes(&mut self) {
        let bases = std::mem::take(&mut self.lists[ObstacleType::Base]);
        self.lists[ObstacleType::Box].extend(bases.iter().filter_map(Obstacle::to_box));
    }

    /// Removes obstacles that fail their own validity check, returning how
    /// many were removed.
    pub fn delete_invalid_obstacles(&mut self) -> usize {
        let mut removed = 0;
        for list in self.lists.values_mut() {
            let before = list.len();
            list.retain(Obstacle::is_valid);
            removed += before - list.len();
        }
        if removed > 0 {
            debug!(target: "groups", "Deleted {removed} invalid obstacles from {:?}", self.name);
        }
        removed
    }

    /// Collects the meshes that were authored in the world file, as opposed
    /// to those produced by expansion.
    pub fn get_source_meshes<'a>(&'a self, meshes: &mut Vec<&'a Obstacle>) {
        meshes.extend(
            self.lists[ObstacleType::Mesh]
                .iter()
                .filter(|m| m.core.source == ObstacleSource::WorldFile),
        );
    }

    pub fn pack_size(&self) -> usize {
        string_size(&self.name)
            + self
                .lists
                .values()
                .map(|list| U32_SIZE + list.iter().map(Obstacle::pack_size).sum::<usize>())
                .sum::<usize>()
            + U32_SIZE
            + self.groups.iter().map(GroupInstance::pack_size).sum::<usize>()
    }

    pub fn pack(&self, p: &mut Packer) {
        p.string(&self.name);
        for list in self.lists.values() {
            p.count(list.len());
            for obs in list {
                obs.pack(p);
            }
        }
        p.count(self.groups.len());
        for group in &self.groups {
            group.pack(p);
        }
    }

    pub fn unpack(u: &mut Unpacker) -> Result<Self, DecodeError> {
        let mut def = GroupDefinition::new(u.string()?);
        for kind in enum_iterator::all::<ObstacleType>() {
            let n = u.count(U8_SIZE)?;
            let list = &mut def.lists[kind];
            list.reserve_exact(n);
            for _ in 0..n {
                let obs = Obstacle::unpack(u)?;
                if obs.kind() != kind {
                    return Err(DecodeError::TypeMismatch {
                        expected: kind.name(),
                        found: obs.kind().name(),
                    });
                }
                list.push(obs);
            }
        }
        let n = u.count(U8_SIZE)?;
        def.groups = (0..n).map(|_| GroupInstance::unpack(u)).collect::<Result<_, _>>()?;
        Ok(def)
    }

    /// Writes the definition as authored: obstacles, then instances, wrapped
    /// in a `define` block unless it's the unnamed top-level definition.
    pub fn print_grouped(&self, out: &mut impl Write, indent: &str) -> fmt::Result {
        let named = !self.name.is_empty();
        let inner = if named { format!("{indent}  ") } else { indent.to_string() };
        if named {
            writeln!(out, "{indent}define {}", self.name)?;
        }
        for obs in self.obstacles() {
            obs.print(out, &inner)?;
        }
        for group in &self.groups {
            group.print(out, &inner)?;
        }
        if named {
            writeln!(out, "{indent}enddef")?;
        }
        Ok(())
    }

    /// Writes only the concrete obstacles, with no grouping.
    pub fn print_flat_file(&self, out: &mut impl Write, indent: &str) -> fmt::Result {
        for obs in self.obstacles() {
            obs.print(out, indent)?;
        }
        Ok(())
    }
}

/// Index of the first definition called `name`. Empty names never resolve.
pub fn find_index(defs: &[GroupDefinition], name: &str) -> Option<usize> {
    if name.is_empty() {
        return None;
    }
    defs.iter().position(|def| def.name == name)
}
