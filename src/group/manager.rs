use std::fmt::{self, Write};

use log::{debug, info, warn};

use crate::{
    config::BuildConfig,
    group::{
        ExpansionContext, ExpansionReport, GroupDefinition, ReferenceError,
        definition::find_index,
        references::{check_references, reference_problems},
    },
    math::Transform,
    obstacle::{Obstacle, ObstacleModifier, ObstacleType},
    typed_id::ObstacleId,
    wire::{DecodeError, Packer, U32_SIZE, Unpacker},
};

/// Owns the authored group definitions and the world built from them.
///
/// The world-file reader fills in the unnamed top-level definition
/// ([`top_mut`][`Self::top_mut`]) and registers named templates
/// ([`add_group_def`][`Self::add_group_def`]). [`make_world`][`Self::make_world`]
/// then flattens everything into the world definition, which holds only
/// concrete obstacles and is what all queries and the wire format use.
///
/// A manager decoded with [`unpack`][`Self::unpack`] has no top-level
/// definition to rebuild from, so `make_world` keeps the received world
/// until something is added to the top level or the manager is cleared.
///
/// Nothing here is synchronized: rebuild and unpack need `&mut self`, and
/// everything else only reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupDefinitionMgr {
    top: GroupDefinition,
    world: GroupDefinition,
    list: Vec<GroupDefinition>,
    /// The world came off the wire rather than from `top`
    received: bool,
}

impl GroupDefinitionMgr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the world, the top-level definition and every template.
    pub fn clear(&mut self) {
        self.top.clear();
        self.world.clear();
        self.list.clear();
        self.received = false;
    }

    pub fn tighten(&mut self) {
        self.top.tighten();
        self.world.tighten();
        self.list.iter_mut().for_each(GroupDefinition::tighten);
        self.list.shrink_to_fit();
    }

    /// Rebuilds the world from the top-level definition.
    ///
    /// On a manager that was unpacked and whose top level is still empty,
    /// the received world is kept as it is and the report says so.
    ///
    /// Top-level obstacles are copied as they are, top-level instances are
    /// expanded recursively. Anything previously in the world, including
    /// obstacles added with [`add_world_obstacle`][`Self::add_world_obstacle`],
    /// is discarded first.
    pub fn make_world(&mut self) -> ExpansionReport {
        if self.received && self.top.is_empty() {
            warn!(target: "groups", "No top-level definition to rebuild from, keeping the received world");
            let mut report = ExpansionReport { kept_received_world: true, ..Default::default() };
            for kind in enum_iterator::all::<ObstacleType>() {
                report.produced[kind] = self.world.get_list(kind).len();
            }
            return report;
        }
        self.received = false;
        self.world.clear();

        let mut ctx = ExpansionContext::new();
        ctx.clear_depth_name();
        self.top.make_groups(
            &Transform::identity(),
            &ObstacleModifier::new(),
            &self.list,
            &mut self.world,
            &mut ctx,
        );

        let report = ctx.into_report();
        info!(target: "groups", "Built world: {report}");
        report
    }

    /// Builds the world with the optional passes `cfg` asks for.
    pub fn build(&mut self, cfg: &BuildConfig) -> Result<ExpansionReport, ReferenceError> {
        if cfg.strict_references {
            check_references(&self.top, &self.list)?;
        }

        let mut dropped = 0;
        if cfg.delete_invalid {
            dropped += self.top.delete_invalid_obstacles();
            dropped += self.list.iter_mut().map(GroupDefinition::delete_invalid_obstacles).sum::<usize>();
        }

        let mut report = self.make_world();
        report.invalid_dropped += dropped;

        if cfg.replace_bases_with_boxes {
            self.replace_bases_with_boxes();
        }
        if cfg.sort_output {
            self.world.sort(|a, b| {
                let (pa, pb) = (a.world_position(), b.world_position());
                a.name()
                    .cmp(b.name())
                    .then(pa.x.total_cmp(&pb.x))
                    .then(pa.y.total_cmp(&pb.y))
                    .then(pa.z.total_cmp(&pb.z))
            });
        }
        self.tighten();
        Ok(report)
    }

    pub fn replace_bases_with_boxes(&mut self) {
        self.world.replace_bases_with_boxes();
        self.list.iter_mut().for_each(GroupDefinition::replace_bases_with_boxes);
    }

    /// Adds an obstacle straight to the world, bypassing expansion. The next
    /// [`make_world`][`Self::make_world`] drops it again.
    pub fn add_world_obstacle(&mut self, obstacle: Obstacle) {
        self.world.add_obstacle(obstacle);
    }

    /// Registers a named template. Lookups return the first definition
    /// registered under a name, so later duplicates are never instanced.
    pub fn add_group_def(&mut self, def: GroupDefinition) {
        if self.find_group_def(def.get_name()).is_some() {
            debug!(target: "groups", "Group definition {:?} is already defined", def.get_name());
        }
        self.list.push(def);
    }

    pub fn find_group_def(&self, name: &str) -> Option<&GroupDefinition> {
        find_index(&self.list, name).map(|ix| &self.list[ix])
    }

    pub fn group_defs(&self) -> &[GroupDefinition] {
        &self.list
    }

    /// The authored, unnamed top-level definition.
    pub fn top(&self) -> &GroupDefinition {
        &self.top
    }

    pub fn top_mut(&mut self) -> &mut GroupDefinition {
        &mut self.top
    }

    pub fn get_world(&self) -> &GroupDefinition {
        &self.world
    }

    pub fn check_references(&self) -> Result<(), ReferenceError> {
        check_references(&self.top, &self.list)
    }

    pub fn reference_problems(&self) -> Vec<ReferenceError> {
        reference_problems(&self.top, &self.list)
    }

    /// Meshes that came from the world file: those placed directly in the
    /// world, plus every mesh in every template whether or not it was ever
    /// instanced.
    pub fn get_source_meshes(&self) -> Vec<&Obstacle> {
        let mut meshes = Vec::new();
        self.world.get_source_meshes(&mut meshes);
        for def in &self.list {
            def.get_source_meshes(&mut meshes);
        }
        meshes
    }

    pub fn get_walls(&self) -> &[Obstacle] {
        self.world.get_list(ObstacleType::Wall)
    }

    pub fn get_boxes(&self) -> &[Obstacle] {
        self.world.get_list(ObstacleType::Box)
    }

    pub fn get_pyrs(&self) -> &[Obstacle] {
        self.world.get_list(ObstacleType::Pyramid)
    }

    pub fn get_bases(&self) -> &[Obstacle] {
        self.world.get_list(ObstacleType::Base)
    }

    pub fn get_teles(&self) -> &[Obstacle] {
        self.world.get_list(ObstacleType::Teleporter)
    }

    pub fn get_meshes(&self) -> &[Obstacle] {
        self.world.get_list(ObstacleType::Mesh)
    }

    pub fn get_arcs(&self) -> &[Obstacle] {
        self.world.get_list(ObstacleType::Arc)
    }

    pub fn get_cones(&self) -> &[Obstacle] {
        self.world.get_list(ObstacleType::Cone)
    }

    pub fn get_spheres(&self) -> &[Obstacle] {
        self.world.get_list(ObstacleType::Sphere)
    }

    pub fn get_tetras(&self) -> &[Obstacle] {
        self.world.get_list(ObstacleType::Tetra)
    }

    /// Looks up a world obstacle by raw id. Unknown types and out-of-range
    /// indices give `None`.
    pub fn get_obstacle_from_id(&self, raw: u32) -> Option<&Obstacle> {
        self.get_obstacle(ObstacleId::from_raw(raw)?)
    }

    pub fn get_obstacle(&self, id: ObstacleId) -> Option<&Obstacle> {
        self.world.get_list(id.kind()).get(id.index())
    }

    /// The id of the `index`th world obstacle of `kind`, if there is one.
    pub fn obstacle_id(&self, kind: ObstacleType, index: usize) -> Option<ObstacleId> {
        (index < self.world.get_list(kind).len()).then_some(())?;
        ObstacleId::from_index(kind, index)
    }

    pub fn pack_size(&self) -> usize {
        self.world.pack_size()
            + U32_SIZE
            + self.list.iter().map(GroupDefinition::pack_size).sum::<usize>()
    }

    pub fn pack_into(&self, p: &mut Packer) {
        self.world.pack(p);
        p.count(self.list.len());
        for def in &self.list {
            def.pack(p);
        }
    }

    /// The world followed by every template, in registration order.
    pub fn pack(&self) -> Vec<u8> {
        let mut p = Packer::with_capacity(self.pack_size());
        self.pack_into(&mut p);
        p.into_bytes()
    }

    /// Decodes a manager from a stream produced by [`pack`][`Self::pack`].
    ///
    /// The result has an empty top-level definition: only the built world
    /// and the templates travel. See [`make_world`][`Self::make_world`] for
    /// how such a manager rebuilds.
    pub fn unpack_from(u: &mut Unpacker) -> Result<Self, DecodeError> {
        let world = GroupDefinition::unpack(u)?;
        let n = u.count(U32_SIZE)?;
        let list = (0..n).map(|_| GroupDefinition::unpack(u)).collect::<Result<_, _>>()?;
        Ok(GroupDefinitionMgr { top: GroupDefinition::default(), world, list, received: true })
    }

    /// Decodes a complete stream; leftover bytes are an error.
    pub fn unpack(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut u = Unpacker::new(bytes);
        let mgr = Self::unpack_from(&mut u)?;
        u.finish()?;
        Ok(mgr)
    }

    pub fn print(&self, out: &mut impl Write, indent: &str) -> fmt::Result {
        for def in &self.list {
            def.print_grouped(out, indent)?;
            writeln!(out)?;
        }
        self.top.print_grouped(out, indent)
    }
}

#[cfg(test)]
mod tests {
    use assertables::{assert_len_eq_x, assert_matches};
    use glam::{Vec3, Vec4};

    use super::*;
    use crate::{
        group::GroupInstance,
        material::MaterialId,
        obstacle::{ConeShape, MeshFace, MeshShape, Shape},
    };

    fn unit_box() -> Obstacle {
        Obstacle::new(Shape::Box)
    }

    fn tri_mesh() -> Obstacle {
        Obstacle::new(Shape::Mesh(MeshShape {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            faces: vec![MeshFace { vertices: vec![0, 1, 2], material: MaterialId(0) }],
        }))
    }

    /// Template "T" holding one unit box at the origin.
    fn mgr_with_template() -> GroupDefinitionMgr {
        let mut mgr = GroupDefinitionMgr::new();
        let mut t = GroupDefinition::new("T");
        t.add_obstacle(unit_box());
        mgr.add_group_def(t);
        mgr
    }

    #[test]
    fn translated_instance_with_team_override() {
        let mut mgr = mgr_with_template();
        let mut inst = GroupInstance::new("T");
        inst.set_transform(Transform::shift(Vec3::new(5.0, 0.0, 0.0))).set_team(2);
        mgr.top_mut().add_group_instance(inst);

        let report = mgr.make_world();
        assert_eq!(report.produced[ObstacleType::Box], 1);

        let [b] = mgr.get_boxes() else { panic!("expected exactly one box") };
        assert!(b.world_position().abs_diff_eq(Vec3::new(5.0, 0.0, 0.0), 1e-5));
        assert_eq!(b.core.team, 2);
    }

    #[test]
    fn rebuilding_does_not_accumulate() {
        let mut mgr = mgr_with_template();
        mgr.top_mut().add_group_instance(GroupInstance::new("T"));
        mgr.make_world();
        mgr.add_world_obstacle(Obstacle::new(Shape::Wall));
        assert_len_eq_x!(mgr.get_walls(), 1);

        mgr.make_world();
        assert_len_eq_x!(mgr.get_boxes(), 1);
        assert!(mgr.get_walls().is_empty());
    }

    #[test]
    fn ids_agree_with_accessors() {
        let mut mgr = GroupDefinitionMgr::new();
        for i in 0..3 {
            mgr.top_mut().add_obstacle(unit_box().with_name(format!("box{i}")));
        }
        mgr.top_mut().add_obstacle(Obstacle::new(Shape::Cone(ConeShape::default())));
        mgr.make_world();

        for (i, b) in mgr.get_boxes().iter().enumerate() {
            let id = mgr.obstacle_id(ObstacleType::Box, i).unwrap();
            assert!(std::ptr::eq(mgr.get_obstacle_from_id(id.to_raw()).unwrap(), b));
        }
        let cone = mgr.get_obstacle_from_id(ObstacleId::new(ObstacleType::Cone, 0).to_raw());
        assert!(std::ptr::eq(cone.unwrap(), &mgr.get_cones()[0]));
    }

    #[test]
    fn out_of_range_ids_are_not_found() {
        let mut mgr = mgr_with_template();
        mgr.top_mut().add_group_instance(GroupInstance::new("T"));
        mgr.make_world();

        assert!(mgr.get_obstacle_from_id(ObstacleId::new(ObstacleType::Box, 1).to_raw()).is_none());
        assert!(mgr.get_obstacle_from_id(ObstacleId::new(ObstacleType::Wall, 0).to_raw()).is_none());
        assert!(mgr.get_obstacle_from_id(0x0042_0000).is_none());
        assert!(mgr.get_obstacle_from_id(u32::MAX).is_none());
        assert_eq!(mgr.obstacle_id(ObstacleType::Box, 1), None);
    }

    #[test]
    fn cyclic_templates_terminate() {
        let mut mgr = GroupDefinitionMgr::new();
        let mut a = GroupDefinition::new("A");
        a.add_obstacle(unit_box());
        a.add_group_instance(GroupInstance::new("B"));
        let mut b = GroupDefinition::new("B");
        b.add_obstacle(Obstacle::new(Shape::Wall));
        b.add_group_instance(GroupInstance::new("A"));
        mgr.add_group_def(a);
        mgr.add_group_def(b);
        mgr.top_mut().add_group_instance(GroupInstance::new("A"));

        let report = mgr.make_world();
        assert_len_eq_x!(mgr.get_boxes(), 1);
        assert_len_eq_x!(mgr.get_walls(), 1);
        assert_eq!(report.cycles, vec!["A".to_string()]);
        assert_matches!(mgr.check_references(), Err(ReferenceError::Cycle(_)));
    }

    #[test]
    fn strict_build_rejects_missing_templates() {
        let mut mgr = GroupDefinitionMgr::new();
        mgr.top_mut().add_group_instance(GroupInstance::new("ghost"));

        let lenient = mgr.build(&BuildConfig::default()).unwrap();
        assert_eq!(lenient.unresolved, vec!["ghost".to_string()]);

        let strict = BuildConfig { strict_references: true, ..Default::default() };
        assert_matches!(mgr.build(&strict), Err(ReferenceError::Unresolved { .. }));
    }

    #[test]
    fn build_passes() {
        let mut mgr = GroupDefinitionMgr::new();
        let mut base = Obstacle::new(Shape::Base);
        base.core.team = 1;
        mgr.top_mut().add_obstacle(base);
        mgr.top_mut().add_obstacle(unit_box().with_name("b").with_size(Vec3::ZERO));
        mgr.top_mut().add_obstacle(unit_box().with_name("a"));

        let cfg = BuildConfig {
            delete_invalid: true,
            replace_bases_with_boxes: true,
            sort_output: true,
            ..Default::default()
        };
        let report = mgr.build(&cfg).unwrap();
        assert_eq!(report.invalid_dropped, 1);
        assert!(mgr.get_bases().is_empty());
        let names: Vec<_> = mgr.get_boxes().iter().map(Obstacle::name).collect();
        assert_eq!(names, vec!["", "a"]);
    }

    #[test]
    fn source_meshes_include_uninstanced_templates() {
        let mut mgr = GroupDefinitionMgr::new();
        let mut t = GroupDefinition::new("T");
        t.add_obstacle(tri_mesh());
        mgr.add_group_def(t);
        let mut unused = GroupDefinition::new("U");
        unused.add_obstacle(tri_mesh());
        mgr.add_group_def(unused);
        mgr.top_mut().add_obstacle(tri_mesh());
        mgr.top_mut().add_group_instance(GroupInstance::new("T"));
        mgr.make_world();

        assert_len_eq_x!(mgr.get_meshes(), 2);
        // the top-level mesh plus one per template; the expanded copy is not a source
        assert_len_eq_x!(mgr.get_source_meshes(), 3);
    }

    #[test]
    fn whole_manager_round_trip() {
        let mut mgr = mgr_with_template();
        let mut tele = GroupDefinition::new("pad");
        tele.add_obstacle(Obstacle::new(Shape::Teleporter(Default::default())));
        mgr.add_group_def(tele);

        let mut inst = GroupInstance::new("T");
        inst.set_tint(Vec4::new(1.0, 0.0, 0.0, 1.0)).set_team(3);
        mgr.top_mut().add_group_instance(inst);
        mgr.top_mut().add_group_instance(GroupInstance::new("pad"));
        mgr.top_mut().add_obstacle(Obstacle::new(Shape::Wall).with_size(Vec3::new(0.0, 100.0, 5.0)));
        mgr.make_world();

        let bytes = mgr.pack();
        assert_eq!(bytes.len(), mgr.pack_size());

        let back = GroupDefinitionMgr::unpack(&bytes).unwrap();
        assert_eq!(back.get_world(), mgr.get_world());
        assert_eq!(back.group_defs(), mgr.group_defs());
        assert!(back.top().is_empty());
        assert_eq!(back.get_teles()[0].name(), "pad:1/t0");
    }

    #[test]
    fn rebuilding_an_unpacked_manager_keeps_its_world() {
        let mut mgr = mgr_with_template();
        mgr.top_mut().add_group_instance(GroupInstance::new("T"));
        mgr.make_world();

        let mut back = GroupDefinitionMgr::unpack(&mgr.pack()).unwrap();
        let report = back.make_world();
        assert!(report.kept_received_world);
        assert_eq!(report.produced[ObstacleType::Box], 1);
        assert_len_eq_x!(back.get_boxes(), 1);
        assert_eq!(back.get_world(), mgr.get_world());

        // once the top level is authored again, rebuilding starts over from it
        back.top_mut().add_obstacle(Obstacle::new(Shape::Wall));
        let report = back.make_world();
        assert!(!report.kept_received_world);
        assert_len_eq_x!(back.get_walls(), 1);
        assert!(back.get_boxes().is_empty());

        let mut cleared = GroupDefinitionMgr::unpack(&mgr.pack()).unwrap();
        cleared.clear();
        assert!(!cleared.make_world().kept_received_world);
    }

    #[test]
    fn shadowed_template_does_not_fail_strict_build() {
        let mut mgr = mgr_with_template();
        let mut shadow = GroupDefinition::new("T");
        shadow.add_group_instance(GroupInstance::new("ghost"));
        mgr.add_group_def(shadow);
        mgr.top_mut().add_group_instance(GroupInstance::new("T"));

        assert!(mgr.make_world().is_clean());
        let strict = BuildConfig { strict_references: true, ..Default::default() };
        let report = mgr.build(&strict).unwrap();
        assert_eq!(report.produced[ObstacleType::Box], 1);
    }

    #[test]
    fn corrupt_streams_fail_cleanly() {
        let mut mgr = mgr_with_template();
        mgr.top_mut().add_group_instance(GroupInstance::new("T"));
        mgr.make_world();
        let bytes = mgr.pack();

        for len in [0, 1, 7, bytes.len() / 2, bytes.len() - 1] {
            assert!(GroupDefinitionMgr::unpack(&bytes[..len]).is_err(), "prefix of {len} bytes");
        }
        let mut extra = bytes.clone();
        extra.push(0);
        assert_eq!(GroupDefinitionMgr::unpack(&extra), Err(DecodeError::TrailingBytes(1)));
    }

    #[test]
    fn print_lists_templates_then_top() {
        let mut mgr = mgr_with_template();
        mgr.top_mut().add_group_instance(GroupInstance::new("T"));
        let mut s = String::new();
        mgr.print(&mut s, "").unwrap();
        assert!(s.starts_with("define T\n"), "{s}");
        assert!(s.ends_with("group T\nend\n"), "{s}");
    }
}
