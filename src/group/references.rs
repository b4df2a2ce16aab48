//! Up-front checks of the name references between group definitions.
//!
//! World expansion tolerates missing and cyclic references by skipping them.
//! These checks let a loader reject such worlds before building instead.

use std::hash::RandomState;

use petgraph::{algo::tarjan_scc, graphmap::DiGraphMap};
use thiserror::Error;

use crate::group::{GroupDefinition, definition::find_index};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("group definition {referrer:?} instances missing group definition {missing:?}")]
    Unresolved { referrer: String, missing: String },
    #[error("group definitions reference each other in a cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// Builds the "instances" graph over the definitions: an edge `a -> b` means
/// `a` contains an instance of `b`. Definitions shadowed by an earlier one of
/// the same name are never instanced and are left out.
fn reference_graph<'a>(
    top: &'a GroupDefinition,
    defs: &'a [GroupDefinition],
) -> (DiGraphMap<&'a str, (), RandomState>, Vec<ReferenceError>) {
    let mut g = DiGraphMap::<&str, (), _>::new();
    let mut unresolved = Vec::new();

    let reachable = defs
        .iter()
        .enumerate()
        .filter(|&(ix, def)| find_index(defs, def.get_name()) == Some(ix))
        .map(|(_, def)| def);
    for def in std::iter::once(top).chain(reachable) {
        g.add_node(def.get_name());
        for group in def.get_groups() {
            match find_index(defs, group.get_group_def()) {
                Some(ix) => {
                    g.add_edge(def.get_name(), defs[ix].get_name(), ());
                }
                None => unresolved.push(ReferenceError::Unresolved {
                    referrer: def.get_name().to_string(),
                    missing: group.get_group_def().to_string(),
                }),
            }
        }
    }
    (g, unresolved)
}

/// Every reference problem reachable from any definition, unresolved names
/// first, then cycles.
pub fn reference_problems(top: &GroupDefinition, defs: &[GroupDefinition]) -> Vec<ReferenceError> {
    let (g, mut problems) = reference_graph(top, defs);

    for component in tarjan_scc(&g) {
        let is_cycle = match component.as_slice() {
            [single] => g.contains_edge(*single, *single),
            _ => true,
        };
        if is_cycle {
            // tarjan yields the component in reverse discovery order
            let mut names: Vec<String> = component.iter().rev().map(|s| s.to_string()).collect();
            names.push(names[0].clone());
            problems.push(ReferenceError::Cycle(names));
        }
    }
    problems
}

pub fn check_references(top: &GroupDefinition, defs: &[GroupDefinition]) -> Result<(), ReferenceError> {
    match reference_problems(top, defs).into_iter().next() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use assertables::{assert_len_eq_x, assert_matches};

    use super::*;
    use crate::group::GroupInstance;

    fn def(name: &str, refs: &[&str]) -> GroupDefinition {
        let mut d = GroupDefinition::new(name);
        for r in refs {
            d.add_group_instance(GroupInstance::new(*r));
        }
        d
    }

    #[test]
    fn clean_tree() {
        let top = def("", &["A", "B"]);
        let defs = [def("A", &["B"]), def("B", &[])];
        assert_eq!(check_references(&top, &defs), Ok(()));
    }

    #[test]
    fn missing_name() {
        let top = def("", &["A"]);
        let defs = [def("A", &["ghost"])];
        assert_eq!(
            check_references(&top, &defs),
            Err(ReferenceError::Unresolved { referrer: "A".into(), missing: "ghost".into() })
        );
    }

    #[test]
    fn shadowed_duplicates_are_ignored() {
        let top = def("", &["A"]);
        let defs = [def("A", &[]), def("A", &["ghost"]), def("A", &["A"])];
        assert_eq!(check_references(&top, &defs), Ok(()));
    }

    #[test]
    fn self_loop() {
        let top = def("", &[]);
        let defs = [def("A", &["A"])];
        assert_eq!(
            check_references(&top, &defs),
            Err(ReferenceError::Cycle(vec!["A".into(), "A".into()]))
        );
    }

    #[test]
    fn indirect_cycle_and_missing_name_are_both_reported() {
        let top = def("", &["A"]);
        let defs = [def("A", &["B"]), def("B", &["A", "C"])];
        let problems = reference_problems(&top, &defs);
        assert_len_eq_x!(&problems, 2);
        assert_matches!(&problems[0], ReferenceError::Unresolved { .. });
        let ReferenceError::Cycle(names) = &problems[1] else { panic!("{problems:?}") };
        assert_len_eq_x!(names, 3);
        assert_eq!(names.first(), names.last());
    }
}
