//! Field dependency graph of one step.
//!
//! Kahn's algorithm gives a deterministic resolution order (ties broken by
//! declaration order) and turns circular `dependsOn` configurations into a
//! composition error instead of a runtime loop.

use crate::core::value_path::ValuePath;
use crate::error::ComposeError;
use crate::schema::field::FieldDescriptor;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyGraph {
    /// `dependents[i]` lists the fields that read field `i`.
    dependents: Vec<Vec<usize>>,
    order: Vec<usize>,
    index: HashMap<ValuePath, usize>,
}

impl DependencyGraph {
    /// Builds the graph from the step-local dependencies of `fields`.
    /// References that name a step are cross-step and do not take part in
    /// ordering.
    pub fn build(fields: &[FieldDescriptor]) -> Result<Self, ComposeError> {
        let index = fields
            .iter()
            .enumerate()
            .map(|(idx, field)| (field.name.clone(), idx))
            .collect::<HashMap<_, _>>();

        let n = fields.len();
        let mut dependents = vec![Vec::<usize>::new(); n];
        let mut dependencies = vec![Vec::<usize>::new(); n];
        let mut in_degree = vec![0usize; n];

        for (idx, field) in fields.iter().enumerate() {
            for dependency in field.dependencies() {
                if dependency.step.is_some() {
                    continue;
                }
                let Some(&source) = index.get(&dependency.path) else {
                    return Err(ComposeError::UnknownDependency {
                        field: field.name.to_string(),
                        dependency: dependency.path.to_string(),
                    });
                };
                if !dependents[source].contains(&idx) {
                    dependents[source].push(idx);
                    dependencies[idx].push(source);
                    in_degree[idx] += 1;
                }
            }
        }

        let mut ready = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| idx)
            .collect::<BTreeSet<usize>>();
        let mut order = Vec::with_capacity(n);

        while let Some(current) = ready.pop_first() {
            order.push(current);
            for &next in &dependents[current] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() < n {
            let path = cycle_path(fields, &dependencies, &in_degree);
            debug!(cycle = ?path, "dependency cycle detected");
            return Err(ComposeError::DependencyCycle { path });
        }

        Ok(Self {
            dependents,
            order,
            index,
        })
    }

    /// Field indexes in resolution order.
    pub fn order(&self) -> &[usize] {
        self.order.as_slice()
    }

    pub fn index_of(&self, path: &ValuePath) -> Option<usize> {
        self.index.get(path).copied()
    }

    /// Fields transitively affected by a change at `path`, in resolution
    /// order. A change to a nested value counts for the enclosing field.
    pub fn dependents_of(&self, path: &ValuePath) -> Vec<usize> {
        let mut affected = vec![false; self.dependents.len()];
        let mut stack = self
            .index
            .iter()
            .filter(|(name, _)| name.overlaps(path))
            .map(|(_, idx)| *idx)
            .collect::<Vec<_>>();

        while let Some(current) = stack.pop() {
            for &next in &self.dependents[current] {
                if !affected[next] {
                    affected[next] = true;
                    stack.push(next);
                }
            }
        }

        self.order
            .iter()
            .copied()
            .filter(|idx| affected[*idx])
            .collect()
    }
}

/// Follows unresolved dependencies backwards from a node left over by the
/// sort. Every leftover node still has a leftover dependency, so the walk
/// ends on a cycle.
fn cycle_path(
    fields: &[FieldDescriptor],
    dependencies: &[Vec<usize>],
    in_degree: &[usize],
) -> Vec<String> {
    let Some(start) = in_degree.iter().position(|degree| *degree > 0) else {
        return Vec::new();
    };
    let mut visited = Vec::<usize>::new();
    let mut current = start;
    loop {
        if let Some(pos) = visited.iter().position(|idx| *idx == current) {
            let mut path = visited[pos..]
                .iter()
                .map(|idx| fields[*idx].name.to_string())
                .collect::<Vec<_>>();
            path.push(fields[current].name.to_string());
            return path;
        }
        visited.push(current);
        let Some(&previous) = dependencies[current]
            .iter()
            .find(|previous| in_degree[**previous] > 0)
        else {
            return visited
                .iter()
                .map(|idx| fields[*idx].name.to_string())
                .collect();
        };
        current = previous;
    }
}

#[cfg(test)]
mod tests {
    use super::DependencyGraph;
    use crate::core::value_path::ValuePath;
    use crate::error::ComposeError;
    use crate::schema::condition::Condition;
    use crate::schema::field::FieldDescriptor;

    #[test]
    fn order_puts_dependencies_first_and_keeps_declaration_ties() {
        let fields = vec![
            FieldDescriptor::text("PORT", "Port").visible_when(Condition::truthy("ENABLED")),
            FieldDescriptor::text("NAME", "Name"),
            FieldDescriptor::switch("ENABLED", "Enabled"),
        ];
        let graph = DependencyGraph::build(&fields).expect("graph");
        assert_eq!(graph.order(), &[1, 2, 0]);
    }

    #[test]
    fn cycles_are_reported_with_their_members() {
        let fields = vec![
            FieldDescriptor::text("A", "A").depends_on("B"),
            FieldDescriptor::text("B", "B").depends_on("C"),
            FieldDescriptor::text("C", "C").depends_on("A"),
            FieldDescriptor::text("D", "D"),
        ];
        let Err(ComposeError::DependencyCycle { path }) = DependencyGraph::build(&fields) else {
            panic!("expected a cycle");
        };
        assert_eq!(path.first(), path.last());
        assert_eq!(path.len(), 4);
        assert!(!path.contains(&"D".to_string()));
    }

    #[test]
    fn unknown_local_dependency_is_rejected_but_cross_step_is_not() {
        let unknown = vec![FieldDescriptor::text("A", "A").depends_on("MISSING")];
        assert!(matches!(
            DependencyGraph::build(&unknown),
            Err(ComposeError::UnknownDependency { .. })
        ));

        let cross = vec![FieldDescriptor::text("A", "A").depends_on("general::MISSING")];
        assert!(DependencyGraph::build(&cross).is_ok());
    }

    #[test]
    fn dependents_are_transitive_and_ordered() {
        let fields = vec![
            FieldDescriptor::switch("ENABLED", "Enabled"),
            FieldDescriptor::text("PORT", "Port").depends_on("ENABLED"),
            FieldDescriptor::text("URL", "Url").depends_on("PORT"),
            FieldDescriptor::text("OTHER", "Other"),
        ];
        let graph = DependencyGraph::build(&fields).expect("graph");
        assert_eq!(graph.dependents_of(&ValuePath::from("ENABLED")), vec![1, 2]);
        assert!(graph.dependents_of(&ValuePath::from("OTHER")).is_empty());
    }
}
