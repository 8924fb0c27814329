use super::types::HealthCheck;
use anyhow::{Result, bail};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Validated dependency graph over health checks, indexed by declared position.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    ids: Vec<String>,
    dependencies: Vec<BTreeSet<usize>>,
    dependents: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    pub fn build(checks: &[HealthCheck]) -> Result<Self> {
        let index = index_checks(checks)?;

        let mut dependencies = vec![BTreeSet::new(); checks.len()];
        let mut dependents = vec![BTreeSet::new(); checks.len()];
        for (position, check) in checks.iter().enumerate() {
            for dependency in &check.depends_on {
                let Some(&from) = index.get(dependency.as_str()) else {
                    let known = checks.iter().map(|c| c.id.as_str()).collect::<Vec<_>>().join(", ");
                    bail!(
                        "check {} depends on unknown check {dependency} (known checks: [{known}])",
                        check.id
                    );
                };

                if !dependencies[position].insert(from) {
                    bail!("duplicate dependency: {dependency} -> {}", check.id);
                }
                dependents[from].insert(position);
            }
        }

        let graph = Self {
            ids: checks.iter().map(|check| check.id.clone()).collect(),
            dependencies,
            dependents,
        };
        if let Some(path) = graph.find_cycle() {
            bail!("dependency cycle: {}", path.join(" -> "));
        }
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dependencies(&self, index: usize) -> &BTreeSet<usize> {
        &self.dependencies[index]
    }

    pub fn dependents(&self, index: usize) -> &BTreeSet<usize> {
        &self.dependents[index]
    }

    /// Kahn order with ties broken by declared position.
    pub fn topological_order(&self) -> Vec<&str> {
        let mut remaining = self.dependencies.iter().map(BTreeSet::len).collect::<Vec<_>>();
        let mut queue = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(index, _)| index)
            .collect::<BTreeSet<_>>();

        let mut order = Vec::with_capacity(self.ids.len());
        while let Some(index) = queue.pop_first() {
            order.push(self.ids[index].as_str());
            for &dependent in &self.dependents[index] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    queue.insert(dependent);
                }
            }
        }
        order
    }

    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut states = BTreeMap::new();
        let mut stack = Vec::new();
        (0..self.ids.len()).find_map(|start| {
            if states.contains_key(&start) {
                return None;
            }
            self.visit(start, &mut states, &mut stack)
        })
    }

    fn visit(
        &self,
        index: usize,
        states: &mut BTreeMap<usize, Visit>,
        stack: &mut Vec<usize>,
    ) -> Option<Vec<String>> {
        states.insert(index, Visit::InProgress);
        stack.push(index);

        for &next in &self.dependents[index] {
            match states.get(&next) {
                Some(Visit::InProgress) => {
                    let from = stack.iter().position(|entry| *entry == next).unwrap_or(0);
                    let mut cycle = stack[from..]
                        .iter()
                        .map(|entry| self.ids[*entry].clone())
                        .collect::<Vec<_>>();
                    cycle.push(self.ids[next].clone());
                    return Some(cycle);
                }
                Some(Visit::Done) => {}
                None => {
                    if let Some(cycle) = self.visit(next, states, stack) {
                        return Some(cycle);
                    }
                }
            }
        }

        stack.pop();
        states.insert(index, Visit::Done);
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

fn index_checks(checks: &[HealthCheck]) -> Result<HashMap<&str, usize>> {
    let mut index = HashMap::with_capacity(checks.len());
    for (position, check) in checks.iter().enumerate() {
        if check.id.trim().is_empty() {
            bail!("health check id cannot be empty");
        }
        if index.insert(check.id.as_str(), position).is_some() {
            bail!("duplicate health check id: {}", check.id);
        }
    }
    Ok(index)
}
