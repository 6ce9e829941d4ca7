//! Build order over the model dependency graph

use crate::error::{Result, StackError};
use crate::registry::ModelRegistry;
use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Dependencies-first order of the transitive closure of `targets`.
///
/// Dependencies are visited in declaration order, so the result is the same
/// on every run. A cycle is reported as the path that closes it, for example
/// `a -> b -> a`.
pub fn topological_order(registry: &ModelRegistry, targets: &[String]) -> Result<Vec<String>> {
    let mut marks: HashMap<String, Mark> = HashMap::new();
    let mut order = Vec::new();
    let mut path = Vec::new();
    for target in targets {
        visit(registry, target, &mut marks, &mut path, &mut order)?;
    }
    Ok(order)
}

fn visit(
    registry: &ModelRegistry,
    name: &str,
    marks: &mut HashMap<String, Mark>,
    path: &mut Vec<String>,
    order: &mut Vec<String>,
) -> Result<()> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = path.iter().position(|n| n == name).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(name.to_string());
            return Err(StackError::CyclicDependency { cycle });
        }
        None => {}
    }

    let spec = registry.resolve(name)?;
    marks.insert(name.to_string(), Mark::Visiting);
    path.push(name.to_string());
    for dep in spec.dependencies() {
        visit(registry, dep, marks, path, order)?;
    }
    path.pop();
    marks.insert(name.to_string(), Mark::Done);
    order.push(name.to_string());
    Ok(())
}

/// Split a dependencies-first order into waves. Every model in wave `k`
/// depends only on models of earlier waves; order inside a wave follows
/// `order`.
pub fn waves(registry: &ModelRegistry, order: &[String]) -> Result<Vec<Vec<String>>> {
    let mut level: HashMap<&str, usize> = HashMap::new();
    let mut waves: Vec<Vec<String>> = Vec::new();
    for name in order {
        let spec = registry.resolve(name)?;
        let mut lvl = 0;
        for dep in spec.dependencies() {
            let dep_level = level.get(dep.as_str()).copied().ok_or_else(|| {
                StackError::Data(format!("'{}' is ordered before its dependency '{}'", name, dep))
            })?;
            lvl = lvl.max(dep_level + 1);
        }
        level.insert(name.as_str(), lvl);
        if waves.len() <= lvl {
            waves.resize_with(lvl + 1, Vec::new);
        }
        waves[lvl].push(name.clone());
    }
    Ok(waves)
}

/// Every model that depends on `name`, directly or transitively,
/// in registration order
pub fn dependents(registry: &ModelRegistry, name: &str) -> Vec<String> {
    let mut found: Vec<String> = vec![name.to_string()];
    let mut changed = true;
    while changed {
        changed = false;
        for spec in registry.specs() {
            if found.iter().any(|f| f == spec.name()) {
                continue;
            }
            if spec.dependencies().iter().any(|d| found.contains(d)) {
                found.push(spec.name().to_string());
                changed = true;
            }
        }
    }
    found.remove(0);
    let mut ordered: Vec<String> = registry
        .names()
        .iter()
        .filter(|n| found.contains(n))
        .cloned()
        .collect();
    ordered.dedup();
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::SimpleAverage;
    use crate::registry::{ModelSpec, RegistryBuilder};

    fn spec(name: &str, deps: &[&str]) -> ModelSpec {
        ModelSpec::new(name, SimpleAverage::new).with_dependencies(deps.iter().copied())
    }

    fn diamond() -> ModelRegistry {
        RegistryBuilder::new()
            .with(spec("c", &[]))
            .with(spec("a", &["c"]))
            .with(spec("b", &["c"]))
            .with(spec("stack", &["a", "b"]))
            .freeze()
    }

    #[test]
    fn test_order_and_waves() {
        let registry = diamond();
        let order = topological_order(&registry, &["stack".to_string()]).unwrap();
        assert_eq!(order, vec!["c", "a", "b", "stack"]);
        let waves = waves(&registry, &order).unwrap();
        assert_eq!(waves, vec![vec!["c"], vec!["a", "b"], vec!["stack"]]);
    }

    #[test]
    fn test_cycle_is_named() {
        let registry = RegistryBuilder::new()
            .with(spec("a", &["b"]))
            .with(spec("b", &["c"]))
            .with(spec("c", &["a"]))
            .freeze();
        let err = topological_order(&registry, &["a".to_string()]).unwrap_err();
        match err {
            StackError::CyclicDependency { cycle } => assert_eq!(cycle, vec!["a", "b", "c", "a"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_loop() {
        let registry = RegistryBuilder::new().with(spec("a", &["a"])).freeze();
        assert!(matches!(
            topological_order(&registry, &["a".to_string()]),
            Err(StackError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_dependents() {
        assert_eq!(dependents(&diamond(), "c"), vec!["a", "b", "stack"]);
        assert!(dependents(&diamond(), "stack").is_empty());
    }
}
