use std::collections::{BTreeSet, HashMap};

use porter_domain::Resource;

use crate::error::GraphError;

/// Build a dependency-respecting execution order using topological sorting.
///
/// Among resources that are ready at the same time, names are taken in
/// lexical order so the result is stable.
///
/// # Errors
///
/// Returns an error when a name is declared twice, when dependencies point to
/// missing resources, or when a dependency cycle is detected.
pub fn build_execution_order(resources: &[Resource]) -> std::result::Result<Vec<String>, GraphError> {
    if resources.is_empty() {
        return Ok(Vec::new());
    }

    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for resource in resources {
        if indegree.insert(resource.name.as_str(), 0).is_some() {
            return Err(GraphError::DuplicateResource {
                name: resource.name.to_string(),
            });
        }
        adjacency.entry(resource.name.as_str()).or_default();
    }

    let mut missing = Vec::new();
    for resource in resources {
        for dependency in &resource.depends_on {
            if !indegree.contains_key(dependency.as_str()) {
                missing.push(format!(
                    "{} depends on missing resource {dependency}",
                    resource.name
                ));
                continue;
            }

            adjacency
                .entry(dependency.as_str())
                .or_default()
                .push(resource.name.as_str());

            let Some(entry) = indegree.get_mut(resource.name.as_str()) else {
                return Err(GraphError::Invariant {
                    message: format!("internal graph error: missing indegree for {}", resource.name),
                });
            };
            *entry += 1;
        }
    }

    if !missing.is_empty() {
        let details = missing.join("\n  - ");
        return Err(GraphError::MissingNodes { details });
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter_map(|(name, count)| (*count == 0).then_some(*name))
        .collect();

    let mut order = Vec::with_capacity(resources.len());
    while let Some(next) = ready.pop_first() {
        order.push(next.to_string());

        if let Some(neighbors) = adjacency.get(next) {
            for neighbor in neighbors {
                let Some(entry) = indegree.get_mut(neighbor) else {
                    return Err(GraphError::Invariant {
                        message: "internal graph error: missing neighbor indegree".to_string(),
                    });
                };

                if *entry == 0 {
                    continue;
                }

                *entry -= 1;
                if *entry == 0 {
                    ready.insert(*neighbor);
                }
            }
        }
    }

    if order.len() != indegree.len() {
        let mut leftovers: Vec<&str> = indegree
            .iter()
            .filter_map(|(name, count)| (*count > 0).then_some(*name))
            .collect();
        leftovers.sort_unstable();
        return Err(GraphError::CycleDetected {
            cycle: leftovers.join(" -> "),
        });
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use porter_domain::{Resource, ResourceName};

    use super::build_execution_order;
    use crate::error::GraphError;

    fn resource(name: &str, depends_on: &[&str]) -> Resource {
        let mut resource = Resource::new(ResourceName::try_from(name).expect("name"));
        resource.depends_on = depends_on.iter().map(|dep| (*dep).to_string()).collect();
        resource
    }

    #[test]
    fn orders_by_dependency_edges() {
        let ordered = build_execution_order(&[
            resource("web", &["db", "cache"]),
            resource("db", &[]),
            resource("cache", &[]),
        ])
        .expect("order");
        assert_eq!(ordered, vec!["cache", "db", "web"]);
    }

    #[test]
    fn reports_missing_dependencies() {
        let error = build_execution_order(&[resource("web", &["db"])]).expect_err("must fail");
        assert!(matches!(error, GraphError::MissingNodes { .. }));
        assert!(error.to_string().contains("web depends on missing resource db"));
    }

    #[test]
    fn detects_cycle() {
        let error = build_execution_order(&[resource("a", &["b"]), resource("b", &["a"])])
            .expect_err("must fail");
        assert_eq!(error.to_string(), "dependency cycle detected among: a -> b");
    }

    #[test]
    fn rejects_duplicate_names() {
        let error = build_execution_order(&[resource("web", &[]), resource("web", &[])])
            .expect_err("must fail");
        assert!(matches!(error, GraphError::DuplicateResource { name } if name == "web"));
    }
}
