//! Static validation of the provider graph.
//!
//! Runs after scanning and before any instance is created, so missing
//! providers, construction cycles and scope violations fail the bootstrap
//! instead of the first request that hits them.

use std::collections::{HashMap, HashSet};

use crate::config::ScopePolicy;
use crate::descriptors::{Dependency, InjectionKind, ProviderDescriptor, Recipe};
use crate::error::{DiError, DiResult};
use crate::lifetime::Lifetime;
use crate::metadata::{keys, MetadataStore};
use crate::module::{ModuleGraph, ModuleId};
use crate::token::Token;

type Node = (ModuleId, Token);

/// A configuration that is accepted but worth knowing about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// A singleton was promoted to request scope
    ScopePromoted {
        /// Owning module
        module: String,
        /// Promoted provider
        provider: String,
        /// Request-bound dependency that caused the promotion
        dependency: String,
        /// The edge was explicitly acknowledged
        acknowledged: bool,
    },
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::ScopePromoted {
                module,
                provider,
                dependency,
                acknowledged,
            } => write!(
                f,
                "{}::{} promoted to request scope by dependency on {}{}",
                module,
                provider,
                dependency,
                if *acknowledged { "" } else { " (unacknowledged)" }
            ),
        }
    }
}

/// Result of graph validation.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Problems that make the graph unusable
    pub errors: Vec<DiError>,
    /// Accepted configurations worth reporting
    pub warnings: Vec<ValidationWarning>,
    /// Number of providers checked
    pub providers: usize,
}

impl ValidationReport {
    /// True when validation found no error.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// True when there are warnings.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// The first error, if any.
    pub fn into_result(mut self) -> DiResult<Self> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(self.errors.remove(0))
        }
    }

    /// Formats errors and warnings for display.
    pub fn format_issues(&self) -> String {
        let mut output = String::new();
        if !self.errors.is_empty() {
            output.push_str("Validation Errors:\n");
            for error in &self.errors {
                output.push_str(&format!("  - {}\n", error));
            }
        }
        if !self.warnings.is_empty() {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str("Validation Warnings:\n");
            for warning in &self.warnings {
                output.push_str(&format!("  - {}\n", warning));
            }
        }
        output
    }
}

/// Constructor parameters of a provider as the resolver will see them.
pub(crate) fn dependencies_of(descriptor: &ProviderDescriptor, metadata: &MetadataStore) -> Vec<Dependency> {
    match &descriptor.recipe {
        Recipe::Class { target, .. } => metadata
            .get_metadata::<Vec<Dependency>>(keys::PARAM_TYPES, target, None)
            .map(|deps| deps.as_ref().clone())
            .unwrap_or_default(),
        _ => descriptor.dependencies(),
    }
}

struct Edge {
    target: Option<Node>,
    dependency: Dependency,
}

/// Validates `graph` and applies scope promotions to its registries.
pub fn validate_graph(graph: &mut ModuleGraph, metadata: &MetadataStore, policy: ScopePolicy) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut nodes: Vec<Node> = Vec::new();
    let mut lifetimes: HashMap<Node, Lifetime> = HashMap::new();
    let mut edges: HashMap<Node, Vec<Edge>> = HashMap::new();

    for module in graph.modules() {
        for (token, entry) in module.registry.entries() {
            let node = (module.id, token.clone());
            let mut out = Vec::new();
            for dependency in dependencies_of(&entry.descriptor, metadata) {
                if dependency.token.is_request() {
                    out.push(Edge { target: None, dependency });
                    continue;
                }
                match graph.locate(module.id, &dependency.token) {
                    Some((owner, _)) => out.push(Edge {
                        target: Some((owner, dependency.token.clone())),
                        dependency,
                    }),
                    None if dependency.kind == InjectionKind::Optional => {}
                    None => {
                        tracing::debug!(
                            module = module.name(),
                            provider = %token,
                            dependency = %dependency.token,
                            "unsatisfied dependency"
                        );
                        report.errors.push(DiError::not_found(&dependency.token, module.name()));
                    }
                }
            }
            lifetimes.insert(node.clone(), entry.lifetime);
            edges.insert(node.clone(), out);
            nodes.push(node);
        }
    }
    report.providers = nodes.len();

    detect_cycles(&nodes, &edges, &mut report);
    let promotions = resolve_scopes(graph, &nodes, &edges, &mut lifetimes, policy, &mut report);
    for (module, token) in promotions {
        graph.module_mut(module).registry.promote(&token, Lifetime::Request);
    }

    for warning in &report.warnings {
        tracing::warn!("{}", warning);
    }
    report
}

fn detect_cycles(nodes: &[Node], edges: &HashMap<Node, Vec<Edge>>, report: &mut ValidationReport) {
    let mut visited = HashSet::new();
    let mut path = Vec::new();
    for node in nodes {
        dfs_cycles(node, edges, &mut visited, &mut path, report);
    }
}

fn dfs_cycles<'a>(
    current: &'a Node,
    edges: &'a HashMap<Node, Vec<Edge>>,
    visited: &mut HashSet<&'a Node>,
    path: &mut Vec<&'a Node>,
    report: &mut ValidationReport,
) {
    if let Some(start) = path.iter().position(|n| *n == current) {
        let cycle = path[start..]
            .iter()
            .chain(std::iter::once(&current))
            .map(|(_, token)| token.short_name().to_string())
            .collect();
        report.errors.push(DiError::CircularDependency { path: cycle });
        return;
    }
    if !visited.insert(current) {
        return;
    }

    path.push(current);
    for edge in edges.get(current).into_iter().flatten() {
        if edge.dependency.is_deferred() {
            continue;
        }
        if let Some(target) = &edge.target {
            if let Some((key, _)) = edges.get_key_value(target) {
                dfs_cycles(key, edges, visited, path, report);
            }
        }
    }
    path.pop();
}

// Marks request-bound providers until nothing changes. A singleton reaching
// a request-bound provider is promoted or reported, depending on
// acknowledgment and policy. Deferred edges count too: a singleton's cell is
// created outside any request and could never resolve its target.
fn resolve_scopes(
    graph: &ModuleGraph,
    nodes: &[Node],
    edges: &HashMap<Node, Vec<Edge>>,
    lifetimes: &mut HashMap<Node, Lifetime>,
    policy: ScopePolicy,
    report: &mut ValidationReport,
) -> Vec<Node> {
    let mut bound: HashSet<Node> = nodes
        .iter()
        .filter(|n| lifetimes.get(*n) == Some(&Lifetime::Request))
        .cloned()
        .collect();
    let mut rejected: HashSet<Node> = HashSet::new();
    let mut promoted = Vec::new();

    loop {
        let mut changed = false;
        for node in nodes {
            if bound.contains(node) || rejected.contains(node) {
                continue;
            }
            let culprit = edges
                .get(node)
                .into_iter()
                .flatten()
                .find(|edge| edge.target.as_ref().map_or(true, |t| bound.contains(t)));
            let Some(edge) = culprit else { continue };

            let lifetime = lifetimes.get(node).copied().unwrap_or_default();
            if lifetime != Lifetime::Singleton {
                bound.insert(node.clone());
                changed = true;
                continue;
            }

            let acknowledged = edge.dependency.allow_request_scope;
            if acknowledged || policy == ScopePolicy::Warn {
                lifetimes.insert(node.clone(), Lifetime::Request);
                bound.insert(node.clone());
                promoted.push(node.clone());
                report.warnings.push(ValidationWarning::ScopePromoted {
                    module: graph.module(node.0).name().to_string(),
                    provider: node.1.short_name().to_string(),
                    dependency: edge.dependency.token.short_name().to_string(),
                    acknowledged,
                });
                changed = true;
            } else {
                rejected.insert(node.clone());
                report.errors.push(DiError::AmbiguousScope {
                    singleton: node.1.short_name().to_string(),
                    dependency: edge.dependency.token.short_name().to_string(),
                });
            }
        }
        if !changed {
            break;
        }
    }
    promoted
}
