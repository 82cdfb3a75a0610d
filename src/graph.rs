//! Graph Builder — turns requested `(rule, component)` pairs plus their
//! transitive dependencies into a DAG of nodes.
//!
//! Nodes are owned flat, keyed by `NodeID`; edges are `NodeID` pairs rather
//! than direct node-to-node references, so the graph never has to juggle
//! shared ownership or lifetimes between nodes — adjacency is just string
//! lookups into one map, the same shape as an adjacency list keyed by task
//! id rather than a web of pointers between nodes.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Result, ZimError};
use crate::model::{Project, RequireRef};

/// One vertex in the execution DAG: one `(component, rule)` reached from the
/// request set.
#[derive(Debug, Clone)]
pub struct Node {
    pub node_id: Arc<str>,
    pub component: Arc<str>,
    pub rule: Arc<str>,
    /// Rule-style `requires` only: dependencies that create a scheduler
    /// edge. Export-style requires never appear here.
    pub depends_on: Vec<Arc<str>>,
    pub dependents: Vec<Arc<str>>,
}

/// The DAG: nodes keyed by `NodeID`, plus the set of originally-requested
/// roots.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: FxHashMap<Arc<str>, Node>,
    pub roots: Vec<Arc<str>>,
}

impl Graph {
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    /// Nodes with no `requires` of rule-style — leaves of the DAG.
    pub fn leaves(&self) -> Vec<Arc<str>> {
        self.nodes
            .values()
            .filter(|n| n.depends_on.is_empty())
            .map(|n| n.node_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Build the DAG for a set of root requests: each `(rule_name,
/// optional_component_filter)` is resolved to matching `(component, rule)`
/// pairs, then DFS'd over `requires`.
pub fn build_graph(
    project: &Project,
    requests: &[(String, Option<Vec<String>>)],
) -> Result<Graph> {
    let mut nodes: FxHashMap<Arc<str>, Node> = FxHashMap::default();
    let mut roots = Vec::new();

    for (rule_name, component_filter) in requests {
        let filter_slice = component_filter.as_deref();
        let matches = project.resolve_request(rule_name, filter_slice);
        if matches.is_empty() {
            return Err(ZimError::UnknownRule { node_id: rule_name.clone() });
        }
        for (component, rule) in matches {
            let node_id = rule.node_id(&component.name);
            roots.push(node_id.clone());
            visit(project, &node_id, &mut nodes)?;
        }
    }

    // Populate dependents (reverse edges) now that every node exists.
    let forward: Vec<(Arc<str>, Arc<str>)> = nodes
        .values()
        .flat_map(|n| n.depends_on.iter().map(|d| (n.node_id.clone(), d.clone())))
        .collect();
    for (dependent, dependency) in forward {
        if let Some(dep_node) = nodes.get_mut(&dependency) {
            dep_node.dependents.push(dependent);
        }
    }

    detect_cycles(&nodes)?;

    Ok(Graph { nodes, roots })
}

/// DFS from `node_id`, creating one `Node` per unique `NodeID` reached and
/// recording rule-style dependency edges. Export-style
/// `requires` are skipped here entirely: they contribute to a rule's input
/// set (resolver's concern) but never create a scheduler edge.
fn visit(project: &Project, node_id: &str, nodes: &mut FxHashMap<Arc<str>, Node>) -> Result<()> {
    if nodes.contains_key(node_id) {
        return Ok(());
    }
    let (component, rule) = project.rule_by_node_id(node_id).ok_or_else(|| ZimError::UnknownRule {
        node_id: node_id.to_string(),
    })?;

    let mut depends_on = Vec::new();
    for req in &rule.requires {
        if req.is_export() {
            continue;
        }
        let Some(dep_rule_name) = req.rule.as_deref() else {
            return Err(ZimError::MalformedRequires {
                node_id: node_id.to_string(),
                reason: "requires entry has neither `rule` nor `export`".to_string(),
            });
        };
        let dep_component = req.resolved_component(&component.name);
        let dep_node_id: Arc<str> = Arc::from(format!("{dep_component}.{dep_rule_name}"));
        depends_on.push(dep_node_id.clone());
        visit(project, &dep_node_id, nodes)?;
    }

    nodes.insert(
        Arc::from(node_id),
        Node {
            node_id: Arc::from(node_id),
            component: component.name.clone(),
            rule: rule.name.clone(),
            depends_on,
            dependents: Vec::new(),
        },
    );
    Ok(())
}

/// Three-color DFS cycle detection over the already-built node set.
fn detect_cycles(nodes: &FxHashMap<Arc<str>, Node>) -> Result<()> {
    let mut colors: FxHashMap<Arc<str>, Color> =
        nodes.keys().map(|k| (k.clone(), Color::White)).collect();

    for start in nodes.keys() {
        if colors[start] != Color::White {
            continue;
        }
        let mut path = Vec::new();
        dfs(start, nodes, &mut colors, &mut path)?;
    }
    Ok(())
}

fn dfs(
    node_id: &Arc<str>,
    nodes: &FxHashMap<Arc<str>, Node>,
    colors: &mut FxHashMap<Arc<str>, Color>,
    path: &mut Vec<Arc<str>>,
) -> Result<()> {
    colors.insert(node_id.clone(), Color::Gray);
    path.push(node_id.clone());

    if let Some(node) = nodes.get(node_id) {
        for dep in &node.depends_on {
            match colors.get(dep).copied().unwrap_or(Color::White) {
                Color::White => dfs(dep, nodes, colors, path)?,
                Color::Gray => {
                    let cycle_start = path.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[cycle_start..].iter().map(|n| n.to_string()).collect();
                    cycle.push(dep.to_string());
                    return Err(ZimError::CyclicDependency { path: cycle.join(" -> ") });
                }
                Color::Black => {}
            }
        }
    }

    path.pop();
    colors.insert(node_id.clone(), Color::Black);
    Ok(())
}

/// All `NodeID`s transitively reachable from `node_id`, including itself —
/// used by `list inputs`/debug tooling to describe one rule's closure.
pub fn transitive_closure(graph: &Graph, node_id: &str) -> FxHashSet<Arc<str>> {
    let mut seen = FxHashSet::default();
    let mut stack = vec![Arc::<str>::from(node_id)];
    while let Some(current) = stack.pop() {
        if !seen.insert(current.clone()) {
            continue;
        }
        if let Some(node) = graph.node(&current) {
            stack.extend(node.depends_on.iter().cloned());
        }
    }
    seen
}
