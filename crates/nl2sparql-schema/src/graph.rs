//! Labeled schema graph.
//!
//! Nodes are entity local names (plus `?occ` variable nodes once the compiler
//! annotates occurrences). Edges are directed and carry one of the schema
//! labels. Path search treats the graph as undirected; the direction of each
//! step is recovered from which endpoint holds the edge.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction as PetDirection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeLabel {
    SubClassOf,
    SubPropertyOf,
    Domain,
    Range,
    Type,
}

impl EdgeLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeLabel::SubClassOf => "subClassOf",
            EdgeLabel::SubPropertyOf => "subPropertyOf",
            EdgeLabel::Domain => "domain",
            EdgeLabel::Range => "range",
            EdgeLabel::Type => "type",
        }
    }

    pub fn is_domain_or_range(self) -> bool {
        matches!(self, EdgeLabel::Domain | EdgeLabel::Range)
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which way a path step walks its schema edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepDirection {
    /// `from` holds the edge (`from --label--> to`).
    Forward,
    /// `to` holds the edge (`to --label--> from`).
    Backward,
}

/// One step of an undirected path, with the schema edge it traverses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathStep {
    pub from: String,
    pub to: String,
    pub label: EdgeLabel,
    pub direction: StepDirection,
}

impl PathStep {
    /// `(subject, object)` of the underlying schema edge.
    pub fn edge_endpoints(&self) -> (&str, &str) {
        match self.direction {
            StepDirection::Forward => (&self.from, &self.to),
            StepDirection::Backward => (&self.to, &self.from),
        }
    }
}

/// Two consecutive `domain` or two consecutive `range` steps.
pub fn has_dome(steps: &[PathStep]) -> bool {
    steps.windows(2).any(|w| {
        w[0].label == w[1].label && w[0].label.is_domain_or_range()
    })
}

#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    graph: DiGraph<String, EdgeLabel>,
    index: BTreeMap<String, NodeIndex>,
}

impl SchemaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str) -> NodeIndex {
        if let Some(ix) = self.index.get(name) {
            return *ix;
        }
        let ix = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), ix);
        ix
    }

    /// Add (or relabel) the edge `from --label--> to`.
    pub fn add_edge(&mut self, from: &str, to: &str, label: EdgeLabel) {
        let a = self.add_node(from);
        let b = self.add_node(to);
        self.graph.update_edge(a, b, label);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Node names in sorted order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// All edges as `(subject, label, object)`, sorted.
    pub fn edges(&self) -> Vec<(&str, EdgeLabel, &str)> {
        let mut out: Vec<_> = self
            .graph
            .edge_references()
            .map(|e| {
                (
                    self.graph[e.source()].as_str(),
                    *e.weight(),
                    self.graph[e.target()].as_str(),
                )
            })
            .collect();
        out.sort();
        out
    }

    /// Label of the edge `from --?--> to`, if any.
    pub fn edge_label(&self, from: &str, to: &str) -> Option<EdgeLabel> {
        let a = *self.index.get(from)?;
        let b = *self.index.get(to)?;
        self.graph.find_edge(a, b).map(|e| self.graph[e])
    }

    /// The edge joining two adjacent nodes, preferring `from -> to`.
    pub fn step(&self, from: &str, to: &str) -> Option<PathStep> {
        if let Some(label) = self.edge_label(from, to) {
            return Some(PathStep {
                from: from.to_string(),
                to: to.to_string(),
                label,
                direction: StepDirection::Forward,
            });
        }
        self.edge_label(to, from).map(|label| PathStep {
            from: from.to_string(),
            to: to.to_string(),
            label,
            direction: StepDirection::Backward,
        })
    }

    /// Convert a node path into directed, labeled steps.
    pub fn directed_steps(&self, path: &[String]) -> Option<Vec<PathStep>> {
        path.windows(2).map(|w| self.step(&w[0], &w[1])).collect()
    }

    /// Undirected neighbours, sorted by name.
    pub fn neighbors(&self, name: &str) -> Vec<&str> {
        let Some(ix) = self.index.get(name) else {
            return Vec::new();
        };
        self.sorted_neighbors(*ix)
            .into_iter()
            .map(|n| self.graph[n].as_str())
            .collect()
    }

    fn sorted_neighbors(&self, ix: NodeIndex) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self.graph.neighbors_undirected(ix).collect();
        out.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        out.dedup();
        out
    }

    /// Nodes whose `subClassOf` chain reaches `class` (the class excluded).
    pub fn descendants(&self, class: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let Some(start) = self.index.get(class) else {
            return out;
        };
        let mut queue = VecDeque::from([*start]);
        while let Some(ix) = queue.pop_front() {
            for edge in self.graph.edges_directed(ix, PetDirection::Incoming) {
                if *edge.weight() != EdgeLabel::SubClassOf {
                    continue;
                }
                let child = edge.source();
                if out.insert(self.graph[child].clone()) {
                    queue.push_back(child);
                }
            }
        }
        out.remove(class);
        out
    }

    /// Breadth-first shortest undirected path, ties broken by node name.
    pub fn shortest_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let a = *self.index.get(from)?;
        let b = *self.index.get(to)?;
        self.bfs(a, b, &HashSet::new(), &HashSet::new())
            .map(|p| self.names(&p))
    }

    /// Up to `k` shortest simple undirected paths, shortest first (Yen).
    ///
    /// Equal-length paths come out in lexicographic order of their node names,
    /// so the result is deterministic for a given graph.
    pub fn shortest_simple_paths(&self, from: &str, to: &str, k: usize) -> Vec<Vec<String>> {
        let (Some(&a), Some(&b)) = (self.index.get(from), self.index.get(to)) else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }
        let Some(first) = self.bfs(a, b, &HashSet::new(), &HashSet::new()) else {
            return Vec::new();
        };

        let mut accepted: Vec<Vec<NodeIndex>> = vec![first];
        let mut candidates: BTreeSet<(usize, Vec<String>, Vec<NodeIndex>)> = BTreeSet::new();

        while accepted.len() < k {
            let last = accepted[accepted.len() - 1].clone();
            for i in 0..last.len().saturating_sub(1) {
                let spur = last[i];
                let root = &last[..=i];

                let mut removed_edges = HashSet::new();
                for p in &accepted {
                    if p.len() > i + 1 && &p[..=i] == root {
                        removed_edges.insert(undirected_key(p[i], p[i + 1]));
                    }
                }
                let removed_nodes: HashSet<NodeIndex> = root[..i].iter().copied().collect();

                if let Some(spur_path) = self.bfs(spur, b, &removed_nodes, &removed_edges) {
                    let mut total: Vec<NodeIndex> = root[..i].to_vec();
                    total.extend(spur_path);
                    if !accepted.contains(&total) {
                        candidates.insert((total.len(), self.names(&total), total));
                    }
                }
            }
            match candidates.pop_first() {
                Some((_, _, path)) => accepted.push(path),
                None => break,
            }
        }

        accepted.iter().map(|p| self.names(p)).collect()
    }

    fn bfs(
        &self,
        from: NodeIndex,
        to: NodeIndex,
        removed_nodes: &HashSet<NodeIndex>,
        removed_edges: &HashSet<(NodeIndex, NodeIndex)>,
    ) -> Option<Vec<NodeIndex>> {
        if removed_nodes.contains(&from) {
            return None;
        }
        let mut parent: BTreeMap<NodeIndex, NodeIndex> = BTreeMap::new();
        let mut seen: HashSet<NodeIndex> = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(ix) = queue.pop_front() {
            if ix == to {
                let mut path = vec![to];
                let mut cur = to;
                while let Some(p) = parent.get(&cur) {
                    path.push(*p);
                    cur = *p;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.sorted_neighbors(ix) {
                if seen.contains(&next)
                    || removed_nodes.contains(&next)
                    || removed_edges.contains(&undirected_key(ix, next))
                {
                    continue;
                }
                seen.insert(next);
                parent.insert(next, ix);
                queue.push_back(next);
            }
        }
        None
    }

    fn names(&self, path: &[NodeIndex]) -> Vec<String> {
        path.iter().map(|ix| self.graph[*ix].clone()).collect()
    }

    /// Subgraph induced by `nodes` (names absent from the graph are ignored).
    pub fn induced<'a>(&self, nodes: impl IntoIterator<Item = &'a str>) -> SchemaGraph {
        let keep: BTreeSet<&str> = nodes.into_iter().filter(|n| self.contains(n)).collect();
        let mut out = SchemaGraph::new();
        for name in &keep {
            out.add_node(name);
        }
        for (s, label, o) in self.edges() {
            if keep.contains(s) && keep.contains(o) {
                out.add_edge(s, o, label);
            }
        }
        out
    }

    /// An empty graph counts as connected.
    pub fn is_weakly_connected(&self) -> bool {
        self.graph.node_count() == 0 || petgraph::algo::connected_components(&self.graph) == 1
    }
}

fn undirected_key(a: NodeIndex, b: NodeIndex) -> (NodeIndex, NodeIndex) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
