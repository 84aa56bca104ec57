use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::error::{CompileError, Result};

// ---------------------------------------------------------------------------
// FilterEdge
// ---------------------------------------------------------------------------

/// One filter application: `[in..]op[out..]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterEdge {
    pub op: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl FilterEdge {
    pub fn render(&self) -> String {
        let mut out = String::new();
        for input in &self.inputs {
            out.push('[');
            out.push_str(input);
            out.push(']');
        }
        out.push_str(&self.op);
        for output in &self.outputs {
            out.push('[');
            out.push_str(output);
            out.push(']');
        }
        out
    }
}

// ---------------------------------------------------------------------------
// FilterGraph
// ---------------------------------------------------------------------------

/// The stream DAG for one output: stream labels as nodes, filter
/// applications as edges, plus the ledger of labels ever handed out. Label
/// allocation is deterministic (`a0`, `a1`, ... `a999`, `b0`, ...) so the
/// rendered graph is reproducible run to run.
#[derive(Debug, Default)]
pub struct FilterGraph {
    nodes: Vec<String>,
    node_set: HashSet<String>,
    edges: Vec<FilterEdge>,
    used_labels: HashSet<String>,
    cursor: usize,
}

const LABEL_SPACE: usize = 26 * 1000;

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, label: impl Into<String>) {
        let label = label.into();
        if self.node_set.insert(label.clone()) {
            self.nodes.push(label.clone());
        }
        self.used_labels.insert(label);
    }

    /// Appends one filter edge, creating nodes for every listed label and
    /// reserving them in the allocator ledger. Returns the first output
    /// label. `concat` ops have their input arity verified here.
    pub fn add_filter(
        &mut self,
        op: impl Into<String>,
        inputs: Vec<String>,
        outputs: Vec<String>,
    ) -> Result<String> {
        let op = op.into();
        if let Some((n, v, a)) = parse_concat_params(&op) {
            let expected = n * (v + a);
            if inputs.len() != expected {
                return Err(CompileError::ConcatArityMismatch {
                    n,
                    v,
                    a,
                    expected,
                    actual: inputs.len(),
                });
            }
        }
        for label in inputs.iter().chain(outputs.iter()) {
            self.add_node(label.clone());
        }
        let first = outputs.first().cloned().unwrap_or_default();
        self.edges.push(FilterEdge {
            op,
            inputs,
            outputs,
        });
        Ok(first)
    }

    /// Hands out the next unused label. Candidates run `a0..a999`, `b0..`
    /// through `z999`; once all 26 000 are taken the allocator falls back to
    /// a timestamp-derived label (observable only in diagnostics).
    pub fn make_label(&mut self) -> String {
        let mut attempts = 0;
        while attempts < LABEL_SPACE {
            let n = self.cursor % LABEL_SPACE;
            self.cursor += 1;
            attempts += 1;
            let letter = (b'a' + (n / 1000) as u8) as char;
            let label = format!("{}{}", letter, n % 1000);
            if !self.used_labels.contains(&label) {
                self.used_labels.insert(label.clone());
                return label;
            }
        }

        warn!("label space exhausted, falling back to timestamp labels");
        let mut stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        loop {
            let label = format!("t{stamp}");
            if !self.used_labels.contains(&label) {
                self.used_labels.insert(label.clone());
                return label;
            }
            stamp += 1;
        }
    }

    /// Nodes that no edge produces: the graph's external inputs.
    pub fn input_frontier(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| !self.edges.iter().any(|e| e.outputs.contains(n)))
            .cloned()
            .collect()
    }

    /// Nodes that no edge consumes: the graph's final outputs.
    pub fn output_frontier(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| !self.edges.iter().any(|e| e.inputs.contains(n)))
            .cloned()
            .collect()
    }

    /// Copies another graph's nodes and edges into this one. Existing nodes
    /// are kept, duplicate edges (same op, inputs and outputs) are skipped,
    /// and all of the other graph's labels are reserved here.
    pub fn merge_from(&mut self, other: &FilterGraph) {
        for node in &other.nodes {
            self.add_node(node.clone());
        }
        for label in &other.used_labels {
            self.used_labels.insert(label.clone());
        }
        for edge in &other.edges {
            if !self.edges.contains(edge) {
                self.edges.push(edge.clone());
            }
        }
    }

    /// The filter-complex text: edge renderings joined by `;`.
    pub fn render(&self) -> String {
        self.edges
            .iter()
            .map(FilterEdge::render)
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn edges(&self) -> &[FilterEdge] {
        &self.edges
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn contains_node(&self, label: &str) -> bool {
        self.node_set.contains(label)
    }
}

/// Extracts `(n, v, a)` from a `concat=n=..:v=..:a=..` op string.
fn parse_concat_params(op: &str) -> Option<(usize, usize, usize)> {
    let params = op.strip_prefix("concat=")?;
    let mut n = 2;
    let mut v = 1;
    let mut a = 0;
    for pair in params.split(':') {
        match pair.split_once('=') {
            Some(("n", value)) => n = value.parse().ok()?,
            Some(("v", value)) => v = value.parse().ok()?,
            Some(("a", value)) => a = value.parse().ok()?,
            _ => return None,
        }
    }
    Some((n, v, a))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
