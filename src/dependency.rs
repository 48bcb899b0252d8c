//! C3 — dependency analysis over the arithmetic-variable catalog (§4.2).
//!
//! Builds a graph from each variable's expression text to the other
//! variables it references, then exposes a topological order for the
//! pipeline assembler's dependency-layering (§4.8). Cyclic definitions are
//! never a hard error (§"Cyclic variable definitions" in the design notes):
//! the offending back-edge is logged and dropped so the rest of the graph
//! still orders cleanly.

use std::collections::{HashMap, HashSet};

use crate::convert::MathConverter;
use crate::model::ArithmeticVariable;

/// Variable-name dependency edges, in declaration order.
pub struct DependencyGraph {
    order: Vec<String>,
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Builds the graph through `converter`'s own [`MathConverter::dependencies`]
    /// rather than parsing `v.expr` directly — an external collaborator that
    /// understands a different grammar still gets correctly-ordered layers.
    pub fn build(vars: &[ArithmeticVariable], converter: &dyn MathConverter) -> Self {
        let names: HashSet<&str> = vars.iter().map(|v| v.name.as_str()).collect();
        let mut order = Vec::with_capacity(vars.len());
        let mut edges = HashMap::with_capacity(vars.len());

        for v in vars {
            order.push(v.name.clone());
            let idents = converter.dependencies(&v.expr).unwrap_or_default();
            let mut deps = Vec::new();
            let mut seen = HashSet::new();
            for id in idents {
                if id != v.name && names.contains(id.as_str()) && seen.insert(id.clone()) {
                    deps.push(id);
                }
            }
            edges.insert(v.name.clone(), deps);
        }

        DependencyGraph { order, edges }
    }

    /// Direct dependencies of `name` (empty if `name` is unknown or a leaf).
    pub fn deps(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All variables reachable from `name` by following dependency edges.
    pub fn transitive(&self, name: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack = vec![name.to_string()];
        while let Some(n) = stack.pop() {
            for dep in self.deps(&n) {
                if seen.insert(dep.clone()) {
                    stack.push(dep.clone());
                }
            }
        }
        seen
    }

    /// A dependency-respecting order: every variable appears after all of its
    /// (non-cyclic) dependencies. Deterministic given the same declaration
    /// order and the same edges.
    pub fn toposort(&self) -> Vec<String> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color: HashMap<&str, Color> = self.order.iter().map(|n| (n.as_str(), Color::White)).collect();
        let mut out = Vec::with_capacity(self.order.len());

        fn visit<'a>(
            node: &'a str,
            edges: &'a HashMap<String, Vec<String>>,
            color: &mut HashMap<&'a str, Color>,
            out: &mut Vec<String>,
        ) {
            color.insert(node, Color::Gray);
            if let Some(deps) = edges.get(node) {
                for dep in deps {
                    match color.get(dep.as_str()) {
                        Some(Color::Gray) => {
                            log::warn!("cyclic variable dependency: '{node}' -> '{dep}' ignored");
                        }
                        Some(Color::Black) => {}
                        Some(Color::White) | None => visit(dep.as_str(), edges, color, out),
                    }
                }
            }
            color.insert(node, Color::Black);
            out.push(node.to_string());
        }

        for name in &self.order {
            if color.get(name.as_str()) == Some(&Color::White) {
                visit(name.as_str(), &self.edges, &mut color, &mut out);
            }
        }

        out
    }

    /// Every variable name that participates in a dependency cycle — surfaced
    /// so [`crate::pipeline::compile_report`] can hand back a
    /// [`crate::error::Diagnostic::VariableCycle`] per name instead of only
    /// logging it (§9's "strongly-typed implementation" design note).
    pub fn cyclic_variables(&self) -> HashSet<String> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color: HashMap<&str, Color> = self.order.iter().map(|n| (n.as_str(), Color::White)).collect();
        let mut cyclic = HashSet::new();

        fn visit<'a>(
            node: &'a str,
            edges: &'a HashMap<String, Vec<String>>,
            color: &mut HashMap<&'a str, Color>,
            cyclic: &mut HashSet<String>,
        ) {
            color.insert(node, Color::Gray);
            if let Some(deps) = edges.get(node) {
                for dep in deps {
                    match color.get(dep.as_str()) {
                        Some(Color::Gray) => {
                            cyclic.insert(dep.clone());
                            cyclic.insert(node.to_string());
                        }
                        Some(Color::Black) => {}
                        Some(Color::White) | None => visit(dep.as_str(), edges, color, cyclic),
                    }
                }
            }
            color.insert(node, Color::Black);
        }

        for name in &self.order {
            if color.get(name.as_str()) == Some(&Color::White) {
                visit(name.as_str(), &self.edges, &mut color, &mut cyclic);
            }
        }

        cyclic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::DefaultMathConverter;

    fn var(name: &str, expr: &str) -> ArithmeticVariable {
        ArithmeticVariable {
            name: name.to_string(),
            expr: expr.to_string(),
        }
    }

    #[test]
    fn orders_dependencies_before_dependents() {
        let vars = vec![var("c", "a + b"), var("a", "1"), var("b", "a * 2")];
        let converter = DefaultMathConverter::new();
        let graph = DependencyGraph::build(&vars, &converter);
        let order = graph.toposort();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn transitive_closure_follows_the_whole_chain() {
        let vars = vec![var("c", "b"), var("b", "a"), var("a", "1")];
        let converter = DefaultMathConverter::new();
        let graph = DependencyGraph::build(&vars, &converter);
        let closure = graph.transitive("c");
        assert!(closure.contains("b"));
        assert!(closure.contains("a"));
    }

    #[test]
    fn cyclic_definitions_still_produce_a_full_order() {
        let vars = vec![var("x", "y + 1"), var("y", "x + 1")];
        let converter = DefaultMathConverter::new();
        let graph = DependencyGraph::build(&vars, &converter);
        let order = graph.toposort();
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn cyclic_variables_names_both_sides_of_the_back_edge() {
        let vars = vec![var("x", "y + 1"), var("y", "x + 1"), var("z", "1")];
        let converter = DefaultMathConverter::new();
        let graph = DependencyGraph::build(&vars, &converter);
        let cyclic = graph.cyclic_variables();
        assert!(cyclic.contains("x"));
        assert!(cyclic.contains("y"));
        assert!(!cyclic.contains("z"));
    }
}
