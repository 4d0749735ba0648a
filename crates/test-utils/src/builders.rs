#![allow(dead_code)]

use beadflow::config::{EngineConfig, RawEngineConfig};
use beadflow::graph::{Edge, Graph, NodeSpec};

/// Builder for `Graph` to simplify test setup.
///
/// Nodes keep the order in which they were added.
pub struct GraphBuilder {
    specs: Vec<NodeSpec>,
    edges: Vec<Edge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            specs: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Add a node with the given dependencies.
    pub fn node(mut self, id: &str, needs: &[&str]) -> Self {
        self.specs.push(NodeSpecBuilder::new(id).needs(needs).build());
        self
    }

    /// Add a node with a weight and dependencies.
    pub fn weighted(mut self, id: &str, weight: f64, needs: &[&str]) -> Self {
        self.specs
            .push(NodeSpecBuilder::new(id).weight(weight).needs(needs).build());
        self
    }

    pub fn spec(mut self, spec: NodeSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Extra weighted edge (also a dependency: `to` needs `from`).
    pub fn edge(mut self, from: &str, to: &str, weight: f64) -> Self {
        self.edges.push(Edge::new(from, to, weight));
        self
    }

    pub fn specs(&self) -> &[NodeSpec] {
        &self.specs
    }

    pub fn build(self) -> Graph {
        Graph::with_edges(self.specs, self.edges).expect("Failed to build valid graph from builder")
    }

    /// `n0 -> n1 -> ... -> n{len-1}`.
    pub fn chain(len: usize) -> Self {
        let mut builder = Self::new();
        for i in 0..len {
            let id = format!("n{i}");
            let prev = if i > 0 { Some(format!("n{}", i - 1)) } else { None };
            let needs: Vec<&str> = prev.iter().map(String::as_str).collect();
            builder = builder.node(&id, &needs);
        }
        builder
    }

    /// `a -> {b, c} -> d`.
    pub fn diamond() -> Self {
        Self::new()
            .node("a", &[])
            .node("b", &["a"])
            .node("c", &["a"])
            .node("d", &["b", "c"])
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `NodeSpec`.
pub struct NodeSpecBuilder {
    spec: NodeSpec,
}

impl NodeSpecBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            spec: NodeSpec::new(id),
        }
    }

    pub fn needs(mut self, deps: &[&str]) -> Self {
        self.spec.needs.extend(deps.iter().map(|d| d.to_string()));
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.spec.weight = Some(weight);
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.spec.title = title.to_string();
        self
    }

    pub fn continue_on_error(mut self) -> Self {
        self.spec.continue_on_error = true;
        self
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.spec.cmd = Some(cmd.to_string());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.spec.priority = priority;
        self
    }

    pub fn build(self) -> NodeSpec {
        self.spec
    }
}

/// Builder for `EngineConfig`, validated through `TryFrom` like a file.
pub struct EngineConfigBuilder {
    config: RawEngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawEngineConfig::default(),
        }
    }

    pub fn max_parallel(mut self, n: usize) -> Self {
        self.config.scheduler.max_parallel = n;
        self
    }

    pub fn step_timeout_ms(mut self, ms: u64) -> Self {
        self.config.scheduler.step_timeout_ms = Some(ms);
        self
    }

    pub fn progress_interval_ms(mut self, ms: u64) -> Self {
        self.config.scheduler.progress_interval_ms = ms;
        self
    }

    pub fn cache(mut self, capacity: usize, ttl_secs: u64) -> Self {
        self.config.cache.capacity = capacity;
        self.config.cache.ttl_secs = ttl_secs;
        self
    }

    pub fn build(self) -> EngineConfig {
        EngineConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
