//! Routing table
//!
//! An explicit directed graph `node id -> {kind, gain, outputs}`. A table is
//! built fresh for every reconfiguration and swapped in whole, so nothing
//! reading the current table ever observes a partially wired graph. Only gain
//! parameters are changed in place.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use serde::Serialize;

use crate::dsp::clamp_gain;
use crate::error::{AmbienceError, Result};

/// Identifier of a node within one routing table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which side of the conversion a level tap watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TapSide {
    Input,
    Output,
}

/// Node types in the voice path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    /// Live capture stream
    Capture { stream_id: u64, device: String },
    /// Stand-in source used when no input is selected
    Silence,
    InputGain,
    /// Advanced noise suppression inserted before conversion
    NoiseTransform { name: String },
    /// Voice conversion entry
    ConversionIn,
    /// Voice conversion exit
    ConversionOut,
    OutputGain,
    MonitorGain,
    /// Primary output (the stream sent to listeners)
    Destination,
    /// Local monitoring output
    MonitorDestination,
    /// Gain stage the ambient loop feeds
    EffectGain,
    LevelTap(TapSide),
}

impl NodeKind {
    /// Kinds that carry an adjustable gain parameter
    pub fn has_gain(&self) -> bool {
        matches!(
            self,
            NodeKind::InputGain | NodeKind::OutputGain | NodeKind::MonitorGain | NodeKind::EffectGain
        )
    }

    fn is_source(&self) -> bool {
        matches!(self, NodeKind::Capture { .. } | NodeKind::Silence)
    }
}

/// One entry of the routing table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSpec {
    pub kind: NodeKind,
    /// Gain parameter, meaningful only for gain kinds
    pub gain: f32,
    pub outputs: BTreeSet<NodeId>,
}

/// Directed routing graph for one generation of the voice path
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoutingTable {
    generation: u64,
    nodes: BTreeMap<NodeId, NodeSpec>,
    next_id: u32,
}

impl RoutingTable {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            nodes: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Reconfiguration generation this table was built for
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Add a node with unit gain
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        self.add_node_with_gain(kind, 1.0)
    }

    /// Add a node with an initial gain (clamped to [0, 1])
    pub fn add_node_with_gain(&mut self, kind: NodeKind, gain: f32) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            NodeSpec {
                kind,
                gain: clamp_gain(gain),
                outputs: BTreeSet::new(),
            },
        );
        id
    }

    /// Connect `from` to `to`
    ///
    /// # Errors
    /// `InvalidRouting` if either node is unknown or the edge is a self loop.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        if from == to {
            return Err(AmbienceError::InvalidRouting {
                reason: format!("self loop on {}", from),
            });
        }
        if !self.nodes.contains_key(&to) {
            return Err(AmbienceError::InvalidRouting {
                reason: format!("unknown target node {}", to),
            });
        }
        let spec = self
            .nodes
            .get_mut(&from)
            .ok_or_else(|| AmbienceError::InvalidRouting {
                reason: format!("unknown source node {}", from),
            })?;
        spec.outputs.insert(to);
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeSpec> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeSpec)> {
        self.nodes.iter().map(|(id, spec)| (*id, spec))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First node matching `predicate`, in id order
    pub fn find(&self, predicate: impl Fn(&NodeKind) -> bool) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, spec)| predicate(&spec.kind))
            .map(|(id, _)| *id)
    }

    /// Nodes with an edge into `to`
    pub fn inputs_of(&self, to: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, spec)| spec.outputs.contains(&to))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Whether `to` is reachable from `from`
    pub fn path_exists(&self, from: NodeId, to: NodeId) -> bool {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(id) = queue.pop_front() {
            if id == to {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(spec) = self.nodes.get(&id) {
                queue.extend(spec.outputs.iter().copied());
            }
        }
        false
    }

    /// Topological processing order (Kahn's algorithm)
    ///
    /// # Errors
    /// `InvalidRouting` if the graph contains a cycle.
    pub fn processing_order(&self) -> Result<Vec<NodeId>> {
        let mut in_degree: BTreeMap<NodeId, usize> =
            self.nodes.keys().map(|id| (*id, 0)).collect();
        for spec in self.nodes.values() {
            for out in &spec.outputs {
                if let Some(degree) = in_degree.get_mut(out) {
                    *degree += 1;
                }
            }
        }

        let mut ready: VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = ready.pop_front() {
            order.push(id);
            if let Some(spec) = self.nodes.get(&id) {
                for out in &spec.outputs {
                    if let Some(degree) = in_degree.get_mut(out) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push_back(*out);
                        }
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(AmbienceError::InvalidRouting {
                reason: "routing graph contains a cycle".to_string(),
            });
        }
        Ok(order)
    }

    /// Check the table is acyclic and has at most one live source feeding
    /// conversion
    pub fn validate(&self) -> Result<()> {
        self.processing_order()?;

        if let Some(conversion) = self.find(|k| *k == NodeKind::ConversionIn) {
            let sources = self
                .nodes
                .iter()
                .filter(|(_, spec)| spec.kind.is_source())
                .filter(|(id, _)| self.path_exists(**id, conversion))
                .count();
            if sources > 1 {
                return Err(AmbienceError::InvalidRouting {
                    reason: format!("{} sources feed conversion", sources),
                });
            }
        }
        Ok(())
    }

    /// Update the gain of the first node of `kind`
    ///
    /// # Returns
    /// The clamped gain, or `None` if no such node exists
    pub fn set_gain(&mut self, kind: &NodeKind, gain: f32) -> Option<f32> {
        let spec = self.nodes.values_mut().find(|spec| &spec.kind == kind)?;
        if !spec.kind.has_gain() {
            return None;
        }
        spec.gain = clamp_gain(gain);
        Some(spec.gain)
    }

    /// Gain of the first node of `kind`
    pub fn gain(&self, kind: &NodeKind) -> Option<f32> {
        self.nodes
            .values()
            .find(|spec| &spec.kind == kind)
            .map(|spec| spec.gain)
    }
}
