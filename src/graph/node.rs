//! Canonical identity for a computable quantity slot.
//!
//! An `InterfaceNode` pins down processor × interface-or-type × orientation.
//! Two nodes are the same slot iff their canonical key strings are equal;
//! synthetic nodes created during hierarchy expansion merge with any
//! pre-existing node sharing the key.

use crate::error::SolvingError;
use crate::model::{Interface, Orientation, Processor, RoegenType, Sphere};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Immutable value type; hash and equality derive from the canonical key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceNode {
    key: String,
    pub processor: String,
    /// Concrete interface name; `None` for nodes synthesized per type.
    pub interface: Option<String>,
    pub interface_type: String,
    pub orientation: Orientation,
    pub unit: Option<String>,
    pub roegen_type: Option<RoegenType>,
    pub sphere: Option<Sphere>,
    pub system: Option<String>,
    pub subsystem: Option<String>,
}

impl InterfaceNode {
    /// A node backed by a concretely declared interface.
    pub fn from_interface(interface: &Interface, processor: Option<&Processor>) -> Self {
        let key = format!("{}:{}", interface.processor, interface.name);
        Self {
            key,
            processor: interface.processor.clone(),
            interface: Some(interface.name.clone()),
            interface_type: interface.interface_type.clone(),
            orientation: interface.orientation,
            unit: interface.unit.clone(),
            roegen_type: interface.roegen_type,
            sphere: interface.sphere,
            system: processor.and_then(|p| p.system.clone()),
            subsystem: processor.and_then(|p| p.subsystem.clone()),
        }
    }

    /// A synthetic node identified by interface type and orientation only
    /// (no concrete interface on the processor).
    pub fn typed(
        processor_name: &str,
        interface_type: &str,
        orientation: Orientation,
        processor: Option<&Processor>,
    ) -> Self {
        let key = format!(
            "{}:{}:{}",
            processor_name,
            interface_type,
            orientation.as_str()
        );
        Self {
            key,
            processor: processor_name.to_string(),
            interface: None,
            interface_type: interface_type.to_string(),
            orientation,
            unit: None,
            roegen_type: None,
            sphere: None,
            system: processor.and_then(|p| p.system.clone()),
            subsystem: processor.and_then(|p| p.subsystem.clone()),
        }
    }

    /// The canonical name: `processor:interface` when a concrete interface
    /// is known, else `processor:interfaceType:orientation`.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The typed alternate key, used to merge a synthesized per-type node
    /// with a concretely-named interface of the same type and orientation.
    pub fn alternate_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.processor,
            self.interface_type,
            self.orientation.as_str()
        )
    }

    /// Scope classification used by the internal/external split.
    pub fn scope_tag(&self) -> (Option<&str>, Option<&str>) {
        (self.system.as_deref(), self.subsystem.as_deref())
    }
}

impl PartialEq for InterfaceNode {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for InterfaceNode {}

impl Hash for InterfaceNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// Interning table for nodes, keyed by canonical name.
///
/// Re-interning an equal node is a no-op; re-interning a node whose key
/// collides with a different (type, orientation) pair is fatal.
#[derive(Debug, Clone, Default)]
pub struct NodeTable {
    nodes: BTreeMap<String, InterfaceNode>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, node: InterfaceNode) -> Result<String, SolvingError> {
        let key = node.key().to_string();
        if let Some(existing) = self.nodes.get(&key) {
            if existing.interface_type != node.interface_type
                || existing.orientation != node.orientation
            {
                return Err(SolvingError::InconsistentNodeIdentity {
                    key,
                    detail: format!(
                        "({}, {:?}) vs ({}, {:?})",
                        existing.interface_type,
                        existing.orientation,
                        node.interface_type,
                        node.orientation
                    ),
                });
            }
        } else {
            self.nodes.insert(key.clone(), node);
        }
        Ok(key)
    }

    pub fn get(&self, key: &str) -> Option<&InterfaceNode> {
        self.nodes.get(key)
    }

    /// A concrete interface node whose typed alternate key matches, if any.
    pub fn by_alternate_key(&self, alternate: &str) -> Option<&InterfaceNode> {
        self.nodes
            .values()
            .find(|n| n.interface.is_some() && n.alternate_key() == alternate)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    pub fn into_inner(self) -> BTreeMap<String, InterfaceNode> {
        self.nodes
    }

    pub fn inner(&self) -> &BTreeMap<String, InterfaceNode> {
        &self.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Interface;

    fn water(processor: &str) -> Interface {
        Interface {
            processor: processor.to_string(),
            name: "Water".to_string(),
            interface_type: "BlueWater".to_string(),
            orientation: Orientation::Input,
            sphere: None,
            roegen_type: Some(RoegenType::Flow),
            unit: Some("m3".to_string()),
        }
    }

    #[test]
    fn concrete_key_uses_interface_name() {
        let node = InterfaceNode::from_interface(&water("Farm"), None);
        assert_eq!(node.key(), "Farm:Water");
        assert_eq!(node.alternate_key(), "Farm:BlueWater:Input");
    }

    #[test]
    fn equality_is_by_key_only() {
        let a = InterfaceNode::from_interface(&water("Farm"), None);
        let mut b = a.clone();
        b.unit = None;
        assert_eq!(a, b);
    }

    #[test]
    fn interning_merges_equal_keys() {
        let mut table = NodeTable::new();
        let k1 = table
            .intern(InterfaceNode::from_interface(&water("Farm"), None))
            .unwrap();
        let k2 = table
            .intern(InterfaceNode::from_interface(&water("Farm"), None))
            .unwrap();
        assert_eq!(k1, k2);
        assert_eq!(table.keys().count(), 1);
    }

    #[test]
    fn inconsistent_identity_is_fatal() {
        let mut table = NodeTable::new();
        table
            .intern(InterfaceNode::from_interface(&water("Farm"), None))
            .unwrap();
        let mut clash = water("Farm");
        clash.orientation = Orientation::Output;
        let err = table
            .intern(InterfaceNode::from_interface(&clash, None))
            .unwrap_err();
        assert!(matches!(
            err,
            SolvingError::InconsistentNodeIdentity { .. }
        ));
    }
}
