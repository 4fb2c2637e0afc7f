// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Tunables for the tree shape and for batch scheduling.
//!
//! Both structs deserialize with defaults for every missing field, so a
//! TOML file only has to name what it overrides:
//!
//! ```toml
//! quantum = 128
//!
//! [tree]
//! leaf_size = 64
//! ```

use serde::Deserialize;
use serde::Serialize;

/// Maximum elements per leaf.
pub const DEFAULT_LEAF_SIZE: usize = 32;
/// Maximum children per internal node.
pub const DEFAULT_NODE_SIZE: usize = 32;
/// Units of work a batch operation performs between yield points.
pub const DEFAULT_QUANTUM: u64 = 256;

const MIN_LEAF_SIZE: usize = 2;
const MIN_NODE_SIZE: usize = 3;

/// Shape of the balanced sequence tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Leaves split once they exceed this many elements.
    pub leaf_size: usize,
    /// Internal nodes split once they exceed this many children.
    pub node_size: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        return TreeConfig {
            leaf_size: DEFAULT_LEAF_SIZE,
            node_size: DEFAULT_NODE_SIZE,
        };
    }
}

impl TreeConfig {
    pub fn new() -> TreeConfig {
        return TreeConfig::default();
    }

    /// Sets the leaf capacity (at least 2).
    pub fn with_leaf_size(mut self, size: usize) -> TreeConfig {
        self.leaf_size = size.max(MIN_LEAF_SIZE);
        return self;
    }

    /// Sets the internal fan-out (at least 3).
    pub fn with_node_size(mut self, size: usize) -> TreeConfig {
        self.node_size = size.max(MIN_NODE_SIZE);
        return self;
    }

    /// Clamp values that were deserialized without going through the builders.
    pub fn normalized(self) -> TreeConfig {
        let leaf_size = self.leaf_size;
        let node_size = self.node_size;
        return self.with_leaf_size(leaf_size).with_node_size(node_size);
    }
}

/// Configuration for a mailbox: tree shape plus batch quantum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    pub tree: TreeConfig,
    /// Work units between yield points in batch operations.
    pub quantum: u64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        return MailboxConfig {
            tree: TreeConfig::default(),
            quantum: DEFAULT_QUANTUM,
        };
    }
}

impl MailboxConfig {
    pub fn new() -> MailboxConfig {
        return MailboxConfig::default();
    }

    pub fn with_tree(mut self, tree: TreeConfig) -> MailboxConfig {
        self.tree = tree.normalized();
        return self;
    }

    /// Sets the yield quantum (at least 1).
    pub fn with_quantum(mut self, quantum: u64) -> MailboxConfig {
        self.quantum = quantum.max(1);
        return self;
    }

    /// Parse a TOML document, filling unspecified fields with defaults.
    pub fn from_toml(text: &str) -> Result<MailboxConfig, toml::de::Error> {
        let config: MailboxConfig = toml::from_str(text)?;
        let quantum = config.quantum;
        let tree = config.tree.clone();
        return Ok(config.with_tree(tree).with_quantum(quantum));
    }
}
