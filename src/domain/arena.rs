use generational_arena::{Arena, Index};
use ipnet::IpNet;
use tracing::instrument;

use crate::domain::cidr::AddressFamily;
use crate::domain::error::DomainError;

/// Tree node wrapping one CIDR block.
#[derive(Debug, Clone)]
pub struct PrefixNode {
    /// Block covered by this node
    pub prefix: IpNet,
    /// Index of parent node in the arena, None for roots
    pub parent: Option<Index>,
    /// Indices of child nodes in the arena, empty for leaves
    pub children: Vec<Index>,
    /// Fully excluded; never emitted, children included
    pub dead: bool,
}

impl PrefixNode {
    pub fn new(prefix: IpNet, parent: Option<Index>) -> Self {
        Self {
            prefix,
            parent,
            children: Vec::new(),
            dead: false,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Nodes are the same prefix iff their blocks are identical, wherever they sit.
impl PartialEq for PrefixNode {
    fn eq(&self, other: &Self) -> bool {
        self.prefix == other.prefix
    }
}

impl Eq for PrefixNode {}

/// Arena-backed forest of disjoint prefixes of one address family.
///
/// Roots keep insertion order, children keep split order. Nodes are never removed;
/// exclusion marks them dead instead.
#[derive(Debug)]
pub struct PrefixForest {
    family: AddressFamily,
    arena: Arena<PrefixNode>,
    roots: Vec<Index>,
}

impl PrefixForest {
    pub fn new(family: AddressFamily) -> Self {
        Self {
            family,
            arena: Arena::new(),
            roots: Vec::new(),
        }
    }

    /// Build a forest from root blocks, keeping their order.
    pub fn with_roots(
        family: AddressFamily,
        roots: impl IntoIterator<Item = IpNet>,
    ) -> Result<Self, DomainError> {
        let mut forest = Self::new(family);
        for root in roots {
            forest.add_root(root)?;
        }
        Ok(forest)
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    #[instrument(level = "trace", skip(self))]
    pub fn add_root(&mut self, prefix: IpNet) -> Result<Index, DomainError> {
        if AddressFamily::of(&prefix) != self.family {
            return Err(DomainError::InvalidCidr {
                input: prefix.to_string(),
                reason: format!("not an {} block", self.family),
            });
        }
        Ok(self.insert_node(prefix, None))
    }

    #[instrument(level = "trace", skip(self))]
    fn insert_node(&mut self, prefix: IpNet, parent: Option<Index>) -> Index {
        let node_idx = self.arena.insert(PrefixNode::new(prefix, parent));

        if let Some(parent_idx) = parent {
            if let Some(parent) = self.arena.get_mut(parent_idx) {
                parent.children.push(node_idx);
            }
        } else {
            self.roots.push(node_idx);
        }

        node_idx
    }

    /// Attach one child per block under `parent`, in order.
    #[instrument(level = "trace", skip(self, blocks))]
    pub fn split(&mut self, parent: Index, blocks: &[IpNet]) -> Vec<Index> {
        blocks
            .iter()
            .map(|&block| self.insert_node(block, Some(parent)))
            .collect()
    }

    pub fn mark_dead(&mut self, idx: Index) {
        if let Some(node) = self.arena.get_mut(idx) {
            node.dead = true;
        }
    }

    pub fn get_node(&self, idx: Index) -> Option<&PrefixNode> {
        self.arena.get(idx)
    }

    pub fn roots(&self) -> &[Index] {
        &self.roots
    }

    /// Total number of nodes, dead and interior ones included.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Parent links from `idx` up to its root, nearest first.
    pub fn ancestors(&self, idx: Index) -> Ancestors<'_> {
        Ancestors {
            forest: self,
            next: self.get_node(idx).and_then(|n| n.parent),
        }
    }

    pub fn iter(&self) -> ForestIterator<'_> {
        ForestIterator::new(self)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        self.roots
            .iter()
            .map(|&root| self.calculate_depth(root))
            .max()
            .unwrap_or(0)
    }

    fn calculate_depth(&self, node_idx: Index) -> usize {
        if let Some(node) = self.get_node(node_idx) {
            1 + node
                .children
                .iter()
                .map(|&child| self.calculate_depth(child))
                .max()
                .unwrap_or(0)
        } else {
            0
        }
    }

    /// Collects all live leaves in depth-first order.
    ///
    /// Dead nodes are skipped together with anything below them; interior nodes
    /// produce nothing themselves.
    #[instrument(level = "debug", skip(self), fields(family = %self.family))]
    pub fn active_leaves(&self) -> Vec<IpNet> {
        let mut leaves = Vec::new();
        for &root in &self.roots {
            self.collect_leaves(root, &mut leaves);
        }
        leaves
    }

    fn collect_leaves(&self, node_idx: Index, leaves: &mut Vec<IpNet>) {
        if let Some(node) = self.get_node(node_idx) {
            if node.dead {
                return;
            }
            if node.is_leaf() {
                leaves.push(node.prefix);
            } else {
                for &child in &node.children {
                    self.collect_leaves(child, leaves);
                }
            }
        }
    }

    /// Blocks of all dead nodes that are not below another dead node.
    pub fn dead_blocks(&self) -> Vec<IpNet> {
        self.iter()
            .filter(|(idx, node)| {
                node.dead
                    && !self
                        .ancestors(*idx)
                        .any(|ancestor| self.get_node(ancestor).is_some_and(|a| a.dead))
            })
            .map(|(_, node)| node.prefix)
            .collect()
    }
}

/// Walks parent links towards the root.
pub struct Ancestors<'a> {
    forest: &'a PrefixForest,
    next: Option<Index>,
}

impl Iterator for Ancestors<'_> {
    type Item = Index;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.forest.get_node(current).and_then(|n| n.parent);
        Some(current)
    }
}

/// Pre-order traversal over every node of every root, in order.
pub struct ForestIterator<'a> {
    forest: &'a PrefixForest,
    stack: Vec<Index>,
}

impl<'a> ForestIterator<'a> {
    fn new(forest: &'a PrefixForest) -> Self {
        Self {
            forest,
            stack: forest.roots.iter().rev().copied().collect(),
        }
    }
}

impl<'a> Iterator for ForestIterator<'a> {
    type Item = (Index, &'a PrefixNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.forest.get_node(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}
