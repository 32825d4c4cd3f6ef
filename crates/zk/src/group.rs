//! Commitment group collaborator.
//!
//! The group itself (its members, its Merkle tree) is managed off-chain.
//! Clients only need the current root and a way to confirm that a round
//! still targets this group before spending time on proof generation.

use crate::field::FieldElement;

pub trait CommitmentGroup: Send + Sync {
    /// Current Merkle root of the group
    fn root(&self) -> FieldElement;

    /// Whether a round configured with `group_id` and `tree_depth` can be
    /// proven against this group's current root
    fn is_valid_for(&self, group_id: &FieldElement, tree_depth: u8) -> bool;
}

/// A group whose root is fixed, e.g. a frozen snapshot of the registry
#[derive(Debug, Clone)]
pub struct StaticGroup {
    group_id: FieldElement,
    tree_depth: u8,
    root: FieldElement,
}

impl StaticGroup {
    pub fn new(group_id: FieldElement, tree_depth: u8, root: FieldElement) -> Self {
        Self {
            group_id,
            tree_depth,
            root,
        }
    }
}

impl CommitmentGroup for StaticGroup {
    fn root(&self) -> FieldElement {
        self.root
    }

    fn is_valid_for(&self, group_id: &FieldElement, tree_depth: u8) -> bool {
        self.group_id == *group_id && self.tree_depth == tree_depth
    }
}
