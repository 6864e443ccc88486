/// Defines a generic directed tree over named nodes.
pub mod directed_tree;

/// Defines the kinematic tree of links, joints and frames for a robot model.
pub mod kinematic_tree;

/// Computes and caches rigid-body transforms across a kinematic tree.
pub mod tree_transforms;
