//! Defines the kinematic tree built from a robot description model.
//!
//! The tree wraps the model's links as nodes, its joints as edges and its
//! frames as non-structural attachments. Building the tree validates that the
//! joints form a single connected tree rooted at the canonical link and
//! normalizes the connection to the reserved 'world' frame for fixed-base and
//! floating-base models.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::{
    model_elements::model::{Frame, Joint, Link, Model},
    model_elements::pose::{inverse_transform, Pose, MODEL_FRAME, WORLD_FRAME},
    Error,
};

use super::directed_tree::{DirectedTree, DirectedTreeNode};

#[cfg(test)]
#[path = "kinematic_tree_tests.rs"]
mod kinematic_tree_tests;

/// The numeric tolerance below which a mass or inertia component counts as
/// zero when deciding whether edge removal needs inertial lumping.
const INERTIAL_TOLERANCE: f64 = 1e-9;

/// An edge of the kinematic tree, wrapping the [Joint] it was created from.
#[derive(Clone, Debug)]
pub struct TreeEdge {
    /// The joint record backing this edge.
    joint: Joint,

    /// The index of the parent node.
    parent: usize,

    /// The index of the child node.
    child: usize,

    /// The index of this edge, equal to the index of its child node.
    index: usize,
}

impl TreeEdge {
    /// Returns the index of the child node of this edge.
    pub fn child(&self) -> usize {
        self.child
    }

    /// Returns the index of this edge. The index of an edge equals the index
    /// of its child node.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the joint record backing this edge.
    pub fn joint(&self) -> &Joint {
        &self.joint
    }

    /// Returns the name of this edge.
    pub fn name(&self) -> &str {
        self.joint.name.as_str()
    }

    /// Returns the index of the parent node of this edge.
    pub fn parent(&self) -> usize {
        self.parent
    }

    /// Returns the pose of the underlying joint, or a zero pose relative to
    /// the child link when the joint has none.
    pub fn pose(&self) -> Pose {
        match &self.joint.pose {
            Some(pose) => pose.clone(),
            None => Pose::zero(self.joint.child.as_str()),
        }
    }
}

impl PartialEq for TreeEdge {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for TreeEdge {}

impl std::hash::Hash for TreeEdge {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

/// A named reference frame of the kinematic tree, wrapping the [Frame] it
/// was created from.
///
/// Frames are non-structural: they do not take part in the link/joint
/// topology of the tree, they only reference into it through `attached_to`.
#[derive(Clone, Debug)]
pub struct TreeFrame {
    /// The frame record backing this tree frame.
    frame: Frame,

    /// The index of this frame. Frame indices continue after the node
    /// indices.
    index: usize,
}

impl TreeFrame {
    /// Returns the name of the element this frame is attached to, or an
    /// empty string when the attachment is implicit.
    pub fn attached_to(&self) -> &str {
        match &self.frame.attached_to {
            Some(name) => name.as_str(),
            None => "",
        }
    }

    /// Returns the frame record backing this tree frame.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Returns the index of this frame.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the name of this frame.
    pub fn name(&self) -> &str {
        self.frame.name.as_str()
    }

    /// Returns the pose of the underlying frame, or a zero pose relative to
    /// the attachment when the frame has none.
    pub fn pose(&self) -> Pose {
        match &self.frame.pose {
            Some(pose) => pose.clone(),
            None => Pose::zero(self.attached_to()),
        }
    }
}

impl PartialEq for TreeFrame {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for TreeFrame {}

impl std::hash::Hash for TreeFrame {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

/// The kinematic tree of a robot description model.
///
/// The tree owns the node arena, the joint edges, the reference frames and a
/// pose-resolved deep copy of the model it was built from. It is built fresh
/// from a model snapshot for every top-level operation and is never mutated
/// afterwards.
///
/// Indices are assigned at construction: the root node has index 0 and the
/// remaining nodes follow breadth-first order with name-sorted children,
/// frame indices continue after the node indices, and each joint takes the
/// index of its child node.
#[derive(Clone, Debug)]
pub struct KinematicTree {
    /// The tree of link nodes.
    tree: DirectedTree,

    /// The joint edges of the tree, in declaration order.
    joints: Vec<TreeEdge>,

    /// The reference frames of the tree, declared frames first, followed by
    /// the implicit model frame and the frames produced by world handling.
    frames: Vec<TreeFrame>,

    /// The pose-resolved copy of the model the tree was built from.
    model: Model,

    /// The mapping from joint name to position in the joint list.
    joints_by_name: HashMap<String, usize>,

    /// The mapping from frame name to position in the frame list.
    frames_by_name: HashMap<String, usize>,

    /// The mapping from (parent link name, child link name) to position in
    /// the joint list.
    joints_by_connection: HashMap<(String, String), usize>,
}

impl KinematicTree {
    /// Builds the kinematic tree for the given model.
    ///
    /// The model is deep-copied and its implicit reference frames are
    /// resolved before the tree is assembled, so the caller's model is never
    /// modified. Nested sub-models are not supported and are discarded with
    /// a warning.
    ///
    /// ## Parameters
    ///
    /// * 'model' - The model to build the tree from.
    /// * 'is_top_level' - Whether the model is the top level model of a
    ///   document rather than a nested sub-model.
    ///
    /// ## Errors
    ///
    /// * [Error::EmptyModel] - Returned when the model has no links.
    /// * [Error::CanonicalLinkNotFound] - Returned when the declared
    ///   canonical link does not exist.
    /// * [Error::DuplicateElementName] - Returned when two links, joints or
    ///   frames share a name, or an element uses a reserved name.
    /// * [Error::WorldChildJoint] - Returned when a joint declares 'world'
    ///   as its child.
    /// * [Error::UnknownJointLink] - Returned when a joint references a link
    ///   that does not exist.
    /// * [Error::MultipleParentJoints] - Returned when a link is the child
    ///   of more than one joint.
    /// * [Error::MultipleWorldJoints] - Returned when more than one joint
    ///   connects the model to the world.
    /// * [Error::DanglingJoints] - Returned when joints exist that are not
    ///   part of the tree rooted at the canonical link.
    /// * [Error::MissingWorldJoint] - Returned when a fixed-base model has
    ///   fewer loose joints than its world connection requires.
    /// * [Error::DisconnectedLinks] - Returned when links cannot be reached
    ///   from the canonical link.
    /// * [Error::KinematicLoop] - Returned when the joints form a closed
    ///   chain.
    /// * [Error::InertialLumpingNotImplemented] - Returned when removing the
    ///   world connection would require lumping non-trivial inertial
    ///   parameters.
    pub fn build(model: &Model, is_top_level: bool) -> Result<KinematicTree, Error> {
        debug!(model = model.name.as_str(), "Building kinematic tree");

        let mut model = model.clone();
        model.resolve_frames(is_top_level, true)?;

        if !model.models.is_empty() {
            warn!(
                model = model.name.as_str(),
                "Model composition is not supported. Ignoring sub-models."
            );
            model.models.clear();
        }

        let canonical = model.get_canonical_link()?.to_string();

        Self::verify_unique_names(&model)?;

        // The synthetic world node participates in the staging topology so
        // that the world-connecting joint of fixed-base models has both of
        // its endpoints available.
        let link_names: HashSet<&str> = model.links.iter().map(|l| l.name.as_str()).collect();

        let mut parent_of: HashMap<String, String> = HashMap::new();
        for joint in &model.joints {
            if joint.child == WORLD_FRAME {
                return Err(Error::WorldChildJoint {
                    name: joint.name.clone(),
                });
            }

            if joint.parent != WORLD_FRAME && !link_names.contains(joint.parent.as_str()) {
                return Err(Error::UnknownJointLink {
                    joint: joint.name.clone(),
                    link: joint.parent.clone(),
                });
            }

            if !link_names.contains(joint.child.as_str()) {
                return Err(Error::UnknownJointLink {
                    joint: joint.name.clone(),
                    link: joint.child.clone(),
                });
            }

            if parent_of
                .insert(joint.child.clone(), joint.parent.clone())
                .is_some()
            {
                return Err(Error::MultipleParentJoints {
                    link: joint.child.clone(),
                });
            }
        }

        let world_joints: Vec<&Joint> = model
            .joints
            .iter()
            .filter(|j| j.parent == WORLD_FRAME)
            .collect();
        if world_joints.len() > 1 {
            return Err(Error::MultipleWorldJoints {
                count: world_joints.len(),
            });
        }

        let reachable = Self::reachable_from(&canonical, &parent_of);

        let (in_tree, extra): (Vec<&Joint>, Vec<&Joint>) = model.joints.iter().partition(|j| {
            reachable.contains(j.parent.as_str()) && reachable.contains(j.child.as_str())
        });

        let expected_extra = usize::from(!world_joints.is_empty());
        if extra.len() < expected_extra {
            return Err(Error::MissingWorldJoint {
                model: model.name.clone(),
            });
        }

        let dangling: Vec<String> = extra
            .iter()
            .filter(|j| j.parent != WORLD_FRAME)
            .map(|j| j.name.clone())
            .collect();
        if !dangling.is_empty() {
            return Err(Error::DanglingJoints { names: dangling });
        }

        if reachable.len() != model.links.len() {
            let mut missing: Vec<String> = model
                .links
                .iter()
                .map(|l| l.name.clone())
                .filter(|name| !reachable.contains(name.as_str()))
                .collect();
            missing.sort_unstable();

            return Err(Error::DisconnectedLinks {
                root: canonical.clone(),
                names: missing,
            });
        }

        if in_tree.len() != reachable.len() - 1 {
            return Err(Error::KinematicLoop {
                model: model.name.clone(),
            });
        }

        let mut frames: Vec<Frame> = model.frames.clone();
        frames.push(Frame {
            name: MODEL_FRAME.to_string(),
            attached_to: Some(canonical.clone()),
            pose: model.pose.clone(),
        });

        // Fixed-base models carry one joint welding them to the world. The
        // world node is lumped into that joint's child so the tree stays
        // rooted at a real link; the removed joint and the world node live on
        // as frames. Floating-base models just get the world as a frame
        // attached to the canonical link.
        match world_joints.first() {
            Some(world_joint) => {
                let world_link = Link {
                    pose: Some(Pose::zero(WORLD_FRAME)),
                    ..Link::new(WORLD_FRAME)
                };
                let child_link = model
                    .links
                    .iter()
                    .find(|l| l.name == world_joint.child)
                    .ok_or_else(|| Error::UnknownJointLink {
                        joint: world_joint.name.clone(),
                        link: world_joint.child.clone(),
                    })?;

                let (_replacement, new_frames) =
                    Self::remove_edge(world_joint, &world_link, child_link, false)?;
                frames.extend(new_frames);
            }
            None => {
                debug!(
                    model = model.name.as_str(),
                    "Floating-base model, attaching the world frame to '{}'", canonical
                );
                frames.push(Frame {
                    name: WORLD_FRAME.to_string(),
                    attached_to: Some(canonical.clone()),
                    pose: Some(Pose::zero(WORLD_FRAME)),
                });
            }
        }

        let tree_parent_of: HashMap<String, String> = parent_of
            .iter()
            .filter(|(_, parent)| parent.as_str() != WORLD_FRAME)
            .map(|(child, parent)| (child.clone(), parent.clone()))
            .collect();

        let tree = DirectedTree::build(&canonical, model.links.clone(), &tree_parent_of)?;

        let joints: Vec<Joint> = in_tree.into_iter().cloned().collect();

        Self::assemble(tree, joints, frames, model)
    }

    /// Removes an edge, turning the discarded endpoint and the edge itself
    /// into frames.
    ///
    /// The kept endpoint becomes the replacement node, re-pointed so it no
    /// longer connects through the removed edge. The edge becomes a frame
    /// attached to the replacement node and carrying the edge's pose, and the
    /// discarded node becomes a frame attached to that edge frame, placed at
    /// the inverse of the edge transform.
    ///
    /// ## Parameters
    ///
    /// * 'edge' - The joint forming the edge to remove.
    /// * 'parent_link' - The link at the parent end of the edge.
    /// * 'child_link' - The link at the child end of the edge.
    /// * 'keep_parent' - When true the child end is discarded, otherwise the
    ///   parent end is discarded.
    ///
    /// ## Errors
    ///
    /// * [Error::InertialLumpingNotImplemented] - Returned when the discarded
    ///   link carries non-trivial inertial parameters. Lumping those into the
    ///   replacement node is required for correctness and is not implemented,
    ///   so the removal fails instead of silently dropping mass.
    pub fn remove_edge(
        edge: &Joint,
        parent_link: &Link,
        child_link: &Link,
        keep_parent: bool,
    ) -> Result<(Link, [Frame; 2]), Error> {
        let (removed, kept) = if keep_parent {
            (child_link, parent_link)
        } else {
            (parent_link, child_link)
        };

        if !Self::has_zero_inertial(removed) {
            return Err(Error::InertialLumpingNotImplemented {
                name: removed.name.clone(),
            });
        }

        let replacement = kept.clone();

        let edge_pose = match &edge.pose {
            Some(pose) => pose.clone(),
            None => Pose::zero(edge.child.as_str()),
        };

        debug!(
            "Edge '{}' became a frame attached to '{}'",
            edge.name, replacement.name
        );
        let edge_as_frame = Frame {
            name: edge.name.clone(),
            attached_to: Some(replacement.name.clone()),
            pose: Some(edge_pose.clone()),
        };

        debug!(
            "Node '{}' became a frame attached to '{}'",
            removed.name, edge_as_frame.name
        );
        let node_as_frame = Frame {
            name: removed.name.clone(),
            attached_to: Some(edge_as_frame.name.clone()),
            pose: Some(Pose::from_transform(
                &inverse_transform(&edge_pose.transform()),
                replacement.name.as_str(),
            )),
        };

        Ok((replacement, [node_as_frame, edge_as_frame]))
    }

    /// Returns the names of all reference frames, in index order.
    pub fn frame_names(&self) -> Vec<String> {
        self.frames.iter().map(|f| f.name().to_string()).collect()
    }

    /// Returns the reference frames of the tree.
    pub fn frames(&self) -> &[TreeFrame] {
        &self.frames
    }

    /// Returns the frame with the given name, if any.
    pub fn get_frame(&self, name: &str) -> Option<&TreeFrame> {
        self.frames_by_name.get(name).map(|i| &self.frames[*i])
    }

    /// Returns the joint with the given name, if any.
    pub fn get_joint(&self, name: &str) -> Option<&TreeEdge> {
        self.joints_by_name.get(name).map(|i| &self.joints[*i])
    }

    /// Returns the joint connecting the given parent and child links, if any.
    ///
    /// ## Parameters
    ///
    /// * 'parent' - The name of the parent link.
    /// * 'child' - The name of the child link.
    pub fn get_joint_between(&self, parent: &str, child: &str) -> Option<&TreeEdge> {
        self.joints_by_connection
            .get(&(parent.to_string(), child.to_string()))
            .map(|i| &self.joints[*i])
    }

    /// Returns the node with the given name.
    ///
    /// ## Errors
    ///
    /// * [Error::UnknownElement] - Returned when no node carries the name.
    pub fn get_node(&self, name: &str) -> Result<&DirectedTreeNode, Error> {
        self.tree.get(name)
    }

    /// Returns the joint edges of the tree, in declaration order.
    pub fn joints(&self) -> &[TreeEdge] {
        &self.joints
    }

    /// Returns the names of all joints, in declaration order.
    pub fn joint_names(&self) -> Vec<String> {
        self.joints.iter().map(|j| j.name().to_string()).collect()
    }

    /// Returns the names of all links, in breadth-first index order.
    pub fn link_names(&self) -> Vec<String> {
        self.tree.node_names()
    }

    /// Returns the pose-resolved copy of the model the tree was built from.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Returns the tree of link nodes.
    pub fn tree(&self) -> &DirectedTree {
        &self.tree
    }

    /// Creates the final tree value, assigning frame and joint indices and
    /// filling the lookup tables.
    fn assemble(
        tree: DirectedTree,
        joints: Vec<Joint>,
        frames: Vec<Frame>,
        model: Model,
    ) -> Result<KinematicTree, Error> {
        let last_node_index = tree.len() - 1;

        let mut frames_by_name: HashMap<String, usize> = HashMap::with_capacity(frames.len());
        let tree_frames: Vec<TreeFrame> = frames
            .into_iter()
            .enumerate()
            .map(|(position, frame)| TreeFrame {
                frame,
                index: last_node_index + 1 + position,
            })
            .collect();
        for (position, frame) in tree_frames.iter().enumerate() {
            if frames_by_name
                .insert(frame.name().to_string(), position)
                .is_some()
            {
                return Err(Error::DuplicateElementName {
                    name: frame.name().to_string(),
                });
            }
        }

        let mut joints_by_name: HashMap<String, usize> = HashMap::with_capacity(joints.len());
        let mut joints_by_connection: HashMap<(String, String), usize> =
            HashMap::with_capacity(joints.len());
        let mut tree_joints: Vec<TreeEdge> = Vec::with_capacity(joints.len());
        for (position, joint) in joints.into_iter().enumerate() {
            let parent = tree.get(joint.parent.as_str())?.index();
            let child = tree.get(joint.child.as_str())?.index();

            if joints_by_name
                .insert(joint.name.clone(), position)
                .is_some()
            {
                return Err(Error::DuplicateElementName { name: joint.name });
            }
            joints_by_connection.insert((joint.parent.clone(), joint.child.clone()), position);

            tree_joints.push(TreeEdge {
                joint,
                parent,
                child,
                index: child,
            });
        }

        Ok(KinematicTree {
            tree,
            joints: tree_joints,
            frames: tree_frames,
            model,
            joints_by_name,
            frames_by_name,
            joints_by_connection,
        })
    }

    /// Returns a value indicating whether the link carries no inertial
    /// parameters worth preserving.
    fn has_zero_inertial(link: &Link) -> bool {
        match &link.inertial {
            None => true,
            Some(inertial) => {
                inertial.mass.abs() <= INERTIAL_TOLERANCE
                    && inertial
                        .inertia
                        .matrix()
                        .iter()
                        .all(|v| v.abs() <= INERTIAL_TOLERANCE)
            }
        }
    }

    /// Returns the set of link names reachable from the given root by
    /// following joints from parent to child.
    fn reachable_from<'a>(
        root: &'a str,
        parent_of: &'a HashMap<String, String>,
    ) -> HashSet<&'a str> {
        let mut children_of: HashMap<&str, Vec<&str>> = HashMap::new();
        for (child, parent) in parent_of {
            children_of
                .entry(parent.as_str())
                .or_default()
                .push(child.as_str());
        }

        let mut reachable: HashSet<&str> = HashSet::new();
        reachable.insert(root);

        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(root);

        while let Some(current) = queue.pop_front() {
            if let Some(children) = children_of.get(current) {
                for child in children {
                    if reachable.insert(*child) {
                        queue.push_back(*child);
                    }
                }
            }
        }

        reachable
    }

    /// Verifies that no two links, joints or frames share a name and that no
    /// element uses one of the reserved frame names.
    fn verify_unique_names(model: &Model) -> Result<(), Error> {
        let mut seen: HashSet<&str> = HashSet::new();
        seen.insert(WORLD_FRAME);
        seen.insert(MODEL_FRAME);

        let names = model
            .links
            .iter()
            .map(|l| l.name.as_str())
            .chain(model.joints.iter().map(|j| j.name.as_str()))
            .chain(model.frames.iter().map(|f| f.name.as_str()));

        for name in names {
            if !seen.insert(name) {
                return Err(Error::DuplicateElementName {
                    name: name.to_string(),
                });
            }
        }

        Ok(())
    }
}
