#![warn(missing_docs)]

//! Kinematic-tree construction and reference-frame conversion for robot
//! description models.
//!
//! Robot description documents (SDF and URDF dialects) describe the same
//! physical robot with different reference-frame conventions. This crate
//! provides the typed in-memory model for such documents, builds a directed
//! kinematic tree of links and joints out of a model, computes rigid-body
//! transforms across that tree, and rewrites every pose in the model so it is
//! expressed in a chosen convention (world-rooted, model-rooted, SDF-native or
//! URDF-native).
//!
//! Parsing and writing the XML documents themselves is not part of this crate;
//! the record types in [model_elements] carry a serde contract so a
//! (de)serialization layer can produce and consume them.

use thiserror::Error;

/// Defines the typed records of a robot description model and the pose /
/// homogeneous transform primitives.
pub mod model_elements;

/// Provides the kinematic tree, its builder, and the transform resolver.
pub mod kinematics;

/// Provides the reference-frame convention conversion for robot models.
pub mod frame_conventions;

/// Defines the different errors for the robot description frames crate.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates that two elements of a kinematic tree share a name.
    #[error("The name '{name}' is used by more than one link, joint or frame")]
    DuplicateElementName {
        /// The name that appears more than once.
        name: String,
    },

    /// Indicates that a joint declared the reserved 'world' frame as its child.
    #[error("Joint '{name}' cannot have 'world' as its child link")]
    WorldChildJoint {
        /// The name of the offending joint.
        name: String,
    },

    /// Indicates that a joint references a link that is not part of the model.
    #[error("Joint '{joint}' references unknown link '{link}'")]
    UnknownJointLink {
        /// The name of the joint with the invalid reference.
        joint: String,
        /// The name of the missing link.
        link: String,
    },

    /// Indicates that a link is the child of more than one joint.
    #[error("Link '{link}' is the child of more than one joint")]
    MultipleParentJoints {
        /// The name of the link with multiple incoming joints.
        link: String,
    },

    /// Indicates that more than one joint connects the model to the world.
    #[error("Found {count} joints connecting the model to the world, at most one is allowed")]
    MultipleWorldJoints {
        /// The number of joints that have 'world' as their parent.
        count: usize,
    },

    /// Indicates that a fixed-base model is missing the joint that welds it
    /// to the world.
    #[error("Failed to find the joint connecting model '{model}' to the world")]
    MissingWorldJoint {
        /// The name of the model.
        model: String,
    },

    /// Indicates that the model declares joints that are not part of the
    /// kinematic tree rooted at the canonical link.
    #[error("Found unexpected dangling joints not part of the kinematic tree: {names:?}")]
    DanglingJoints {
        /// The names of the joints that are not part of the tree.
        names: Vec<String>,
    },

    /// Indicates that one or more links cannot be reached from the canonical
    /// link.
    #[error("Links {names:?} are not connected to the kinematic tree rooted at '{root}'")]
    DisconnectedLinks {
        /// The name of the tree root.
        root: String,
        /// The names of the unreachable links.
        names: Vec<String>,
    },

    /// Indicates that the joints of a model form a closed kinematic chain
    /// instead of a tree.
    #[error("The joints of model '{model}' form a closed kinematic chain, not a tree")]
    KinematicLoop {
        /// The name of the model.
        model: String,
    },

    /// Indicates that the declared canonical link does not exist in the model.
    #[error("Canonical link '{name}' is not among the links of model '{model}'")]
    CanonicalLinkNotFound {
        /// The name of the model.
        model: String,
        /// The declared canonical link name.
        name: String,
    },

    /// Indicates that a model declares no links at all.
    #[error("Model '{name}' has no links")]
    EmptyModel {
        /// The name of the model.
        name: String,
    },

    /// Indicates that a name could not be resolved to a link, joint, frame or
    /// model during a transform lookup.
    #[error("Unknown element '{name}'")]
    UnknownElement {
        /// The name that failed to resolve.
        name: String,
    },

    /// Indicates that a frame is attached to a joint, directly or through a
    /// chain of other frames.
    #[error("Frame '{frame}' is attached to joint '{joint}', frames can only attach to links, frames or models")]
    FrameAttachedToJoint {
        /// The name of the frame.
        frame: String,
        /// The name of the joint it attaches to.
        joint: String,
    },

    /// Indicates that a chain of reference frames loops back on itself.
    #[error("Detected a reference frame cycle while resolving '{name}'")]
    FrameCycle {
        /// The name of the element whose resolution did not terminate.
        name: String,
    },

    /// Indicates that a node index is out of range for the tree.
    #[error("Node index {index} is out of range for a tree with {len} nodes")]
    NodeIndexOutOfRange {
        /// The requested index.
        index: usize,
        /// The number of nodes in the tree.
        len: usize,
    },

    /// Indicates that removing an edge would require lumping non-trivial
    /// inertial parameters, which is not implemented.
    #[error("Lumping the inertial parameters of link '{name}' is not implemented")]
    InertialLumpingNotImplemented {
        /// The name of the link carrying the inertial parameters.
        name: String,
    },
}
