//! Defines the typed records of a robot description model.
//!
//! The records mirror the element tree of an SDF document. They are plain
//! data with a serde contract: an XML (de)serialization layer produces and
//! consumes them, the kinematics modules read them and the frame-convention
//! converter rewrites their poses. Geometry, material and physics subtrees
//! belong to that external layer and are not represented here.

extern crate nalgebra as na;

use na::Matrix3;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{frame_conventions, Error};

use super::pose::{Pose, WORLD_FRAME};

#[cfg(test)]
#[path = "model_tests.rs"]
mod model_tests;

/// The closed set of joint types understood by the kinematics modules.
///
/// The tree builder treats all of them alike; only the (external) URDF
/// export path distinguishes between the types it can express and the ones
/// it has to reject.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JointType {
    /// A one degree-of-freedom rotational joint with limits.
    Revolute,
    /// A two degree-of-freedom rotational joint.
    Revolute2,
    /// A rotational joint without limits.
    Continuous,
    /// A one degree-of-freedom translational joint.
    Prismatic,
    /// A joint that allows no relative motion.
    Fixed,
    /// A three degree-of-freedom ball and socket joint.
    Ball,
    /// A geared revolute joint.
    Gearbox,
    /// A single degree-of-freedom joint with coupled rotation and translation.
    Screw,
    /// A universal joint with two rotational degrees of freedom.
    Universal,
}

/// A unit direction vector for a joint axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Xyz {
    /// The direction components.
    pub xyz: [f64; 3],

    /// The name of the frame the direction is expressed in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expressed_in: Option<String>,
}

/// The motion limits of a joint axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    /// The lower position limit in radians or meters.
    pub lower: f64,

    /// The upper position limit in radians or meters.
    pub upper: f64,

    /// The maximum effort the joint can apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<f64>,

    /// The maximum velocity of the joint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,

    /// The joint stop stiffness.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stiffness: Option<f64>,

    /// The joint stop dissipation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dissipation: Option<f64>,
}

/// The dynamic properties of a joint axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dynamics {
    /// The spring reference position.
    pub spring_reference: f64,

    /// The spring stiffness.
    pub spring_stiffness: f64,

    /// The viscous damping coefficient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damping: Option<f64>,

    /// The static friction value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friction: Option<f64>,
}

/// The axis of motion of a joint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    /// The direction of the axis.
    pub xyz: Xyz,

    /// The motion limits along the axis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<Limit>,

    /// The dynamic properties of the axis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamics: Option<Dynamics>,
}

/// The six independent components of a 3x3 symmetric rotational inertia
/// tensor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inertia {
    /// The moment of inertia about the x axis.
    pub ixx: f64,
    /// The moment of inertia about the y axis.
    pub iyy: f64,
    /// The moment of inertia about the z axis.
    pub izz: f64,
    /// The xy product of inertia.
    #[serde(default)]
    pub ixy: f64,
    /// The xz product of inertia.
    #[serde(default)]
    pub ixz: f64,
    /// The yz product of inertia.
    #[serde(default)]
    pub iyz: f64,
}

impl Inertia {
    /// Returns the inertia tensor as a symmetric 3x3 matrix.
    pub fn matrix(&self) -> Matrix3<f64> {
        #[rustfmt::skip]
        let matrix = Matrix3::new(
            self.ixx, self.ixy, self.ixz,
            self.ixy, self.iyy, self.iyz,
            self.ixz, self.iyz, self.izz);

        matrix
    }
}

impl Default for Inertia {
    fn default() -> Self {
        Self {
            ixx: 1.0,
            iyy: 1.0,
            izz: 1.0,
            ixy: 0.0,
            ixz: 0.0,
            iyz: 0.0,
        }
    }
}

/// The inertial properties of a link.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inertial {
    /// The mass of the link in kg.
    pub mass: f64,

    /// The rotational inertia tensor of the link.
    pub inertia: Inertia,

    /// The pose of the inertial frame, by default relative to the link frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,
}

/// The visual representation of a part of a link.
///
/// The geometry and material subtrees live in the external serialization
/// layer; the core only needs the name and the pose.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Visual {
    /// The name of the visual, unique within its link.
    pub name: String,

    /// The pose of the visual, by default relative to the link frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,
}

/// The collision representation of a part of a link.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collision {
    /// The name of the collision, unique within its link.
    pub name: String,

    /// The pose of the collision, by default relative to the link frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,
}

/// A rigid body of a model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// The name of the link, unique within the model.
    pub name: String,

    /// The pose of the link, by default relative to the model frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,

    /// The inertial properties of the link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inertial: Option<Inertial>,

    /// The visuals of the link.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visuals: Vec<Visual>,

    /// The collisions of the link.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collisions: Vec<Collision>,

    /// Whether gravity acts on the link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gravity: Option<bool>,

    /// Whether the link is kinematic only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinematic: Option<bool>,

    /// Whether the link collides with other links of the same model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_collide: Option<bool>,

    /// Whether wind acts on the link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_wind: Option<bool>,

    /// Whether the link must be the base link of the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_be_base_link: Option<bool>,
}

impl Link {
    /// Creates a new link with the given name and no other properties.
    ///
    /// ## Parameters
    ///
    /// * 'name' - The name of the link.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pose: None,
            inertial: None,
            visuals: Vec::new(),
            collisions: Vec::new(),
            gravity: None,
            kinematic: None,
            self_collide: None,
            enable_wind: None,
            must_be_base_link: None,
        }
    }
}

/// A connection between a parent link and a child link.
///
/// The topology of a joint is immutable once a kinematic tree has been built
/// from the model; only the pose is rewritten by the frame-convention
/// converter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    /// The name of the joint, unique within the model.
    pub name: String,

    /// The type of the joint.
    #[serde(rename = "type")]
    pub joint_type: JointType,

    /// The name of the parent link, or the reserved name 'world'.
    pub parent: String,

    /// The name of the child link. Never the reserved name 'world'.
    pub child: String,

    /// The pose of the joint, by default relative to the child link frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,

    /// The axis of motion of the joint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis: Option<Axis>,
}

/// An additional named reference frame of a model.
///
/// Frames are non-structural: they reference into the kinematic tree via
/// `attached_to` but do not take part in its link/joint topology.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// The name of the frame, unique within the model.
    pub name: String,

    /// The name of the link, frame or model the frame is attached to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to: Option<String>,

    /// The pose of the frame, by default relative to the `attached_to`
    /// element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,
}

/// A robot description model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// The name of the model.
    pub name: String,

    /// The name of the link acting as the root of the kinematic tree. When
    /// absent the first declared link is the canonical link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_link: Option<String>,

    /// The name of the frame used to place the model in a world.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement_frame: Option<String>,

    /// Whether the model is static.
    #[serde(default, rename = "static", skip_serializing_if = "Option::is_none")]
    pub is_static: Option<bool>,

    /// Whether the links of the model collide with each other.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_collide: Option<bool>,

    /// Whether the simulator may disable the model when it is at rest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_auto_disable: Option<bool>,

    /// Whether wind acts on the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_wind: Option<bool>,

    /// The pose of the model, by default relative to the world frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,

    /// Nested sub-models. Model composition is not supported by the
    /// kinematics modules; these are ignored with a warning.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<Model>,

    /// The additional reference frames of the model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<Frame>,

    /// The links of the model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,

    /// The joints of the model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joints: Vec<Joint>,
}

impl Model {
    /// Creates a new empty model with the given name.
    ///
    /// ## Parameters
    ///
    /// * 'name' - The name of the model.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            canonical_link: None,
            placement_frame: None,
            is_static: None,
            self_collide: None,
            allow_auto_disable: None,
            enable_wind: None,
            pose: None,
            models: Vec::new(),
            frames: Vec::new(),
            links: Vec::new(),
            joints: Vec::new(),
        }
    }

    /// Appends a frame to the model.
    ///
    /// ## Parameters
    ///
    /// * 'frame' - The frame to append.
    pub fn add_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Returns a value indicating whether the model is fixed-base, i.e.
    /// whether a joint welds it to the reserved 'world' frame.
    ///
    /// A model with more than one such joint is invalid; building a
    /// [crate::kinematics::kinematic_tree::KinematicTree] from it reports the
    /// error.
    pub fn is_fixed_base(&self) -> bool {
        self.joints.iter().any(|j| j.parent == WORLD_FRAME)
    }

    /// Returns the name of the canonical link, the link that defines the
    /// model's implicit frame and roots its kinematic tree.
    ///
    /// ## Errors
    ///
    /// * [Error::CanonicalLinkNotFound] - Returned when the declared
    ///   canonical link is not among the model's links.
    /// * [Error::EmptyModel] - Returned when the model has no links to pick
    ///   a default from.
    pub fn get_canonical_link(&self) -> Result<&str, Error> {
        if !self.models.is_empty() {
            warn!(
                model = self.name.as_str(),
                "Model composition is not supported. The canonical link of the top model is used."
            );
        }

        if let Some(declared) = &self.canonical_link {
            if !self.links.iter().any(|l| &l.name == declared) {
                return Err(Error::CanonicalLinkNotFound {
                    model: self.name.clone(),
                    name: declared.clone(),
                });
            }

            return Ok(declared.as_str());
        }

        match self.links.first() {
            Some(link) => Ok(link.name.as_str()),
            None => Err(Error::EmptyModel {
                name: self.name.clone(),
            }),
        }
    }

    /// Resolves the implicit reference frames of the model.
    ///
    /// See [frame_conventions::resolve_model_frames] for the exact rules.
    ///
    /// ## Parameters
    ///
    /// * 'is_top_level' - Whether the model is the top level model of a
    ///   document rather than a nested sub-model.
    /// * 'explicit_frames' - When true every pose receives an explicit
    ///   `relative_to`; when false trivial poses and implicit references are
    ///   stripped back out.
    ///
    /// ## Errors
    ///
    /// * [Error::EmptyModel] - Returned when the model has no links.
    /// * [Error::CanonicalLinkNotFound] - Returned when the declared
    ///   canonical link does not exist.
    pub fn resolve_frames(
        &mut self,
        is_top_level: bool,
        explicit_frames: bool,
    ) -> Result<(), Error> {
        frame_conventions::resolve_model_frames(self, is_top_level, explicit_frames)
    }

    /// Rewrites every pose of the model into the given frame convention.
    ///
    /// The model is modified in place and is the only valid copy afterwards;
    /// on error the model may hold partially resolved frames but no rewritten
    /// poses. See [frame_conventions::switch_frame_convention].
    ///
    /// ## Parameters
    ///
    /// * 'frame_convention' - The convention to rewrite the poses into.
    /// * 'is_top_level' - Whether the model is the top level model of a
    ///   document.
    /// * 'explicit_frames' - Whether the final normalization pass keeps
    ///   explicit `relative_to` references or collapses trivial ones.
    /// * 'attach_frames_to_links' - Whether every frame is re-attached
    ///   directly to a link, as required before URDF export.
    ///
    /// ## Errors
    ///
    /// Any structural error reported by
    /// [crate::kinematics::kinematic_tree::KinematicTree::build] or by the
    /// frame re-attachment, see [crate::Error].
    pub fn switch_frame_convention(
        &mut self,
        frame_convention: frame_conventions::FrameConvention,
        is_top_level: bool,
        explicit_frames: bool,
        attach_frames_to_links: bool,
    ) -> Result<(), Error> {
        frame_conventions::switch_frame_convention(
            self,
            frame_convention,
            is_top_level,
            attach_frames_to_links,
        )?;

        self.resolve_frames(is_top_level, explicit_frames)
    }
}
