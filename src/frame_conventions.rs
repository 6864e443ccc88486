//! Rewrites the poses of a robot description model into a chosen
//! reference-frame convention.
//!
//! A conversion pass moves a model through a fixed sequence of states:
//! implicit frames are made explicit, a kinematic tree and transform resolver
//! are built over the result, every pose is rewritten relative to its
//! convention-specific target frame, and a final normalization pass restores
//! consistent explicit (or collapsed) references. There is no rollback;
//! [switch_frame_convention] mutates the model in place and the mutated model
//! is the only valid copy afterwards. The tree and resolver work on deep
//! copies, so a failed build never corrupts the input model.

use std::collections::HashMap;

use tracing::warn;

use crate::{
    kinematics::tree_transforms::TreeTransforms,
    model_elements::model::{Frame, Link, Model},
    model_elements::pose::{Pose, MODEL_FRAME, WORLD_FRAME},
    Error,
};

#[cfg(test)]
#[path = "frame_conventions_tests.rs"]
mod frame_conventions_tests;

/// The tolerance below which a pose counts as trivial when collapsing
/// implicit references.
const ZERO_POSE_TOLERANCE: f64 = 1e-9;

/// The reference-frame conventions a model can be expressed in.
///
/// A convention defines, for every kind of pose-bearing element, which frame
/// the element's pose is expressed relative to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameConvention {
    /// Every pose is expressed relative to the implicit model frame
    /// (non-top-level model poses stay relative to the world).
    Model,

    /// The native SDF convention: links relative to the model frame, joints
    /// relative to their child link, frames relative to their attachment.
    Sdf,

    /// The native URDF convention: links relative to their incoming joint,
    /// joints relative to their parent link.
    Urdf,

    /// Every pose is expressed relative to the world frame.
    World,
}

/// The kinds of pose-bearing elements, used to select the target frame of a
/// conversion.
enum PoseOwner<'a> {
    /// The pose of a non-top-level model.
    Model,

    /// The pose of the canonical link.
    CanonicalLink,

    /// The pose of a non-canonical link.
    Link {
        /// The name of the link.
        name: &'a str,
    },

    /// The pose of an explicit reference frame.
    Frame {
        /// The name of the element the frame is attached to.
        attached_to: &'a str,
    },

    /// The pose of a joint.
    Joint {
        /// The name of the parent link.
        parent: &'a str,
        /// The name of the child link.
        child: &'a str,
    },

    /// The pose of a visual, owned by a link.
    Visual {
        /// The name of the owning link.
        link: &'a str,
    },

    /// The pose of a collision, owned by a link.
    Collision {
        /// The name of the owning link.
        link: &'a str,
    },

    /// The pose of an inertial block, owned by a link.
    Inertial {
        /// The name of the owning link.
        link: &'a str,
    },
}

/// The per-model facts the target-frame table needs.
struct ConversionContext {
    /// Whether the model is welded to the world.
    fixed_base: bool,

    /// The mapping from a link name to the name of its unique incoming
    /// joint.
    incoming_joint: HashMap<String, String>,
}

/// Rewrites every pose of the model into the given frame convention.
///
/// The model is mutated in place; on success every pose-bearing element is
/// expressed relative to the frame the convention prescribes and all
/// references are explicit. Callers that need the original must clone it
/// first.
///
/// ## Parameters
///
/// * 'model' - The model to convert.
/// * 'frame_convention' - The convention to rewrite the poses into.
/// * 'is_top_level' - Whether the model is the top level model of a document.
/// * 'attach_frames_to_links' - Whether every frame is re-attached directly
///   to a link first. Required before URDF export, where frames cannot
///   reference joints or other frames.
///
/// ## Errors
///
/// Any structural error reported while building the kinematic tree or
/// resolving transforms, see [crate::Error].
pub fn switch_frame_convention(
    model: &mut Model,
    frame_convention: FrameConvention,
    is_top_level: bool,
    attach_frames_to_links: bool,
) -> Result<(), Error> {
    // Resolve all implicit reference frames.
    resolve_model_frames(model, is_top_level, true)?;

    // Initialize the kinematics over the frame-resolved model.
    let mut kinematics = TreeTransforms::build(model, is_top_level)?;

    if attach_frames_to_links {
        reattach_frames_to_links(model, &mut kinematics)?;
    }

    process_model_elements(model, &mut kinematics, frame_convention, is_top_level)
}

/// Ensures every pose-bearing element of the model has an explicit reference
/// frame, or collapses trivial poses back to implicit ones.
///
/// In explicit mode (`explicit_frames` true) every element without a pose
/// receives a zero pose and every empty `relative_to` is replaced by the
/// element's default reference: the model frame for links, the child link
/// for joints, the owning link for inertials, visuals and collisions, the
/// attachment for frames. In collapse mode trivial poses are removed and
/// references equal to the default are emptied, which is used when preparing
/// final output.
///
/// ## Parameters
///
/// * 'model' - The model to update.
/// * 'is_top_level' - Whether the model is the top level model of a document.
/// * 'explicit_frames' - Selects explicit mode (true) or collapse mode
///   (false).
///
/// ## Errors
///
/// * [Error::EmptyModel] - Returned when the model has no links.
/// * [Error::CanonicalLinkNotFound] - Returned when the declared canonical
///   link does not exist.
pub fn resolve_model_frames(
    model: &mut Model,
    is_top_level: bool,
    explicit_frames: bool,
) -> Result<(), Error> {
    let canonical = model.get_canonical_link()?.to_string();
    let model_name = model.name.clone();

    // The pose of a top-level model can only be expressed in the world
    // frame, so it keeps an implicit reference even in explicit mode.
    if is_top_level && explicit_frames {
        match &mut model.pose {
            None => model.pose = Some(Pose::default()),
            Some(pose) => {
                if !pose.relative_to_or_default().is_empty()
                    && pose.relative_to_or_default() != WORLD_FRAME
                {
                    warn!(
                        model = model_name.as_str(),
                        relative_to = pose.relative_to_or_default(),
                        "The pose of a top-level model can only be relative to the world"
                    );
                }
            }
        }
    } else {
        update_pose(&mut model.pose, &[WORLD_FRAME], explicit_frames);
    }

    for frame in &mut model.frames {
        let mut defaults: Vec<&str> = Vec::new();
        if let Some(attached_to) = &frame.attached_to {
            if !attached_to.is_empty() {
                defaults.push(attached_to.as_str());
            }
        }
        defaults.push(canonical.as_str());

        update_pose(&mut frame.pose, &defaults, explicit_frames);
    }

    for link in &mut model.links {
        let Link {
            name,
            pose,
            inertial,
            visuals,
            collisions,
            ..
        } = link;

        update_pose(pose, &[MODEL_FRAME, model_name.as_str()], explicit_frames);

        if let Some(inertial) = inertial {
            update_pose(&mut inertial.pose, &[name.as_str()], explicit_frames);
        }

        for visual in visuals {
            update_pose(&mut visual.pose, &[name.as_str()], explicit_frames);
        }

        for collision in collisions {
            update_pose(&mut collision.pose, &[name.as_str()], explicit_frames);
        }
    }

    for joint in &mut model.joints {
        let child = joint.child.clone();
        update_pose(&mut joint.pose, &[child.as_str()], explicit_frames);
    }

    for sub_model in &mut model.models {
        resolve_model_frames(sub_model, false, explicit_frames)?;
    }

    Ok(())
}

/// Re-attaches every frame of the model directly to a link.
///
/// The `attached_to` chain of each frame is walked through other frames and
/// the model itself until a link is found; the frame's pose is rewritten so
/// the frame stays at the same location relative to that link.
///
/// ## Parameters
///
/// * 'model' - The model whose frames are re-attached.
/// * 'kinematics' - A transform resolver built over the frame-resolved model.
///
/// ## Errors
///
/// * [Error::FrameAttachedToJoint] - Returned when the attachment chain of a
///   frame passes through a joint.
/// * [Error::UnknownElement] - Returned when an attachment references a name
///   that does not exist.
/// * [Error::FrameCycle] - Returned when the attachment chain loops.
pub fn reattach_frames_to_links(
    model: &mut Model,
    kinematics: &mut TreeTransforms,
) -> Result<(), Error> {
    for index in 0..model.frames.len() {
        let parent_link = find_parent_link_of_frame(&model.frames[index], model)?;

        let frame = &model.frames[index];
        let pose = match &frame.pose {
            Some(pose) => pose.clone(),
            None => Pose::zero(attachment_of(frame)),
        };

        let model_from_frame = kinematics
            .relative_transform(MODEL_FRAME, pose.relative_to_or_default())?
            * pose.transform();
        let link_from_model = kinematics.relative_transform(parent_link.as_str(), MODEL_FRAME)?;

        let frame = &mut model.frames[index];
        frame.attached_to = Some(parent_link.clone());
        frame.pose = Some(Pose::from_transform(
            &(link_from_model * model_from_frame),
            parent_link.as_str(),
        ));
    }

    Ok(())
}

/// Finds the link a frame is ultimately attached to.
///
/// The attachment chain is walked through other frames; the model name and
/// the implicit model frame resolve to the canonical link. The walk is
/// bounded by the element count of the model.
///
/// ## Parameters
///
/// * 'frame' - The frame whose parent link is requested.
/// * 'model' - The model the frame belongs to.
///
/// ## Errors
///
/// * [Error::FrameAttachedToJoint] - Returned when the chain passes through
///   a joint.
/// * [Error::UnknownElement] - Returned when an attachment references a name
///   that does not exist.
/// * [Error::FrameCycle] - Returned when the chain loops.
pub fn find_parent_link_of_frame(frame: &Frame, model: &Model) -> Result<String, Error> {
    let limit = model.links.len() + model.joints.len() + model.frames.len() + 2;

    let mut current = attachment_of(frame).to_string();
    let mut steps = 0;

    loop {
        if current == model.name || current == MODEL_FRAME {
            return Ok(model.get_canonical_link()?.to_string());
        }

        if model.links.iter().any(|l| l.name == current) {
            return Ok(current);
        }

        if model.joints.iter().any(|j| j.name == current) {
            return Err(Error::FrameAttachedToJoint {
                frame: frame.name.clone(),
                joint: current,
            });
        }

        if let Some(next) = model.frames.iter().find(|f| f.name == current) {
            steps += 1;
            if steps > limit {
                return Err(Error::FrameCycle {
                    name: frame.name.clone(),
                });
            }

            current = attachment_of(next).to_string();
            continue;
        }

        return Err(Error::UnknownElement { name: current });
    }
}

/// Returns the attachment of a frame, defaulting to the implicit model frame
/// when the attachment is absent or empty.
fn attachment_of(frame: &Frame) -> &str {
    match &frame.attached_to {
        Some(attached_to) if !attached_to.is_empty() => attached_to.as_str(),
        _ => MODEL_FRAME,
    }
}

/// Rewrites the poses of all model elements towards the convention-specific
/// target frames.
fn process_model_elements(
    model: &mut Model,
    kinematics: &mut TreeTransforms,
    convention: FrameConvention,
    is_top_level: bool,
) -> Result<(), Error> {
    let canonical = model.get_canonical_link()?.to_string();
    let context = ConversionContext {
        fixed_base: model.is_fixed_base(),
        incoming_joint: model
            .joints
            .iter()
            .map(|j| (j.child.clone(), j.name.clone()))
            .collect(),
    };

    // The pose of a top-level model is already relative to the world and is
    // left alone; sub-model poses are rewritten like any other element.
    if !is_top_level {
        let target = target_frame(convention, PoseOwner::Model, &context)?;
        if let Some(pose) = &model.pose {
            if pose.relative_to_or_default() != target {
                let converted = transform_pose(kinematics, pose, target.as_str())?;
                model.pose = Some(converted);
            }
        }
    }

    for joint in &mut model.joints {
        let target = target_frame(
            convention,
            PoseOwner::Joint {
                parent: joint.parent.as_str(),
                child: joint.child.as_str(),
            },
            &context,
        )?;

        if let Some(pose) = &joint.pose {
            let converted = transform_pose(kinematics, pose, target.as_str())?;
            joint.pose = Some(converted);
        }
    }

    for index in 0..model.frames.len() {
        let target = target_frame(
            convention,
            PoseOwner::Frame {
                attached_to: attachment_of(&model.frames[index]),
            },
            &context,
        )?;

        let frame = &mut model.frames[index];
        if let Some(pose) = &frame.pose {
            let converted = transform_pose(kinematics, pose, target.as_str())?;
            frame.pose = Some(converted);
        }
    }

    for link in &mut model.links {
        let Link {
            name,
            pose,
            inertial,
            visuals,
            collisions,
            ..
        } = link;

        let owner = if name.as_str() == canonical {
            PoseOwner::CanonicalLink
        } else {
            PoseOwner::Link {
                name: name.as_str(),
            }
        };
        let target = target_frame(convention, owner, &context)?;

        if let Some(current) = pose {
            let converted = transform_pose(kinematics, current, target.as_str())?;
            *pose = Some(converted);
        }

        if let Some(inertial) = inertial {
            let target = target_frame(
                convention,
                PoseOwner::Inertial {
                    link: name.as_str(),
                },
                &context,
            )?;

            if let Some(current) = &inertial.pose {
                let converted = transform_pose(kinematics, current, target.as_str())?;
                inertial.pose = Some(converted);
            }
        }

        for visual in visuals {
            let target = target_frame(
                convention,
                PoseOwner::Visual {
                    link: name.as_str(),
                },
                &context,
            )?;

            if let Some(current) = &visual.pose {
                let converted = transform_pose(kinematics, current, target.as_str())?;
                visual.pose = Some(converted);
            }
        }

        for collision in collisions {
            let target = target_frame(
                convention,
                PoseOwner::Collision {
                    link: name.as_str(),
                },
                &context,
            )?;

            if let Some(current) = &collision.pose {
                let converted = transform_pose(kinematics, current, target.as_str())?;
                collision.pose = Some(converted);
            }
        }
    }

    Ok(())
}

/// Returns the frame an element's pose must be expressed in under the given
/// convention.
fn target_frame(
    convention: FrameConvention,
    owner: PoseOwner<'_>,
    context: &ConversionContext,
) -> Result<String, Error> {
    let target = match convention {
        FrameConvention::World => WORLD_FRAME.to_string(),
        FrameConvention::Model => match owner {
            PoseOwner::Model => WORLD_FRAME.to_string(),
            _ => MODEL_FRAME.to_string(),
        },
        FrameConvention::Sdf => match owner {
            PoseOwner::Model => WORLD_FRAME.to_string(),
            PoseOwner::CanonicalLink | PoseOwner::Link { .. } => MODEL_FRAME.to_string(),
            PoseOwner::Frame { attached_to } => attached_to.to_string(),
            PoseOwner::Joint { child, .. } => child.to_string(),
            PoseOwner::Visual { link }
            | PoseOwner::Collision { link }
            | PoseOwner::Inertial { link } => link.to_string(),
        },
        FrameConvention::Urdf => match owner {
            PoseOwner::Model => WORLD_FRAME.to_string(),
            PoseOwner::CanonicalLink => {
                // The canonical link of a fixed-base model is welded to the
                // world; URDF expresses its pose there. A floating base keeps
                // the model frame.
                if context.fixed_base {
                    WORLD_FRAME.to_string()
                } else {
                    MODEL_FRAME.to_string()
                }
            }
            PoseOwner::Link { name } => {
                context
                    .incoming_joint
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::UnknownElement {
                        name: name.to_string(),
                    })?
            }
            PoseOwner::Frame { attached_to } => attached_to.to_string(),
            PoseOwner::Joint { parent, .. } => parent.to_string(),
            PoseOwner::Visual { link }
            | PoseOwner::Collision { link }
            | PoseOwner::Inertial { link } => link.to_string(),
        },
    };

    Ok(target)
}

/// Rewrites a pose so it is expressed in the target frame while describing
/// the same physical location.
fn transform_pose(
    kinematics: &mut TreeTransforms,
    pose: &Pose,
    target: &str,
) -> Result<Pose, Error> {
    let target_from_current =
        kinematics.relative_transform(target, pose.relative_to_or_default())?;

    Ok(Pose::from_transform(
        &(target_from_current * pose.transform()),
        target,
    ))
}

/// Applies the explicit or collapse rule to a single pose slot.
fn update_pose(slot: &mut Option<Pose>, defaults: &[&str], explicit_frames: bool) {
    if explicit_frames {
        match slot {
            None => *slot = Some(Pose::zero(defaults[0])),
            Some(pose) => {
                if pose.relative_to_or_default().is_empty() {
                    pose.relative_to = Some(defaults[0].to_string());
                }
            }
        }
    } else if let Some(pose) = slot {
        let reference = pose.relative_to_or_default().to_string();
        if reference.is_empty() || defaults.contains(&reference.as_str()) {
            if pose.is_zero(ZERO_POSE_TOLERANCE) {
                *slot = None;
            } else {
                pose.relative_to = None;
            }
        }
    }
}
