//! Defines the pose record shared by all model elements and the homogeneous
//! transform primitives used by the kinematics modules.

extern crate nalgebra as na;

use na::{Isometry3, Matrix4, Rotation3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "pose_tests.rs"]
mod pose_tests;

/// The name of the implicit universal root frame.
pub const WORLD_FRAME: &str = "world";

/// The name of the implicit frame of a model, attached to its canonical link.
pub const MODEL_FRAME: &str = "__model__";

/// The position and orientation of a model element relative to a named
/// reference frame.
///
/// The six components are the x, y and z translation followed by the
/// roll-pitch-yaw rotation. The rotation follows the x-y-z Tait-Bryan sequence
/// using the extrinsic convention (rotations about the axes of a fixed frame),
/// which is the sequence both SDF and URDF use. Angles are radians unless the
/// `degrees` flag is set.
///
/// An empty or absent `relative_to` means the element's implicit default
/// frame; [crate::frame_conventions::resolve_model_frames] replaces such
/// implicit references with explicit ones.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// The pose components, `[x, y, z, roll, pitch, yaw]`.
    pub pose: [f64; 6],

    /// The name of the frame this pose is expressed in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_to: Option<String>,

    /// When set, the rotation components are degrees instead of radians.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degrees: Option<bool>,

    /// The rotation sequence tag carried by some SDF documents. Stored for
    /// round-tripping, not interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_format: Option<String>,
}

impl Pose {
    /// Creates a zero pose expressed in the given frame.
    ///
    /// ## Parameters
    ///
    /// * 'relative_to' - The name of the reference frame.
    pub fn zero(relative_to: &str) -> Self {
        Self {
            pose: [0.0; 6],
            relative_to: Some(relative_to.to_string()),
            degrees: None,
            rotation_format: None,
        }
    }

    /// Returns the translation components of the pose.
    pub fn xyz(&self) -> [f64; 3] {
        [self.pose[0], self.pose[1], self.pose[2]]
    }

    /// Returns the roll-pitch-yaw components of the pose, converted to
    /// radians if the `degrees` flag is set.
    pub fn rpy(&self) -> [f64; 3] {
        let scale = if self.degrees == Some(true) {
            std::f64::consts::PI / 180.0
        } else {
            1.0
        };

        [
            self.pose[3] * scale,
            self.pose[4] * scale,
            self.pose[5] * scale,
        ]
    }

    /// Returns the name of the reference frame, or an empty string when the
    /// reference is implicit.
    pub fn relative_to_or_default(&self) -> &str {
        match &self.relative_to {
            Some(name) => name.as_str(),
            None => "",
        }
    }

    /// Returns a value indicating whether all six pose components are within
    /// `tolerance` of zero.
    ///
    /// ## Parameters
    ///
    /// * 'tolerance' - The absolute tolerance for each component.
    pub fn is_zero(&self, tolerance: f64) -> bool {
        self.pose.iter().all(|v| v.abs() <= tolerance)
    }

    /// Builds the homogeneous transform described by this pose.
    ///
    /// The result is a 4x4 matrix with the rotation block in the top-left,
    /// the translation in the top-right column and `[0, 0, 0, 1]` as the
    /// bottom row.
    pub fn transform(&self) -> Matrix4<f64> {
        let [x, y, z] = self.xyz();
        let [roll, pitch, yaw] = self.rpy();

        let isometry = Isometry3::from_parts(
            Translation3::new(x, y, z),
            UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        );

        isometry.to_homogeneous()
    }

    /// Extracts a pose from a homogeneous transform.
    ///
    /// The rotation block is converted back to the x-y-z extrinsic Tait-Bryan
    /// sequence. The resulting angles are always radians.
    ///
    /// ## Parameters
    ///
    /// * 'transform' - The rigid transform to decompose.
    /// * 'relative_to' - The name of the frame the transform is expressed in.
    pub fn from_transform(transform: &Matrix4<f64>, relative_to: &str) -> Self {
        let translation = transform.fixed_view::<3, 1>(0, 3);
        let rotation =
            Rotation3::from_matrix_unchecked(transform.fixed_view::<3, 3>(0, 0).into_owned());
        let (roll, pitch, yaw) = rotation.euler_angles();

        Self {
            pose: [
                translation[0],
                translation[1],
                translation[2],
                roll,
                pitch,
                yaw,
            ],
            relative_to: Some(relative_to.to_string()),
            degrees: None,
            rotation_format: None,
        }
    }
}

/// Inverts a rigid homogeneous transform.
///
/// For a transform with rotation block `R` and translation `p` the inverse is
/// `[[R^T, -R^T p], [0, 0, 0, 1]]`. This exploits the orthogonality of the
/// rotation block instead of running a general matrix inversion.
///
/// ## Parameters
///
/// * 'transform' - The rigid transform to invert.
pub fn inverse_transform(transform: &Matrix4<f64>) -> Matrix4<f64> {
    let rotation = transform.fixed_view::<3, 3>(0, 0);
    let translation = transform.fixed_view::<3, 1>(0, 3);

    let rotation_transposed = rotation.transpose();
    let inverted_translation = -(rotation_transposed * translation);

    let mut result = Matrix4::<f64>::identity();
    result
        .fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&rotation_transposed);
    result
        .fixed_view_mut::<3, 1>(0, 3)
        .copy_from(&inverted_translation);

    result
}
