use std::f64::consts::PI;

use float_cmp::{ApproxEq, F64Margin};
use nalgebra::Matrix4;

use super::*;

fn margin() -> F64Margin {
    F64Margin {
        ulps: 2,
        epsilon: 1e-9,
    }
}

fn assert_matrices_are_equal(expected: &Matrix4<f64>, calculated: &Matrix4<f64>) {
    let mut expected_it = expected.iter();
    let mut calculated_it = calculated.iter();
    loop {
        match (expected_it.next(), calculated_it.next()) {
            (Some(a), Some(b)) => {
                assert!(
                    (*a).approx_eq(*b, margin()),
                    "Expected {:.12} and {:.12} to be equal within 2 ulps or 1e-9",
                    *a,
                    *b
                );
            }
            (None, None) => break,
            _ => assert!(false),
        }
    }
}

// Pose

#[test]
fn when_creating_zero_pose_it_should_store_the_reference_frame() {
    let pose = Pose::zero("base");

    assert_eq!([0.0; 6], pose.pose);
    assert_eq!(Some("base".to_string()), pose.relative_to);
    assert_eq!("base", pose.relative_to_or_default());
    assert!(pose.is_zero(1e-9));
}

#[test]
fn when_getting_the_reference_of_a_default_pose_it_should_be_empty() {
    let pose = Pose::default();

    assert_eq!("", pose.relative_to_or_default());
}

#[test]
fn when_splitting_the_pose_it_should_return_translation_and_rotation() {
    let pose = Pose {
        pose: [1.0, 2.0, 3.0, 0.1, 0.2, 0.3],
        relative_to: None,
        degrees: None,
        rotation_format: None,
    };

    assert_eq!([1.0, 2.0, 3.0], pose.xyz());
    assert_eq!([0.1, 0.2, 0.3], pose.rpy());
}

#[test]
fn when_the_degrees_flag_is_set_it_should_convert_the_rotation_to_radians() {
    let pose_in_degrees = Pose {
        pose: [0.0, 0.0, 0.0, 90.0, 0.0, 30.0],
        relative_to: None,
        degrees: Some(true),
        rotation_format: None,
    };
    let pose_in_radians = Pose {
        pose: [0.0, 0.0, 0.0, 0.5 * PI, 0.0, PI / 6.0],
        relative_to: None,
        degrees: None,
        rotation_format: None,
    };

    let rpy = pose_in_degrees.rpy();
    assert!(rpy[0].approx_eq(0.5 * PI, margin()));
    assert!(rpy[2].approx_eq(PI / 6.0, margin()));

    assert_matrices_are_equal(&pose_in_radians.transform(), &pose_in_degrees.transform());
}

#[test]
fn when_building_a_transform_from_a_zero_pose_it_should_be_the_identity() {
    let pose = Pose::zero(WORLD_FRAME);

    assert_matrices_are_equal(&Matrix4::<f64>::identity(), &pose.transform());
}

#[test]
fn when_building_a_transform_it_should_place_the_translation_in_the_last_column() {
    let pose = Pose {
        pose: [1.0, -2.0, 3.0, 0.0, 0.0, 0.0],
        relative_to: None,
        degrees: None,
        rotation_format: None,
    };

    let transform = pose.transform();

    assert!(transform[(0, 3)].approx_eq(1.0, margin()));
    assert!(transform[(1, 3)].approx_eq(-2.0, margin()));
    assert!(transform[(2, 3)].approx_eq(3.0, margin()));
    assert!(transform[(3, 3)].approx_eq(1.0, margin()));
}

#[test]
fn when_building_a_transform_it_should_use_the_extrinsic_xyz_sequence() {
    // A pure yaw rotates the x-axis onto the y-axis.
    let pose = Pose {
        pose: [0.0, 0.0, 0.0, 0.0, 0.0, 0.5 * PI],
        relative_to: None,
        degrees: None,
        rotation_format: None,
    };

    let transform = pose.transform();

    #[rustfmt::skip]
    let expected = Matrix4::new(
        0.0, -1.0, 0.0, 0.0,
        1.0,  0.0, 0.0, 0.0,
        0.0,  0.0, 1.0, 0.0,
        0.0,  0.0, 0.0, 1.0);

    assert_matrices_are_equal(&expected, &transform);
}

#[test]
fn when_round_tripping_a_pose_through_a_transform_it_should_be_unchanged() {
    let poses = vec![
        [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        [1.0, 2.0, 3.0, 0.1, -0.2, 0.3],
        [-0.5, 0.25, 10.0, 1.2, 0.4, -1.4],
        [0.0, 0.0, 1.0, 0.0, 0.5 * PI - 0.01, 0.0],
    ];

    for components in poses {
        let pose = Pose {
            pose: components,
            relative_to: Some("base".to_string()),
            degrees: None,
            rotation_format: None,
        };

        let round_tripped = Pose::from_transform(&pose.transform(), "base");

        assert_eq!(pose.relative_to, round_tripped.relative_to);
        for (expected, calculated) in pose.pose.iter().zip(round_tripped.pose.iter()) {
            assert!(
                (*expected).approx_eq(*calculated, margin()),
                "Expected {:.12} and {:.12} to be equal within 2 ulps or 1e-9",
                *expected,
                *calculated
            );
        }
    }
}

#[test]
fn when_extracting_a_pose_from_a_transform_it_should_tag_the_reference_frame() {
    let transform = Matrix4::<f64>::identity();

    let pose = Pose::from_transform(&transform, "arm");

    assert_eq!(Some("arm".to_string()), pose.relative_to);
    assert_eq!(None, pose.degrees);
    assert!(pose.is_zero(1e-9));
}

// inverse_transform

#[test]
fn when_inverting_a_rigid_transform_it_should_produce_the_identity_when_composed() {
    let pose = Pose {
        pose: [1.0, 2.0, 3.0, 0.3, -0.6, 1.1],
        relative_to: None,
        degrees: None,
        rotation_format: None,
    };
    let transform = pose.transform();

    let inverse = inverse_transform(&transform);

    assert_matrices_are_equal(&Matrix4::<f64>::identity(), &(transform * inverse));
    assert_matrices_are_equal(&Matrix4::<f64>::identity(), &(inverse * transform));
}

#[test]
fn when_inverting_a_transform_twice_it_should_be_unchanged() {
    let pose = Pose {
        pose: [-4.0, 0.5, 2.0, 0.9, 0.2, -0.7],
        relative_to: None,
        degrees: None,
        rotation_format: None,
    };
    let transform = pose.transform();

    assert_matrices_are_equal(&transform, &inverse_transform(&inverse_transform(&transform)));
}

#[test]
fn when_inverting_a_pure_translation_it_should_negate_the_translation() {
    let pose = Pose {
        pose: [0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
        relative_to: None,
        degrees: None,
        rotation_format: None,
    };

    let inverse = inverse_transform(&pose.transform());

    assert!(inverse[(2, 3)].approx_eq(-1.0, margin()));
}
