/// Defines the pose record and the homogeneous transform primitives.
pub mod pose;

/// Defines the typed records that make up a robot description model.
pub mod model;
