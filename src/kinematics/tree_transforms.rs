//! Computes world transforms of kinematic tree elements.
//!
//! The resolver walks the reference-frame chain of an element up to the
//! world frame, composes the local transforms top-down and caches every
//! intermediate result by name. The cache is an unsynchronized map; a
//! resolver instance must not be shared between threads.

extern crate nalgebra as na;

use std::collections::HashMap;

use na::Matrix4;

use crate::{
    model_elements::model::Model,
    model_elements::pose::{inverse_transform, MODEL_FRAME, WORLD_FRAME},
    Error,
};

use super::kinematic_tree::KinematicTree;

#[cfg(test)]
#[path = "tree_transforms_tests.rs"]
mod tree_transforms_tests;

/// Resolves world transforms for the elements of a kinematic tree.
///
/// Each transform lookup costs one walk to the nearest cached ancestor, which
/// amortizes to constant time once the cache is warm. Invalidation removes a
/// cached entry together with every entry whose resolution chain passes
/// through it, so a targeted pose edit only forces recomputation of the
/// affected subtree.
#[derive(Clone, Debug)]
pub struct TreeTransforms {
    /// The kinematic tree the transforms are resolved over.
    kinematic_tree: KinematicTree,

    /// The mapping from element name to its cached world transform.
    cache: HashMap<String, Matrix4<f64>>,
}

impl TreeTransforms {
    /// Builds a transform resolver for the given model.
    ///
    /// The model is deep-copied and pose-resolved by the tree build; the
    /// caller's model is never modified.
    ///
    /// ## Parameters
    ///
    /// * 'model' - The model to resolve transforms for.
    /// * 'is_top_level' - Whether the model is the top level model of a
    ///   document.
    ///
    /// ## Errors
    ///
    /// Any structural error reported by [KinematicTree::build].
    pub fn build(model: &Model, is_top_level: bool) -> Result<TreeTransforms, Error> {
        let kinematic_tree = KinematicTree::build(model, is_top_level)?;

        Ok(Self::from_tree(kinematic_tree))
    }

    /// Creates a transform resolver over an already built kinematic tree.
    ///
    /// ## Parameters
    ///
    /// * 'kinematic_tree' - The tree to resolve transforms over.
    pub fn from_tree(kinematic_tree: KinematicTree) -> TreeTransforms {
        Self {
            kinematic_tree,
            cache: HashMap::new(),
        }
    }

    /// Returns the kinematic tree the transforms are resolved over.
    pub fn kinematic_tree(&self) -> &KinematicTree {
        &self.kinematic_tree
    }

    /// Returns the world transform of the element with the given name.
    ///
    /// ## Parameters
    ///
    /// * 'name' - The name of a link, joint, frame, or the model itself.
    ///
    /// ## Errors
    ///
    /// * [Error::UnknownElement] - Returned when the name does not resolve to
    ///   any element of the tree.
    /// * [Error::FrameCycle] - Returned when the reference-frame chain of the
    ///   element does not terminate at the world frame.
    pub fn transform(&mut self, name: &str) -> Result<Matrix4<f64>, Error> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(*cached);
        }

        // Walk towards the world frame until a cached ancestor (or the world
        // itself) is found. The walk is bounded by the element count so that
        // a cyclic reference chain is reported instead of looping forever.
        let limit = self.element_count();
        let mut path: Vec<String> = Vec::new();
        let mut current = Some(name.to_string());
        let mut transform = Matrix4::<f64>::identity();

        while let Some(element) = current {
            if let Some(cached) = self.cache.get(element.as_str()) {
                transform = *cached;
                break;
            }

            if path.len() >= limit {
                return Err(Error::FrameCycle {
                    name: name.to_string(),
                });
            }

            path.push(element.clone());
            current = self.parent_frame_of(element.as_str())?;
        }

        // Compose from the root down, caching every element on the path.
        for element in path.iter().rev() {
            transform *= self.local_transform(element)?;
            self.cache.insert(element.clone(), transform);
        }

        Ok(transform)
    }

    /// Returns the transform expressing 'to_frame' in the coordinates of
    /// 'from_frame'.
    ///
    /// ## Parameters
    ///
    /// * 'from_frame' - The name of the frame the result is expressed in.
    /// * 'to_frame' - The name of the frame being expressed.
    ///
    /// ## Errors
    ///
    /// * [Error::UnknownElement] - Returned when either name does not resolve.
    /// * [Error::FrameCycle] - Returned when a reference-frame chain does not
    ///   terminate.
    pub fn relative_transform(
        &mut self,
        from_frame: &str,
        to_frame: &str,
    ) -> Result<Matrix4<f64>, Error> {
        let world_from_from = self.transform(from_frame)?;
        let world_from_to = self.transform(to_frame)?;

        Ok(inverse_transform(&world_from_from) * world_from_to)
    }

    /// Removes the cached transform of the given element and of every element
    /// whose resolution chain passes through it.
    ///
    /// ## Parameters
    ///
    /// * 'name' - The name of the element whose cached transform is stale.
    ///
    /// ## Errors
    ///
    /// * [Error::FrameCycle] - Returned when a reference-frame chain does not
    ///   terminate.
    pub fn invalidate(&mut self, name: &str) -> Result<(), Error> {
        let cached_names: Vec<String> = self.cache.keys().cloned().collect();

        for cached in cached_names {
            if self.depends_on(cached.as_str(), name)? {
                self.cache.remove(cached.as_str());
            }
        }

        Ok(())
    }

    /// Clears the whole transform cache.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Returns a value indicating whether the resolution chain of 'child'
    /// passes through 'ancestor'.
    fn depends_on(&self, child: &str, ancestor: &str) -> Result<bool, Error> {
        let limit = self.element_count();
        let mut steps = 0;
        let mut current = Some(child.to_string());

        while let Some(element) = current {
            if element == ancestor {
                return Ok(true);
            }

            if steps >= limit {
                return Err(Error::FrameCycle {
                    name: child.to_string(),
                });
            }

            steps += 1;
            current = self.parent_frame_of(element.as_str())?;
        }

        Ok(false)
    }

    /// Returns an upper bound for the length of any valid reference-frame
    /// chain.
    fn element_count(&self) -> usize {
        let tree = &self.kinematic_tree;

        // The extra two cover the model (addressable by name and as the
        // implicit model frame) and the world frame.
        tree.tree().len() + tree.joints().len() + tree.frames().len() + 2
    }

    /// Returns the local transform of the element with the given name, i.e.
    /// the transform described by the element's own pose.
    fn local_transform(&self, name: &str) -> Result<Matrix4<f64>, Error> {
        if name == WORLD_FRAME {
            return Ok(Matrix4::<f64>::identity());
        }

        let model = self.kinematic_tree.model();
        if name == MODEL_FRAME || name == model.name {
            return Ok(match &model.pose {
                Some(pose) => pose.transform(),
                None => Matrix4::<f64>::identity(),
            });
        }

        if let Some(joint) = self.kinematic_tree.get_joint(name) {
            return Ok(joint.pose().transform());
        }

        if self.kinematic_tree.tree().contains(name) {
            return Ok(self.kinematic_tree.get_node(name)?.pose().transform());
        }

        if let Some(frame) = self.kinematic_tree.get_frame(name) {
            return Ok(frame.pose().transform());
        }

        Err(Error::UnknownElement {
            name: name.to_string(),
        })
    }

    /// Returns the name of the frame the given element's pose is expressed
    /// in, or `None` for the world frame.
    ///
    /// An element whose pose carries no explicit reference resolves to the
    /// world frame.
    fn parent_frame_of(&self, name: &str) -> Result<Option<String>, Error> {
        if name == WORLD_FRAME {
            return Ok(None);
        }

        let model = self.kinematic_tree.model();
        if name == MODEL_FRAME || name == model.name {
            let parent = model
                .pose
                .as_ref()
                .and_then(|pose| pose.relative_to.clone())
                .filter(|reference| !reference.is_empty())
                .unwrap_or_else(|| WORLD_FRAME.to_string());

            return Ok(Some(parent));
        }

        let reference = if let Some(joint) = self.kinematic_tree.get_joint(name) {
            joint.pose().relative_to
        } else if self.kinematic_tree.tree().contains(name) {
            self.kinematic_tree.get_node(name)?.pose().relative_to
        } else if let Some(frame) = self.kinematic_tree.get_frame(name) {
            frame.pose().relative_to
        } else {
            return Err(Error::UnknownElement {
                name: name.to_string(),
            });
        };

        Ok(Some(
            reference
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| WORLD_FRAME.to_string()),
        ))
    }
}
