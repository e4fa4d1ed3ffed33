//! Pass-scoped tables.

use std::collections::{BTreeSet, HashMap, HashSet};

use relay_core::{EntityId, MaterialId, NodeId};
use relay_math::MotionStep;

use crate::records::{EntityRecord, MaterialRecord};

/// Everything the exporter knows about the current pass.
///
/// Owned by the [`Exporter`](crate::Exporter) and lent to the resolver and
/// motion sampler. Cleared at the start of every full pass.
#[derive(Debug, Default)]
pub struct PassState {
    /// Translated entities
    pub entities: HashMap<EntityId, EntityRecord>,
    /// Point-rendered particle systems, keyed by system id
    pub particles: HashMap<EntityId, EntityRecord>,
    pub materials: HashMap<MaterialId, MaterialRecord>,
    pub cameras: HashMap<EntityId, EntityRecord>,
    /// Camera the scene renders through
    pub main_camera: Option<EntityId>,
    /// Union of every requested sample offset
    pub motion_steps: BTreeSet<MotionStep>,
    /// Transform samples for particle-instanced placements
    pub particle_motion_steps: Vec<f32>,
    /// Entities that transform or deform
    pub moving: HashSet<EntityId>,
    /// Entities whose `update` already ran this pass
    pub processed: HashSet<EntityId>,
    pub default_light: Option<NodeId>,
    /// Group records created for renderable placements
    pub num_object_instances: usize,
    /// Placements the resolver skipped
    pub skipped_placements: usize,
}

impl PassState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Merge sample offsets into the scene-wide step set.
    ///
    /// Offset zero joins as soon as the set is non-empty.
    pub fn add_motion_steps(&mut self, steps: &[f32]) {
        if steps.is_empty() {
            return;
        }
        self.motion_steps.extend(steps.iter().map(|s| MotionStep(*s)));
        self.motion_steps.insert(MotionStep(0.0));
    }

    /// The step set in ascending order.
    pub fn sorted_steps(&self) -> Vec<f32> {
        self.motion_steps.iter().map(|s| s.offset()).collect()
    }

    /// Total group records across all entities.
    pub fn group_count(&self) -> usize {
        self.entities.values().map(|r| r.instances.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_sorted_union_with_zero() {
        let mut state = PassState::new();
        state.add_motion_steps(&[-0.25, 0.25]);
        state.add_motion_steps(&[-0.25, -0.125, 0.0, 0.125, 0.25]);
        assert_eq!(state.sorted_steps(), vec![-0.25, -0.125, 0.0, 0.125, 0.25]);
    }

    #[test]
    fn test_empty_steps_do_not_add_zero() {
        let mut state = PassState::new();
        state.add_motion_steps(&[]);
        assert!(state.motion_steps.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut state = PassState::new();
        state.add_motion_steps(&[0.5]);
        state.processed.insert(EntityId::object("Cube"));
        state.num_object_instances = 4;
        state.clear();
        assert!(state.motion_steps.is_empty());
        assert!(state.processed.is_empty());
        assert_eq!(state.num_object_instances, 0);
    }
}
