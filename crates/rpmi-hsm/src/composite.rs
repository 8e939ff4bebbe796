//! Composite hart-state manager: an ordered collection of child instances.
//!
//! Hart indices run across the children by running offset, so a parent
//! over children with 2 and 4 harts exposes indices 0..6, with index 3
//! resolving to child 1, local index 1. Suspend types must be identical
//! across children; the table of child 0 speaks for the whole composite.

use crate::{HartState, Hsm, HsmError, SuspendType};

pub struct HsmComposite {
    children: Vec<Hsm>,
}

impl HsmComposite {
    pub fn new(children: Vec<Hsm>) -> Result<Self, HsmError> {
        let Some(first) = children.first() else {
            return Err(HsmError::NoChildren);
        };

        let reference: Vec<SuspendType> = (0..first.suspend_type_count())
            .filter_map(|i| first.suspend_type_at(i))
            .collect();
        for (child_index, child) in children.iter().enumerate().skip(1) {
            if child.suspend_type_count() != reference.len() {
                return Err(HsmError::SuspendTypeMismatch { child: child_index });
            }
            for (i, expected) in reference.iter().enumerate() {
                if child.suspend_type_at(i) != Some(*expected) {
                    return Err(HsmError::SuspendTypeMismatch { child: child_index });
                }
            }
        }

        Ok(Self { children })
    }

    #[inline]
    pub fn children(&self) -> &[Hsm] {
        &self.children
    }

    pub fn hart_count(&self) -> usize {
        self.children.iter().map(Hsm::hart_count).sum()
    }

    pub fn hart_index_to_id(&self, index: usize) -> Option<u32> {
        let mut offset = 0;
        for child in &self.children {
            let count = child.hart_count();
            if index < offset + count {
                return child.hart_index_to_id(index - offset);
            }
            offset += count;
        }
        None
    }

    pub fn hart_id_to_index(&self, hart_id: u32) -> Option<usize> {
        let mut offset = 0;
        for child in &self.children {
            if let Some(local) = child.hart_id_to_index(hart_id) {
                return Some(offset + local);
            }
            offset += child.hart_count();
        }
        None
    }

    /// The child owning `hart_id`, or unknown-hart.
    fn owner(&self, hart_id: u32) -> Result<&Hsm, HsmError> {
        self.children
            .iter()
            .find(|c| c.hart_id_to_index(hart_id).is_some())
            .ok_or(HsmError::UnknownHart(hart_id))
    }

    pub fn get_state(&self, hart_id: u32) -> Result<HartState, HsmError> {
        self.owner(hart_id)?.get_state(hart_id)
    }

    pub fn start(&self, hart_id: u32, start_addr: u64) -> Result<(), HsmError> {
        self.owner(hart_id)?.start(hart_id, start_addr)
    }

    pub fn stop(&self, hart_id: u32) -> Result<(), HsmError> {
        self.owner(hart_id)?.stop(hart_id)
    }

    pub fn suspend(
        &self,
        hart_id: u32,
        suspend_type_id: u32,
        resume_addr: u64,
    ) -> Result<(), HsmError> {
        self.owner(hart_id)?.suspend(hart_id, suspend_type_id, resume_addr)
    }

    pub fn suspend_type_count(&self) -> usize {
        self.children[0].suspend_type_count()
    }

    pub fn suspend_type_at(&self, index: usize) -> Option<SuspendType> {
        self.children[0].suspend_type_at(index)
    }

    pub fn process_state_changes(&self) {
        for child in &self.children {
            child.process_state_changes();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::tests::leaf;
    use crate::{HsmLeaf, HsmPlatform, HwState};

    fn composite_over(tables: &[&[u32]]) -> Hsm {
        let children = tables
            .iter()
            .map(|ids| Hsm::Leaf(leaf(ids, HwState::Stopped).0))
            .collect();
        Hsm::Composite(HsmComposite::new(children).unwrap())
    }

    #[test]
    fn hart_count_sums_children() {
        let hsm = composite_over(&[&[0, 1], &[4, 5, 6], &[9]]);
        assert_eq!(hsm.hart_count(), 6);
    }

    #[test]
    fn index_mapping_uses_running_offset() {
        let hsm = composite_over(&[&[0, 1], &[4, 5, 6], &[9]]);
        assert_eq!(hsm.hart_index_to_id(0), Some(0));
        assert_eq!(hsm.hart_index_to_id(2), Some(4));
        assert_eq!(hsm.hart_index_to_id(4), Some(6));
        assert_eq!(hsm.hart_index_to_id(5), Some(9));
        assert_eq!(hsm.hart_index_to_id(6), None);

        assert_eq!(hsm.hart_id_to_index(0), Some(0));
        assert_eq!(hsm.hart_id_to_index(6), Some(4));
        assert_eq!(hsm.hart_id_to_index(9), Some(5));
        assert_eq!(hsm.hart_id_to_index(7), None);
    }

    #[test]
    fn operations_forward_to_owning_child() {
        let hsm = composite_over(&[&[0, 1], &[4, 5]]);
        hsm.process_state_changes();
        hsm.start(5, 0x4000).unwrap();
        assert_eq!(hsm.get_state(5).unwrap(), HartState::StartPending);
        // Sibling child untouched.
        assert_eq!(hsm.get_state(0).unwrap(), HartState::Stopped);
        assert_eq!(hsm.start(7, 0).unwrap_err(), HsmError::UnknownHart(7));
    }

    #[test]
    fn construction_rejects_empty_and_mismatched_children() {
        assert_eq!(HsmComposite::new(vec![]).err(), Some(HsmError::NoChildren));

        struct StoppedPlatform;
        impl HsmPlatform for StoppedPlatform {
            fn hart_get_hw_state(&self, _hart_id: u32) -> Result<HwState, HsmError> {
                Ok(HwState::Stopped)
            }
        }

        // Child 1 publishes a different suspend-type table.
        let a = Hsm::Leaf(leaf(&[0], HwState::Stopped).0);
        let b = Hsm::Leaf(
            HsmLeaf::new(
                vec![1],
                vec![SuspendType::simple(0)],
                Box::new(StoppedPlatform),
            )
            .unwrap(),
        );
        assert_eq!(
            HsmComposite::new(vec![a, b]).err(),
            Some(HsmError::SuspendTypeMismatch { child: 1 })
        );

        // A latency difference is a mismatch too.
        let a = Hsm::Leaf(leaf(&[0], HwState::Stopped).0);
        let mut types = vec![SuspendType::simple(0), SuspendType::simple(1)];
        types[1].entry_latency_us = 10;
        let b = Hsm::Leaf(HsmLeaf::new(vec![1], types, Box::new(StoppedPlatform)).unwrap());
        assert_eq!(
            HsmComposite::new(vec![a, b]).err(),
            Some(HsmError::SuspendTypeMismatch { child: 1 })
        );
    }

    #[test]
    fn nested_composites() {
        let inner = composite_over(&[&[0], &[1]]);
        let outer = Hsm::Composite(
            HsmComposite::new(vec![inner, Hsm::Leaf(leaf(&[2], HwState::Stopped).0)]).unwrap(),
        );
        assert_eq!(outer.hart_count(), 3);
        assert_eq!(outer.hart_index_to_id(2), Some(2));
        assert_eq!(outer.hart_id_to_index(1), Some(1));
    }
}
