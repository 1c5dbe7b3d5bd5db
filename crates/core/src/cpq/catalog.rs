use std::sync::Arc;

use crate::domain::equipment::{Equipment, EquipmentId};

/// Read-only equipment list shared by every session. Cloning is cheap.
#[derive(Clone, Debug, Default)]
pub struct CatalogSnapshot {
    equipment: Arc<[Equipment]>,
}

impl CatalogSnapshot {
    pub fn new(equipment: Vec<Equipment>) -> Self {
        Self { equipment: equipment.into() }
    }

    pub fn find(&self, equipment_id: &EquipmentId) -> Option<&Equipment> {
        self.equipment.iter().find(|equipment| &equipment.id == equipment_id)
    }

    pub fn contains(&self, equipment_id: &EquipmentId) -> bool {
        self.find(equipment_id).is_some()
    }

    pub fn items(&self) -> &[Equipment] {
        &self.equipment
    }

    pub fn len(&self) -> usize {
        self.equipment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equipment.is_empty()
    }

    /// Newline-separated enumeration embedded in oracle prompts.
    pub fn describe(&self) -> String {
        self.equipment.iter().map(Equipment::describe).collect::<Vec<_>>().join("\n")
    }
}
