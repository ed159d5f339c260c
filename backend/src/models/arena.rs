//! Dense cell storage with generational handles
//!
//! Cells live contiguously so the agent pass can `par_iter_mut` them; a
//! slot map translates stable [`CellId`]s to the current dense index.

use std::collections::HashSet;

use glam::DVec3;
use slotmap::SlotMap;

use crate::models::cell::{Cell, CellId, CustomData};

#[derive(Debug, Default)]
pub struct CellArena {
    slots: SlotMap<CellId, usize>,
    cells: Vec<Cell>,
}

impl CellArena {
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            cells: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotMap::with_capacity_and_key(capacity),
            cells: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Insert `cell` and stamp it with its new id
    pub fn insert(&mut self, mut cell: Cell) -> CellId {
        let index = self.cells.len();
        let id = self.slots.insert(index);
        cell.id = id;
        self.cells.push(cell);
        id
    }

    /// Swap-remove a single cell
    pub fn remove(&mut self, id: CellId) -> Option<Cell> {
        let index = self.slots.remove(id)?;
        let removed = self.cells.swap_remove(index);
        debug_assert_eq!(removed.id, id);
        if let Some(moved) = self.cells.get(index) {
            if let Some(slot) = self.slots.get_mut(moved.id) {
                *slot = index;
            }
        }
        Some(removed)
    }

    /// Remove every cell in `ids`, preserving the order of the rest
    pub fn remove_many(&mut self, ids: &HashSet<CellId>) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let before = self.cells.len();
        for id in ids {
            self.slots.remove(*id);
        }
        self.cells.retain(|cell| !ids.contains(&cell.id));
        for (index, cell) in self.cells.iter().enumerate() {
            if let Some(slot) = self.slots.get_mut(cell.id) {
                *slot = index;
            }
        }
        before - self.cells.len()
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.slots.contains_key(id)
    }

    pub fn index_of(&self, id: CellId) -> Option<usize> {
        self.slots.get(id).copied()
    }

    pub fn get(&self, id: CellId) -> Option<&Cell> {
        self.index_of(id).map(|i| &self.cells[i])
    }

    pub fn get_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        let index = self.index_of(id)?;
        self.cells.get_mut(index)
    }

    /// Two distinct cells mutably at once
    pub fn pair_mut(&mut self, a: CellId, b: CellId) -> Option<(&mut Cell, &mut Cell)> {
        let i = self.index_of(a)?;
        let j = self.index_of(b)?;
        if i == j {
            return None;
        }
        if i < j {
            let (left, right) = self.cells.split_at_mut(j);
            Some((&mut left[i], &mut right[0]))
        } else {
            let (left, right) = self.cells.split_at_mut(i);
            Some((&mut right[0], &mut left[j]))
        }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    pub fn ids(&self) -> impl Iterator<Item = CellId> + '_ {
        self.cells.iter().map(|c| c.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> + '_ {
        self.cells.iter()
    }

    /// Read-only snapshot of every cell plus mutable access for the pass
    pub fn split_for_pass(&mut self) -> (PopulationView<'_>, &mut [Cell]) {
        let view = PopulationView {
            slots: &self.slots,
            cells: self.cells.iter().map(CellView::from).collect(),
        };
        (view, &mut self.cells)
    }

    pub fn view(&self) -> PopulationView<'_> {
        PopulationView {
            slots: &self.slots,
            cells: self.cells.iter().map(CellView::from).collect(),
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.cells.clear();
    }
}

/// What a rule may know about another cell during the pass
#[derive(Debug, Clone)]
pub struct CellView {
    pub id: CellId,
    pub type_index: usize,
    pub position: DVec3,
    pub radius: f64,
    pub dead: bool,
    pub custom_data: CustomData,
}

impl From<&Cell> for CellView {
    fn from(cell: &Cell) -> Self {
        Self {
            id: cell.id,
            type_index: cell.type_index,
            position: cell.position,
            radius: cell.radius(),
            dead: cell.is_dead(),
            custom_data: cell.custom_data.clone(),
        }
    }
}

/// Start-of-pass snapshot of the population, indexed like the arena
#[derive(Debug)]
pub struct PopulationView<'a> {
    slots: &'a SlotMap<CellId, usize>,
    cells: Vec<CellView>,
}

impl PopulationView<'_> {
    pub fn get(&self, id: CellId) -> Option<&CellView> {
        self.slots.get(id).and_then(|i| self.cells.get(*i))
    }

    /// By dense index (as returned by neighbor queries)
    pub fn at(&self, index: usize) -> Option<&CellView> {
        self.cells.get(index)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellView> + '_ {
        self.cells.iter()
    }

    pub fn positions(&self) -> Vec<DVec3> {
        self.cells.iter().map(|c| c.position).collect()
    }
}
