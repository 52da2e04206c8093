//! Generational arena backing a registry.
//!
//! Every occupied slot holds the instance together with its reference count,
//! so "present in the table" and "count >= 1" are the same fact. Freed slots
//! go on a LIFO free list with their generation bumped. A slot whose
//! generation has reached `u32::MAX` is retired instead: it stays vacant
//! forever, so a generation is never handed out twice for the same slot.

use std::mem;

pub(crate) struct Entry<T> {
    pub(crate) generation: u32,
    pub(crate) refs: u32,
    pub(crate) value: T,
}

enum Slot<T> {
    Occupied(Entry<T>),
    Vacant { generation: u32 },
}

pub(crate) struct Slab<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    max_slots: usize,
}

impl<T> Slab<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
            max_slots: u32::MAX as usize,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_max_slots(max_slots: u32) -> Self {
        Self {
            max_slots: max_slots as usize,
            ..Self::with_capacity(0)
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Stores `value` with a count of 1. Returns `(slot, generation)`, or
    /// hands `value` back when every slot index is in use or retired.
    pub(crate) fn insert(&mut self, value: T) -> Result<(u32, u32), T> {
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            let generation = match entry {
                Slot::Vacant { generation } => *generation,
                Slot::Occupied(_) => unreachable!("free list points at occupied slot {slot}"),
            };
            *entry = Slot::Occupied(Entry {
                generation,
                refs: 1,
                value,
            });
            self.len += 1;
            return Ok((slot, generation));
        }

        if self.slots.len() >= self.max_slots {
            return Err(value);
        }
        let Ok(slot) = u32::try_from(self.slots.len()) else {
            return Err(value);
        };
        self.slots.push(Slot::Occupied(Entry {
            generation: 0,
            refs: 1,
            value,
        }));
        self.len += 1;
        Ok((slot, 0))
    }

    pub(crate) fn get(&self, slot: u32, generation: u32) -> Option<&Entry<T>> {
        match self.slots.get(slot as usize)? {
            Slot::Occupied(entry) if entry.generation == generation => Some(entry),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, slot: u32, generation: u32) -> Option<&mut Entry<T>> {
        match self.slots.get_mut(slot as usize)? {
            Slot::Occupied(entry) if entry.generation == generation => Some(entry),
            _ => None,
        }
    }

    /// Frees an occupied slot and hands back its value.
    pub(crate) fn remove(&mut self, slot: u32, generation: u32) -> Option<T> {
        let cell = self.slots.get_mut(slot as usize)?;
        match cell {
            Slot::Occupied(entry) if entry.generation == generation => {}
            _ => return None,
        }
        let next = generation.checked_add(1);
        let vacant = Slot::Vacant {
            generation: next.unwrap_or(generation),
        };
        let Slot::Occupied(entry) = mem::replace(cell, vacant) else {
            return None;
        };
        // Retired slots never go back on the free list.
        if next.is_some() {
            self.free.push(slot);
        }
        self.len -= 1;
        Some(entry.value)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (u32, &Entry<T>)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, cell)| match cell {
                Slot::Occupied(entry) => Some((slot as u32, entry)),
                Slot::Vacant { .. } => None,
            })
    }

    /// Empties the slab, yielding every occupied entry.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = (u32, Entry<T>)> + '_ {
        self.free.clear();
        self.len = 0;
        self.slots
            .drain(..)
            .enumerate()
            .filter_map(|(slot, cell)| match cell {
                Slot::Occupied(entry) => Some((slot as u32, entry)),
                Slot::Vacant { .. } => None,
            })
    }
}
