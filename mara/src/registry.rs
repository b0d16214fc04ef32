//! Register allocation for the compiler.
//!
//! Registers are never reused within a compilation: the [`Registry`]
//! only counts up. A [`RegistryFrame`] gives one syntactic node a small
//! private bank: logical slot `i` maps to a fresh register the first time
//! it is asked for and to the same register afterwards.
use std::collections::HashMap;
use std::ops::Range;

use crate::bytecode::{RETURN_REG, Reg};

#[derive(Debug, Clone)]
pub struct Registry {
    next: Reg,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Register 0 is the shared return slot and is never handed out.
    pub fn new() -> Self {
        Self {
            next: RETURN_REG + 1,
        }
    }

    pub fn next(&mut self) -> Reg {
        let reg = self.next;
        self.next += 1;
        reg
    }

    /// The register the next call to [`Registry::next`] will return.
    pub fn mark(&self) -> Reg {
        self.next
    }

    /// Registers handed out since `mark`.
    pub fn since(&self, mark: Reg) -> Range<Reg> {
        mark..self.next
    }

    pub fn frame(&self) -> RegistryFrame {
        RegistryFrame::default()
    }
}

#[derive(Debug, Default, Clone)]
pub struct RegistryFrame {
    slots: HashMap<usize, Reg>,
}

impl RegistryFrame {
    pub fn get(&mut self, registry: &mut Registry, slot: usize) -> Reg {
        *self.slots.entry(slot).or_insert_with(|| registry.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_start_after_the_return_slot() {
        let mut registry = Registry::new();
        assert_eq!(registry.next(), 1);
        assert_eq!(registry.next(), 2);
    }

    #[test]
    fn frame_slots_are_lazy_and_stable() {
        let mut registry = Registry::new();
        let mut a = registry.frame();
        let mut b = registry.frame();
        assert_eq!(a.get(&mut registry, 1), 1);
        assert_eq!(b.get(&mut registry, 0), 2);
        assert_eq!(a.get(&mut registry, 0), 3);
        assert_eq!(a.get(&mut registry, 1), 1);
        assert_eq!(b.get(&mut registry, 0), 2);
    }

    #[test]
    fn since_covers_new_registers() {
        let mut registry = Registry::new();
        registry.next();
        let mark = registry.mark();
        registry.next();
        registry.next();
        assert_eq!(registry.since(mark), 2..4);
    }
}
