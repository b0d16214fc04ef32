//! Append-only heap arena.
//!
//! Addresses are cell indices handed out by a bump pointer and never
//! reclaimed. When an allocation does not fit, the backing store doubles
//! (repeatedly, if needed) and the old cells are copied to the same
//! indices, so addresses stay valid across growth.
use crate::value::Value;

#[derive(Debug, Clone, Copy)]
pub struct HeapCreateInfo {
    /// Initial number of cells.
    pub capacity: usize,
}

impl Default for HeapCreateInfo {
    fn default() -> Self {
        Self { capacity: 16 }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum HeapError {
    #[error("heap address {address} is outside the allocated range 0..{top}")]
    OutOfRange { address: usize, top: usize },
    #[error("heap cell {0} is read before it was written")]
    Uninitialised(usize),
    #[error("heap cell {0} does not hold a character code")]
    NotACharacter(usize),
}

#[derive(Debug, Clone)]
pub struct Heap {
    cells: Vec<Option<Value>>,
    top: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(HeapCreateInfo::default())
    }
}

impl Heap {
    pub fn new(info: HeapCreateInfo) -> Self {
        Self {
            cells: vec![None; info.capacity.max(1)],
            top: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// First unallocated address.
    pub fn top(&self) -> usize {
        self.top
    }

    /// Reserve `size` consecutive cells and return the first address.
    pub fn allocate(&mut self, size: usize) -> usize {
        let address = self.top;
        let needed = self.top + size;
        if needed > self.cells.len() {
            self.grow(needed);
        }
        self.top = needed;
        address
    }

    fn grow(&mut self, needed: usize) {
        let mut capacity = self.cells.len().max(1);
        while capacity < needed {
            capacity *= 2;
        }
        log::debug!("heap grows from {} to {capacity} cells", self.cells.len());
        let mut cells = vec![None; capacity];
        cells[..self.cells.len()].copy_from_slice(&self.cells);
        self.cells = cells;
    }

    fn check(&self, address: usize) -> Result<(), HeapError> {
        if address >= self.top {
            return Err(HeapError::OutOfRange {
                address,
                top: self.top,
            });
        }
        Ok(())
    }

    pub fn load(&self, address: usize) -> Result<Value, HeapError> {
        self.check(address)?;
        self.cells[address].ok_or(HeapError::Uninitialised(address))
    }

    pub fn store(&mut self, address: usize, value: Value) -> Result<(), HeapError> {
        self.check(address)?;
        self.cells[address] = Some(value);
        Ok(())
    }

    /// Store `text` as its length followed by one character code per cell.
    pub fn allocate_symbol(&mut self, text: &str) -> usize {
        let chars: Vec<char> = text.chars().collect();
        let address = self.allocate(chars.len() + 1);
        self.cells[address] = Some(Value::Int(chars.len() as i64));
        for (i, c) in chars.into_iter().enumerate() {
            self.cells[address + 1 + i] = Some(Value::Int(c as i64));
        }
        address
    }

    /// Decode a symbol written by [`Heap::allocate_symbol`].
    pub fn symbol(&self, address: usize) -> Result<String, HeapError> {
        let len = match self.load(address)? {
            Value::Int(n) if n >= 0 => n as usize,
            _ => return Err(HeapError::NotACharacter(address)),
        };
        (address + 1..address + 1 + len)
            .map(|cell| match self.load(cell)? {
                Value::Int(code) => u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or(HeapError::NotACharacter(cell)),
                _ => Err(HeapError::NotACharacter(cell)),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn allocation_bumps() {
        let mut heap = Heap::new(HeapCreateInfo { capacity: 4 });
        assert_eq!(heap.allocate(2), 0);
        assert_eq!(heap.allocate(1), 2);
        assert_eq!(heap.top(), 3);
        assert_eq!(heap.capacity(), 4);
    }

    #[test]
    fn growth_doubles_and_keeps_addresses() {
        let mut heap = Heap::new(HeapCreateInfo { capacity: 2 });
        let a = heap.allocate(2);
        heap.store(a, Value::Int(10)).unwrap();
        heap.store(a + 1, Value::Real(0.5)).unwrap();
        let b = heap.allocate(1);
        assert_eq!(heap.capacity(), 4);
        heap.store(b, Value::Int(30)).unwrap();
        heap.allocate(9);
        assert_eq!(heap.capacity(), 16);
        assert_eq!(heap.load(a), Ok(Value::Int(10)));
        assert_eq!(heap.load(a + 1), Ok(Value::Real(0.5)));
        assert_eq!(heap.load(b), Ok(Value::Int(30)));
    }

    #[test]
    fn reads_are_bounds_checked() {
        let mut heap = Heap::default();
        let a = heap.allocate(1);
        assert_eq!(heap.load(a), Err(HeapError::Uninitialised(0)));
        assert_eq!(
            heap.load(5),
            Err(HeapError::OutOfRange { address: 5, top: 1 })
        );
        assert!(heap.store(1, Value::Null).is_err());
    }

    #[test]
    fn symbols_round_trip() {
        let mut heap = Heap::default();
        let addr = heap.allocate_symbol("héllo");
        assert_eq!(heap.load(addr), Ok(Value::Int(5)));
        assert_eq!(heap.load(addr + 1), Ok(Value::Int('h' as i64)));
        assert_eq!(heap.symbol(addr).as_deref(), Ok("héllo"));
        let empty = heap.allocate_symbol("");
        assert_eq!(heap.symbol(empty).as_deref(), Ok(""));
    }

    proptest! {
        #[test]
        fn growth_preserves_every_written_cell(
            sizes in proptest::collection::vec(1usize..20, 1..30),
            capacity in 1usize..8,
        ) {
            let mut heap = Heap::new(HeapCreateInfo { capacity });
            let mut written = Vec::new();
            for (n, size) in sizes.into_iter().enumerate() {
                let addr = heap.allocate(size);
                heap.store(addr, Value::Int(n as i64)).unwrap();
                written.push(addr);
                prop_assert!(heap.capacity() >= heap.top());
            }
            for (n, addr) in written.into_iter().enumerate() {
                prop_assert_eq!(heap.load(addr), Ok(Value::Int(n as i64)));
            }
        }
    }
}
