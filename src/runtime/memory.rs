use super::runtime_error::Fault;

/// One machine word. Cells handed out by the allocator start uninitialized so
/// reads before writes can be caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Uninitialized,
    Value(i64),
}

/// Flat word-addressed memory with a bump allocator growing from the heap
/// base. Nothing is ever freed.
#[derive(Debug, Clone)]
pub struct Memory {
    cells: Vec<Cell>,
    heap_ptr: i64,
}

impl Memory {
    pub fn new(size: usize, heap_base: i64) -> Self {
        Self {
            cells: vec![Cell::Value(0); size],
            heap_ptr: heap_base,
        }
    }

    pub fn size(&self) -> usize {
        self.cells.len()
    }

    pub fn heap_ptr(&self) -> i64 {
        self.heap_ptr
    }

    fn index(&self, addr: i64) -> Result<usize, Fault> {
        usize::try_from(addr)
            .ok()
            .filter(|&i| i < self.cells.len())
            .ok_or(Fault::AddressOutOfBounds(addr))
    }

    pub fn cell(&self, addr: i64) -> Result<Cell, Fault> {
        Ok(self.cells[self.index(addr)?])
    }

    pub fn read(&self, addr: i64) -> Result<i64, Fault> {
        match self.cell(addr)? {
            Cell::Value(v) => Ok(v),
            Cell::Uninitialized => Err(Fault::UninitializedRead(addr)),
        }
    }

    pub fn write(&mut self, addr: i64, value: i64) -> Result<(), Fault> {
        let i = self.index(addr)?;
        self.cells[i] = Cell::Value(value);
        Ok(())
    }

    /// Reserve `size` uninitialized cells and return the first address.
    pub fn alloc(&mut self, size: i64) -> Result<i64, Fault> {
        if size < 0 {
            return Err(Fault::NegativeAllocation(size));
        }
        let start = self.heap_ptr;
        let end = start
            .checked_add(size)
            .filter(|&end| end <= self.cells.len() as i64)
            .ok_or(Fault::OutOfMemory { requested: size })?;
        for addr in start..end {
            let i = self.index(addr)?;
            self.cells[i] = Cell::Uninitialized;
        }
        self.heap_ptr = end;
        Ok(start)
    }

    /// Allocate a NUL-terminated run of character codes.
    pub fn alloc_string(&mut self, text: &str) -> Result<i64, Fault> {
        let codes: Vec<i64> = text.chars().map(|c| c as i64).collect();
        let ptr = self.alloc(codes.len() as i64 + 1)?;
        for (offset, code) in codes.iter().enumerate() {
            self.write(ptr + offset as i64, *code)?;
        }
        self.write(ptr + codes.len() as i64, 0)?;
        Ok(ptr)
    }

    /// Characters from `ptr` up to the terminating NUL. An uninitialized
    /// cell also ends the string.
    pub fn read_string(&self, ptr: i64) -> Result<String, Fault> {
        let mut out = String::new();
        let mut addr = ptr;
        loop {
            match self.cell(addr)? {
                Cell::Value(0) | Cell::Uninitialized => return Ok(out),
                Cell::Value(code) => {
                    let c = u32::try_from(code)
                        .ok()
                        .and_then(char::from_u32)
                        .unwrap_or(char::REPLACEMENT_CHARACTER);
                    out.push(c);
                }
            }
            addr += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_marks_cells_uninitialized() {
        let mut mem = Memory::new(100, 50);
        let ptr = mem.alloc(3).unwrap();
        assert_eq!(ptr, 50);
        assert_eq!(mem.heap_ptr(), 53);
        assert_eq!(mem.read(51), Err(Fault::UninitializedRead(51)));
        mem.write(51, 7).unwrap();
        assert_eq!(mem.read(51), Ok(7));
        assert_eq!(mem.read(10), Ok(0));
    }

    #[test]
    fn test_out_of_bounds() {
        let mut mem = Memory::new(10, 5);
        assert_eq!(mem.read(10), Err(Fault::AddressOutOfBounds(10)));
        assert_eq!(mem.write(-1, 0), Err(Fault::AddressOutOfBounds(-1)));
    }

    #[test]
    fn test_heap_exhaustion() {
        let mut mem = Memory::new(10, 5);
        assert!(mem.alloc(5).is_ok());
        assert_eq!(mem.alloc(1), Err(Fault::OutOfMemory { requested: 1 }));
        assert_eq!(mem.alloc(-2), Err(Fault::NegativeAllocation(-2)));
    }

    #[test]
    fn test_strings() {
        let mut mem = Memory::new(100, 10);
        let ptr = mem.alloc_string("héllo").unwrap();
        assert_eq!(mem.read(ptr + 5), Ok(0));
        assert_eq!(mem.read_string(ptr).unwrap(), "héllo");
    }
}
