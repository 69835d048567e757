//! Code Memory - anonymous memory backing a code heap
//!
//! Each active partition reserves one anonymous mapping through memmap2.
//! The mapping length is rounded up to the system page size. A zero-sized
//! partition reserves nothing.

use memmap2::{MmapMut, MmapOptions};

use crate::error::{JBoltError, Result};

pub struct CodeMemory {
    mmap: Option<MmapMut>,
    base: usize,
    size: usize,
}

impl CodeMemory {
    /// Reserve `size` bytes, rounded up to a page boundary
    pub fn anonymous(size: usize) -> Result<Self> {
        if size == 0 {
            return Ok(Self {
                mmap: None,
                base: 0,
                size: 0,
            });
        }

        let aligned_size = align_to_page(size);
        let mmap = MmapOptions::new()
            .len(aligned_size)
            .map_anon()
            .map_err(|e| {
                JBoltError::Internal(format!("Failed to reserve code memory: {}", e))
            })?;
        let base = mmap.as_ptr() as usize;

        Ok(Self {
            mmap: Some(mmap),
            base,
            size: aligned_size,
        })
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let size = self.size;
        let mmap = self
            .mmap
            .as_mut()
            .ok_or_else(|| JBoltError::Internal("write to empty code memory".to_string()))?;
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= size)
            .ok_or_else(|| {
                JBoltError::Internal(format!(
                    "code write out of bounds: offset={}, len={}, size={}",
                    offset,
                    bytes.len(),
                    size
                ))
            })?;
        mmap[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let mmap = self.mmap.as_ref()?;
        let end = offset.checked_add(len)?;
        mmap.get(offset..end)
    }
}

/// Round up to the system page size
pub fn align_to_page(size: usize) -> usize {
    let ps = page_size::get();
    (size + ps - 1) & !(ps - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_rounds_to_page() {
        let memory = CodeMemory::anonymous(100).unwrap();
        assert_eq!(memory.size(), page_size::get());
        assert_ne!(memory.base(), 0);
    }

    #[test]
    fn test_write_and_read() {
        let mut memory = CodeMemory::anonymous(4096).unwrap();
        memory.write(16, &[1, 2, 3, 4]).unwrap();
        assert_eq!(memory.read(16, 4), Some(&[1u8, 2, 3, 4][..]));
        assert!(memory.write(memory.size() - 1, &[0, 0]).is_err());
    }

    #[test]
    fn test_zero_sized() {
        let mut memory = CodeMemory::anonymous(0).unwrap();
        assert_eq!(memory.size(), 0);
        assert!(memory.read(0, 1).is_none());
        assert!(memory.write(0, &[1]).is_err());
    }
}
