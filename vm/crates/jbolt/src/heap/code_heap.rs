//! Code heaps and the segmented code cache
//!
//! A `CodeHeap` is a first-fit allocator over one partition's memory. Sizes
//! are padded to `CODE_CACHE_SEGMENT_SIZE`. Freed ranges are coalesced with
//! their neighbours.
//!
//! `CodeCache` owns one heap per active partition and applies the overflow
//! relation when a partition is full.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{JBoltError, Result};
use crate::heap::mapping::CodeMemory;
use crate::heap::registry::CodeHeapRegistry;
use crate::heap::{align_down, padded_size, CodeHeapKind, CODE_CACHE_SEGMENT_SIZE};
use crate::logging::{JBoltEvent, JBoltLogger};
use crate::method::MethodKey;

/// A method's machine code inside a code heap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlob {
    pub method: MethodKey,
    pub kind: CodeHeapKind,
    pub address: usize,
    /// Code length in bytes
    pub size: usize,
    /// Bytes reserved in the heap
    pub padded_size: usize,
}

pub struct CodeHeap {
    kind: CodeHeapKind,
    capacity: usize,
    memory: CodeMemory,
    /// offset -> length
    free: BTreeMap<usize, usize>,
    /// offset -> blob
    blobs: BTreeMap<usize, CodeBlob>,
    used: usize,
}

impl CodeHeap {
    pub fn new(kind: CodeHeapKind, capacity: usize) -> Result<Self> {
        let capacity = align_down(capacity, CODE_CACHE_SEGMENT_SIZE);
        let memory = CodeMemory::anonymous(capacity)?;
        let mut free = BTreeMap::new();
        if capacity > 0 {
            free.insert(0, capacity);
        }

        Ok(Self {
            kind,
            capacity,
            memory,
            free,
            blobs: BTreeMap::new(),
            used: 0,
        })
    }

    pub fn kind(&self) -> CodeHeapKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Padded bytes in use
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn free_bytes(&self) -> usize {
        self.capacity - self.used
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    pub fn contains(&self, address: usize) -> bool {
        address >= self.memory.base() && address < self.memory.base() + self.capacity
    }

    /// Largest contiguous free range
    pub fn largest_free(&self) -> usize {
        self.free.values().copied().max().unwrap_or(0)
    }

    /// Copy `code` into the first free range that fits
    pub fn allocate(&mut self, method: &MethodKey, code: &[u8]) -> Result<CodeBlob> {
        let padded = padded_size(code.len());
        let found = self
            .free
            .iter()
            .find(|(_, len)| **len >= padded)
            .map(|(offset, len)| (*offset, *len));

        let (offset, len) = found.ok_or(JBoltError::CodeCacheFull {
            kind: self.kind,
            requested: padded,
        })?;

        self.free.remove(&offset);
        if len > padded {
            self.free.insert(offset + padded, len - padded);
        }
        self.memory.write(offset, code)?;

        let blob = CodeBlob {
            method: method.clone(),
            kind: self.kind,
            address: self.memory.base() + offset,
            size: code.len(),
            padded_size: padded,
        };
        self.blobs.insert(offset, blob.clone());
        self.used += padded;
        Ok(blob)
    }

    /// Release a blob and coalesce its range
    pub fn free(&mut self, address: usize) -> Result<CodeBlob> {
        let offset = address.wrapping_sub(self.memory.base());
        let blob = self.blobs.remove(&offset).ok_or_else(|| {
            JBoltError::Internal(format!("{:#x} is not a blob in {}", address, self.kind))
        })?;
        self.used -= blob.padded_size;

        let mut start = offset;
        let mut len = blob.padded_size;

        if let Some((&prev_offset, &prev_len)) = self.free.range(..offset).next_back() {
            if prev_offset + prev_len == offset {
                self.free.remove(&prev_offset);
                start = prev_offset;
                len += prev_len;
            }
        }
        if let Some(next_len) = self.free.remove(&(offset + blob.padded_size)) {
            len += next_len;
        }
        self.free.insert(start, len);

        Ok(blob)
    }

    pub fn blob(&self, address: usize) -> Option<&CodeBlob> {
        self.blobs.get(&address.wrapping_sub(self.memory.base()))
    }

    pub fn code(&self, address: usize) -> Option<&[u8]> {
        let blob = self.blob(address)?;
        self.memory
            .read(address - self.memory.base(), blob.size)
    }

    /// Blobs in address order
    pub fn blobs(&self) -> impl Iterator<Item = &CodeBlob> {
        self.blobs.values()
    }
}

/// Usage of one partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapUsage {
    pub kind: CodeHeapKind,
    pub capacity: usize,
    pub used: usize,
    pub blobs: usize,
}

/// The segmented code cache
pub struct CodeCache {
    registry: Arc<CodeHeapRegistry>,
    heaps: BTreeMap<CodeHeapKind, Mutex<CodeHeap>>,
    logger: Arc<JBoltLogger>,
}

impl CodeCache {
    /// Reserve one heap per active partition
    pub fn new(registry: Arc<CodeHeapRegistry>, logger: Arc<JBoltLogger>) -> Result<Self> {
        let mut heaps = BTreeMap::new();
        for kind in registry.active().iter() {
            let heap = CodeHeap::new(kind, registry.capacity(kind))?;
            heaps.insert(kind, Mutex::new(heap));
        }

        Ok(Self {
            registry,
            heaps,
            logger,
        })
    }

    pub fn registry(&self) -> &Arc<CodeHeapRegistry> {
        &self.registry
    }

    fn heap(&self, kind: CodeHeapKind) -> Result<&Mutex<CodeHeap>> {
        self.heaps
            .get(&kind)
            .ok_or(JBoltError::InactivePartition(kind))
    }

    /// Allocate in `kind` only
    pub fn allocate_exact(
        &self,
        kind: CodeHeapKind,
        method: &MethodKey,
        code: &[u8],
    ) -> Result<CodeBlob> {
        self.heap(kind)?.lock().allocate(method, code)
    }

    /// Allocate in `kind`, then in each active overflow target
    pub fn allocate(&self, kind: CodeHeapKind, method: &MethodKey, code: &[u8]) -> Result<CodeBlob> {
        self.allocate_in_order(&self.registry.allocation_order(kind), kind, method, code)
    }

    /// Allocate following `order`, reporting `requested_kind` on failure
    pub fn allocate_in_order(
        &self,
        order: &[CodeHeapKind],
        requested_kind: CodeHeapKind,
        method: &MethodKey,
        code: &[u8],
    ) -> Result<CodeBlob> {
        if order.is_empty() {
            return Err(JBoltError::InactivePartition(requested_kind));
        }
        for kind in order {
            match self.allocate_exact(*kind, method, code) {
                Ok(blob) => return Ok(blob),
                Err(JBoltError::CodeCacheFull { .. }) => {
                    self.logger.log(JBoltEvent::HeapFull { kind: *kind });
                }
                Err(e) => return Err(e),
            }
        }
        Err(JBoltError::CodeCacheFull {
            kind: requested_kind,
            requested: padded_size(code.len()),
        })
    }

    pub fn free(&self, blob: &CodeBlob) -> Result<CodeBlob> {
        self.heap(blob.kind)?.lock().free(blob.address)
    }

    /// Copy of the code bytes of a blob
    pub fn code(&self, blob: &CodeBlob) -> Option<Vec<u8>> {
        let heap = self.heap(blob.kind).ok()?.lock();
        heap.code(blob.address).map(<[u8]>::to_vec)
    }

    /// Partition holding `address`
    pub fn kind_of(&self, address: usize) -> Option<CodeHeapKind> {
        self.heaps
            .iter()
            .find(|(_, heap)| heap.lock().blob(address).is_some())
            .map(|(kind, _)| *kind)
    }

    pub fn usage(&self, kind: CodeHeapKind) -> Option<HeapUsage> {
        let heap = self.heaps.get(&kind)?.lock();
        Some(HeapUsage {
            kind,
            capacity: heap.capacity(),
            used: heap.used(),
            blobs: heap.blob_count(),
        })
    }

    /// Methods in a partition, in address order
    pub fn methods_in(&self, kind: CodeHeapKind) -> Vec<MethodKey> {
        match self.heaps.get(&kind) {
            Some(heap) => heap.lock().blobs().map(|blob| blob.method.clone()).collect(),
            None => Vec::new(),
        }
    }

    pub fn largest_free(&self, kind: CodeHeapKind) -> usize {
        self.heaps
            .get(&kind)
            .map(|heap| heap.lock().largest_free())
            .unwrap_or(0)
    }
}
