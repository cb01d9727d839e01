//! Heap descriptors and pool configuration
//!
//! A `HeapPoolConfig` is the ordered, immutable table of heaps the driver tries
//! to bring up. Each `HeapDescriptor` names a heap kind; the kind decides which
//! of the optional fields (size, alignment, base) have to be present.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::{IonError, Result};

/// Heap identifier, unique within one pool
pub type HeapId = u32;

/// Physical address
pub type PhysAddr = usize;

pub const SZ_16K: usize = 16 * 1024;
pub const SZ_4M: usize = 4 * 1024 * 1024;

/// Heap kind, selects the backend strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HeapKind {
    /// Page allocator, non-contiguous
    System,
    /// Page allocator, physically contiguous
    SystemContig,
    /// Fixed pre-reserved region
    Carveout,
    /// Fixed pre-reserved region split into equal chunks
    Chunk,
    /// Contiguous memory allocator region
    Dma,
}

impl HeapKind {
    /// All kinds, in type-id order
    pub const ALL: [HeapKind; 5] = [
        HeapKind::System,
        HeapKind::SystemContig,
        HeapKind::Carveout,
        HeapKind::Chunk,
        HeapKind::Dma,
    ];

    /// Heap type number of this kind
    pub const fn type_id(self) -> u32 {
        match self {
            HeapKind::System => 0,
            HeapKind::SystemContig => 1,
            HeapKind::Carveout => 2,
            HeapKind::Chunk => 3,
            HeapKind::Dma => 4,
        }
    }

    /// Kinds backed by a fixed region need a base address to be usable
    pub const fn requires_base(self) -> bool {
        matches!(self, HeapKind::Carveout | HeapKind::Chunk)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            HeapKind::System => "system",
            HeapKind::SystemContig => "system-contig",
            HeapKind::Carveout => "carveout",
            HeapKind::Chunk => "chunk",
            HeapKind::Dma => "dma",
        }
    }
}

impl fmt::Display for HeapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static configuration for one heap
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeapDescriptor {
    /// Stable identity, used for external addressing
    pub id: HeapId,

    /// Backend strategy
    pub kind: HeapKind,

    /// Human-readable label
    pub name: String,

    /// Region size in bytes (Carveout and Chunk only)
    pub size: usize,

    /// Region alignment in bytes (Chunk only)
    pub align: usize,

    /// Pre-assigned physical base of the region
    pub base: Option<PhysAddr>,

    /// Opaque word handed to the backend unmodified
    pub private: Option<usize>,
}

impl HeapDescriptor {
    pub fn new(id: HeapId, kind: HeapKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            size: 0,
            align: 0,
            base: None,
            private: None,
        }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_align(mut self, align: usize) -> Self {
        self.align = align;
        self
    }

    pub fn with_base(mut self, base: PhysAddr) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_private(mut self, private: usize) -> Self {
        self.private = Some(private);
        self
    }

    /// `false` when the heap has no region on this platform and must be skipped
    pub fn is_provisioned(&self) -> bool {
        !self.kind.requires_base() || self.base.is_some()
    }

    /// Check the fields the kind requires
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason| IonError::InvalidDescriptor { id: self.id, reason };

        match self.kind {
            HeapKind::Carveout => {
                if self.size == 0 {
                    return Err(invalid("carveout heap needs a non-zero size"));
                }
            }
            HeapKind::Chunk => {
                if self.size == 0 {
                    return Err(invalid("chunk heap needs a non-zero size"));
                }
                if !self.align.is_power_of_two() {
                    return Err(invalid("chunk heap needs a power-of-two alignment"));
                }
            }
            HeapKind::System | HeapKind::SystemContig | HeapKind::Dma => {}
        }

        if self.align != 0 && !self.align.is_power_of_two() {
            return Err(invalid("alignment must be a power of two"));
        }

        if let Some(base) = self.base {
            if self.align != 0 && base % self.align != 0 {
                return Err(invalid("base is not aligned"));
            }
        }

        Ok(())
    }
}

/// Ordered heap table, immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "Vec<HeapDescriptor>", into = "Vec<HeapDescriptor>")
)]
pub struct HeapPoolConfig {
    heaps: Vec<HeapDescriptor>,
}

impl HeapPoolConfig {
    /// Build a configuration, checking id uniqueness and per-kind fields
    pub fn new(heaps: Vec<HeapDescriptor>) -> Result<Self> {
        for (i, heap) in heaps.iter().enumerate() {
            heap.validate()?;
            if heaps[..i].iter().any(|h| h.id == heap.id) {
                return Err(IonError::DuplicateHeapId(heap.id));
            }
        }

        Ok(Self { heaps })
    }

    /// The compiled-in start-of-day table
    ///
    /// Carveout and chunk entries carry no base, so they are skipped unless the
    /// platform provisions a region for them.
    pub fn default_heaps() -> Self {
        Self {
            heaps: default_descriptors(),
        }
    }

    pub fn descriptors(&self) -> &[HeapDescriptor] {
        &self.heaps
    }

    pub fn iter(&self) -> core::slice::Iter<'_, HeapDescriptor> {
        self.heaps.iter()
    }

    pub fn get(&self, id: HeapId) -> Option<&HeapDescriptor> {
        self.heaps.iter().find(|h| h.id == id)
    }

    pub fn len(&self) -> usize {
        self.heaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heaps.is_empty()
    }

    /// Number of descriptors that will not be skipped for a missing base
    pub fn provisioned_count(&self) -> usize {
        self.heaps.iter().filter(|h| h.is_provisioned()).count()
    }
}

impl TryFrom<Vec<HeapDescriptor>> for HeapPoolConfig {
    type Error = IonError;

    fn try_from(heaps: Vec<HeapDescriptor>) -> Result<Self> {
        Self::new(heaps)
    }
}

impl From<HeapPoolConfig> for Vec<HeapDescriptor> {
    fn from(config: HeapPoolConfig) -> Self {
        config.heaps
    }
}

impl<'a> IntoIterator for &'a HeapPoolConfig {
    type Item = &'a HeapDescriptor;
    type IntoIter = core::slice::Iter<'a, HeapDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.heaps.iter()
    }
}

/// Reference table: system, system-contig, carveout 4M, chunk 4M/16K
pub fn default_descriptors() -> Vec<HeapDescriptor> {
    alloc::vec![
        HeapDescriptor::new(HeapKind::System.type_id(), HeapKind::System, "system-heap"),
        HeapDescriptor::new(
            HeapKind::SystemContig.type_id(),
            HeapKind::SystemContig,
            "system-contig-heap",
        ),
        HeapDescriptor::new(HeapKind::Carveout.type_id(), HeapKind::Carveout, "carveout")
            .with_size(SZ_4M),
        HeapDescriptor::new(HeapKind::Chunk.type_id(), HeapKind::Chunk, "chunk")
            .with_size(SZ_4M)
            .with_align(SZ_16K)
            .with_private(SZ_16K),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_default_table() {
        let config = HeapPoolConfig::default_heaps();
        assert_eq!(config.len(), 4);

        let kinds: Vec<_> = config.iter().map(|h| h.kind).collect();
        assert_eq!(
            kinds,
            [HeapKind::System, HeapKind::SystemContig, HeapKind::Carveout, HeapKind::Chunk]
        );

        let chunk = config.get(3).unwrap();
        assert_eq!(chunk.size, SZ_4M);
        assert_eq!(chunk.align, SZ_16K);
        assert_eq!(chunk.private, Some(SZ_16K));

        // Defaults have no bases, only the on-demand heaps are provisioned
        assert_eq!(config.provisioned_count(), 2);

        // The compiled-in table passes its own validation
        assert_eq!(HeapPoolConfig::new(default_descriptors()).unwrap(), config);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let result = HeapPoolConfig::new(vec![
            HeapDescriptor::new(7, HeapKind::System, "a"),
            HeapDescriptor::new(7, HeapKind::SystemContig, "b"),
        ]);
        assert_eq!(result, Err(IonError::DuplicateHeapId(7)));
    }

    #[test]
    fn test_kind_required_fields() {
        let carveout = HeapDescriptor::new(2, HeapKind::Carveout, "carveout");
        assert!(matches!(
            carveout.validate(),
            Err(IonError::InvalidDescriptor { id: 2, .. })
        ));

        let chunk = HeapDescriptor::new(3, HeapKind::Chunk, "chunk").with_size(SZ_4M);
        assert!(chunk.validate().is_err());
        assert!(chunk.clone().with_align(SZ_16K).validate().is_ok());
        assert!(chunk.with_align(3).validate().is_err());

        // On-demand kinds need nothing
        assert!(HeapDescriptor::new(0, HeapKind::System, "system").validate().is_ok());
    }

    #[test]
    fn test_misaligned_base_rejected() {
        let chunk = HeapDescriptor::new(3, HeapKind::Chunk, "chunk")
            .with_size(SZ_4M)
            .with_align(SZ_16K)
            .with_base(0x4000_1000);
        assert!(chunk.validate().is_err());
    }

    #[test]
    fn test_provisioned_needs_base() {
        let carveout = HeapDescriptor::new(2, HeapKind::Carveout, "carveout").with_size(SZ_4M);
        assert!(!carveout.is_provisioned());
        assert!(carveout.with_base(0x8000_0000).is_provisioned());

        assert!(HeapDescriptor::new(4, HeapKind::Dma, "dma").is_provisioned());
    }

    #[test]
    fn test_kind_type_ids() {
        for (i, kind) in HeapKind::ALL.iter().enumerate() {
            assert_eq!(kind.type_id() as usize, i);
        }
        assert_eq!(HeapKind::SystemContig.to_string(), "system-contig");
    }
}
