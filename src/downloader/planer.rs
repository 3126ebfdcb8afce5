/// Inclusive byte window `[start, end]` of the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRange {
    /// Position in the final file, independent of completion order.
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Splits a resource of known size into fixed-size ranges.
#[derive(Debug, Clone, Copy)]
pub struct Planer {
    chunk_size: u64,
}

impl Planer {
    pub fn new(chunk_size: u64) -> Self {
        debug_assert!(chunk_size > 0, "chunk_size must be positive");
        Planer {
            chunk_size: chunk_size.max(1),
        }
    }

    /// `ceil(total_size / chunk_size)` ranges tiling `[0, total_size)`; empty for size 0.
    pub fn plan(&self, total_size: u64) -> Vec<ChunkRange> {
        let count = total_size.div_ceil(self.chunk_size);
        (0..count)
            .map(|i| {
                let start = i * self.chunk_size;
                ChunkRange {
                    index: i as usize,
                    start,
                    end: start.saturating_add(self.chunk_size - 1).min(total_size - 1),
                }
            })
            .collect()
    }
}
