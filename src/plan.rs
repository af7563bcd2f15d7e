// SplitStream Downloader - plan.rs

/// One contiguous byte range of the target file, inclusive on both ends,
/// assigned to a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl Segment {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// First byte a worker should request, given bytes already on disk.
    pub fn resume_start(&self, downloaded: u64) -> u64 {
        self.start + downloaded
    }

    /// A segment whose progress reaches past its end needs no worker.
    pub fn is_complete(&self, downloaded: u64) -> bool {
        self.start + downloaded > self.end
    }
}

/// Partitions `[0, total)` into at most `connections` contiguous, disjoint
/// segments.
///
/// The scheme is fixed so a resume record replans identically: every segment
/// spans `total / connections` bytes except the last, which absorbs the
/// remainder. A file smaller than the fan-out gets one single-byte segment
/// per available byte; the excess connections are simply not used.
pub fn split(total: u64, connections: usize) -> Vec<Segment> {
    if total == 0 {
        return Vec::new();
    }
    let n = connections as u64;
    if total < n {
        return (0..total)
            .map(|i| Segment {
                index: i as usize,
                start: i,
                end: i,
            })
            .collect();
    }
    let width = total / n;
    (0..connections)
        .map(|index| {
            let start = index as u64 * width;
            let end = if index == connections - 1 {
                total - 1
            } else {
                start + width - 1
            };
            Segment { index, start, end }
        })
        .collect()
}
