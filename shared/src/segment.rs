//! Answer segments marked along one clue list.

/// Inclusive range over one clue list's linear cell ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    /// Callers guarantee `start <= end`
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "segment start {start} past end {end}");
        Self { start, end }
    }

    /// Two segments overlap unless one ends before the other starts
    pub fn overlaps(&self, other: &Segment) -> bool {
        !(self.end < other.start || other.end < self.start)
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }
}

/// Where an offset falls relative to the marked answers of a list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnswerPosition {
    pub in_answer: bool,
    pub is_start: bool,
    pub is_end: bool,
}

/// Sorted, non-overlapping segments for a single clue list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentSet {
    segments: Vec<Segment>,
}

impl SegmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Marks `[start, end]`, deleting every segment it overlaps outright.
    /// Overlapped segments are never trimmed.
    pub fn mark(&mut self, start: usize, end: usize) {
        let marked = Segment::new(start, end);
        self.segments.retain(|existing| !existing.overlaps(&marked));
        self.segments.push(marked);
        self.segments.sort_by_key(|segment| segment.start);
    }

    /// Deletes every segment covering `at`
    pub fn clear_at(&mut self, at: usize) {
        let probe = Segment::new(at, at);
        self.segments.retain(|existing| !existing.overlaps(&probe));
    }

    /// Linear scan; the first segment containing `offset` decides
    pub fn in_answer_at(&self, offset: usize) -> AnswerPosition {
        self.segments
            .iter()
            .find(|segment| segment.contains(offset))
            .map(|segment| AnswerPosition {
                in_answer: true,
                is_start: segment.start == offset,
                is_end: segment.end == offset,
            })
            .unwrap_or_default()
    }
}
