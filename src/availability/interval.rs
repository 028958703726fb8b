use time::OffsetDateTime;

/// A half-open UTC time range `[start, end)`.
///
/// All availability arithmetic happens on these; local-time display is a
/// boundary concern handled outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl Interval {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Half-open overlap: touching endpoints do not count.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Merge a set of intervals into a sorted, non-overlapping cover.
/// Empty and inverted inputs are dropped; adjacent intervals coalesce.
pub fn union(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.retain(|iv| !iv.is_empty());
    intervals.sort_by_key(|iv| iv.start);

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for iv in intervals {
        match merged.last_mut() {
            Some(last) if iv.start <= last.end => {
                if iv.end > last.end {
                    last.end = iv.end;
                }
            }
            _ => merged.push(iv),
        }
    }
    merged
}

/// Interval difference: `available - busy`, both normalized via [`union`].
/// Returns the free portions of `available` in order.
pub fn subtract(available: Vec<Interval>, busy: Vec<Interval>) -> Vec<Interval> {
    let available = union(available);
    let busy = union(busy);

    let mut free = Vec::new();
    for window in available {
        let mut cursor = window.start;
        for b in busy.iter().filter(|b| b.overlaps(&window)) {
            if b.start > cursor {
                free.push(Interval::new(cursor, b.start));
            }
            if b.end > cursor {
                cursor = b.end;
            }
        }
        if cursor < window.end {
            free.push(Interval::new(cursor, window.end));
        }
    }
    free
}
