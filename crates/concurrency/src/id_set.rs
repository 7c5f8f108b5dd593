//! Sets of frame ids
//!
//! A frame captures the set of frames that were open when it started and
//! must therefore be treated as not yet visible. Every open frame holds its
//! own copy and the registry holds the live one, so the set is persistent:
//! capturing it at open time is a pointer copy.
//!
//! Ids are kept as sorted, disjoint, non-adjacent half-open spans. Frame ids
//! are handed out consecutively, so the ids allocated while a long-lived
//! parent was open collapse into one span however many there are.
//! Membership is a binary search over spans and the lowest id is the start
//! of the first span.

use framestate_core::FrameId;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: u64,
    end: u64,
}

impl Span {
    fn single(id: FrameId) -> Self {
        Span {
            start: id.as_u64(),
            end: id.as_u64() + 1,
        }
    }

    fn len(&self) -> usize {
        (self.end - self.start) as usize
    }
}

/// Append `span`, coalescing it into the last span if they touch
fn push_merged(out: &mut Vec<Span>, span: Span) {
    if span.start >= span.end {
        return;
    }
    match out.last_mut() {
        Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
        _ => out.push(span),
    }
}

fn spans_of(ids: impl IntoIterator<Item = FrameId>) -> Vec<Span> {
    let mut raw: Vec<FrameId> = ids.into_iter().collect();
    raw.sort_unstable();
    let mut spans = Vec::new();
    for id in raw {
        push_merged(&mut spans, Span::single(id));
    }
    spans
}

fn union(a: &[Span], b: &[Span]) -> Vec<Span> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        let take_a = j == b.len() || (i < a.len() && a[i].start <= b[j].start);
        let next = if take_a {
            i += 1;
            a[i - 1]
        } else {
            j += 1;
            b[j - 1]
        };
        push_merged(&mut out, next);
    }
    out
}

fn difference(a: &[Span], remove: &[Span]) -> Vec<Span> {
    let mut out = Vec::with_capacity(a.len() + 1);
    let mut j = 0;
    for span in a {
        let mut start = span.start;
        while j < remove.len() && remove[j].end <= start {
            j += 1;
        }
        // A removed span may also cut into the next span, so `j` stays put
        let mut k = j;
        while k < remove.len() && remove[k].start < span.end {
            if remove[k].start > start {
                out.push(Span {
                    start,
                    end: remove[k].start,
                });
            }
            start = start.max(remove[k].end);
            k += 1;
        }
        if start < span.end {
            out.push(Span {
                start,
                end: span.end,
            });
        }
    }
    out
}

/// Persistent set of [`FrameId`]s
#[derive(Clone, PartialEq, Eq)]
pub struct FrameIdSet {
    spans: Arc<[Span]>,
    len: usize,
}

impl FrameIdSet {
    /// The empty set
    pub fn new() -> Self {
        Self::from_spans(Vec::new())
    }

    fn from_spans(spans: Vec<Span>) -> Self {
        let len = spans.iter().map(Span::len).sum();
        Self {
            spans: spans.into(),
            len,
        }
    }

    /// True if `id` is in the set
    pub fn contains(&self, id: FrameId) -> bool {
        let raw = id.as_u64();
        let i = self.spans.partition_point(|s| s.end <= raw);
        self.spans.get(i).is_some_and(|s| s.start <= raw)
    }

    /// Number of ids
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the set is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of runs of consecutive ids
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    /// A set that also contains `id`
    pub fn with(&self, id: FrameId) -> Self {
        if self.contains(id) {
            return self.clone();
        }
        Self::from_spans(union(&self.spans, &[Span::single(id)]))
    }

    /// A set that also contains every id in `ids`
    pub fn with_all(&self, ids: impl IntoIterator<Item = FrameId>) -> Self {
        Self::from_spans(union(&self.spans, &spans_of(ids)))
    }

    /// A set without `id`
    pub fn without(&self, id: FrameId) -> Self {
        if !self.contains(id) {
            return self.clone();
        }
        Self::from_spans(difference(&self.spans, &[Span::single(id)]))
    }

    /// A set without any id in `ids`
    pub fn without_all<'a>(&self, ids: impl IntoIterator<Item = &'a FrameId>) -> Self {
        Self::from_spans(difference(&self.spans, &spans_of(ids.into_iter().copied())))
    }

    /// A set that also contains every id in `from..until` except those in `skip`
    ///
    /// Costs O(spans + skipped ids), independent of the width of the range.
    pub fn with_range_except(&self, from: FrameId, until: FrameId, skip: &[FrameId]) -> Self {
        let range = [Span {
            start: from.as_u64(),
            end: until.as_u64(),
        }];
        let added = difference(&range, &spans_of(skip.iter().copied()));
        Self::from_spans(union(&self.spans, &added))
    }

    /// Smallest id in the set
    pub fn lowest(&self) -> Option<FrameId> {
        self.spans.first().map(|s| FrameId::new(s.start))
    }

    /// Iterate ids in ascending order
    pub fn iter(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.spans
            .iter()
            .flat_map(|s| (s.start..s.end).map(FrameId::new))
    }
}

impl Default for FrameIdSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameIdSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for span in self.spans.iter() {
            match span.len() {
                1 => list.entry(&span.start),
                _ => list.entry(&(span.start..span.end)),
            };
        }
        list.finish()
    }
}

impl FromIterator<FrameId> for FrameIdSet {
    fn from_iter<I: IntoIterator<Item = FrameId>>(iter: I) -> Self {
        Self::from_spans(spans_of(iter))
    }
}
