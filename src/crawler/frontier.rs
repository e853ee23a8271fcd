use std::cmp::Ordering;
use std::collections::BinaryHeap;
use url::Url;

/// A URL admitted to the crawl but not yet fetched
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    /// Canonical URL to fetch
    pub url: Url,

    /// Link depth from the seed (seed is 0)
    pub depth: u32,

    /// URL of the page that discovered this one
    pub referrer: Option<String>,

    /// Priority from classification; higher values are fetched first
    pub priority: u32,

    /// Discovery sequence number, the final tie-break
    pub seq: u64,
}

// BinaryHeap pops the greatest entry, so the highest priority wins
// directly; ties fall back to the shallower depth, then to discovery order.
// Documentation-classified links therefore overtake navigation links at the
// same depth, and equal classifications preserve discovery order.
impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.depth.cmp(&self.depth))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.depth == other.depth && self.seq == other.seq
    }
}

impl Eq for FrontierEntry {}

/// The ordered set of admitted, not-yet-fetched URLs
///
/// Each URL is enqueued at most once (admission deduplicates before
/// pushing), and dequeued at most once.
#[derive(Debug, Default)]
pub struct Frontier {
    heap: BinaryHeap<FrontierEntry>,
    next_seq: u64,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a URL with its discovery context
    pub fn push(&mut self, url: Url, depth: u32, referrer: Option<String>, priority: u32) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(FrontierEntry {
            url,
            depth,
            referrer,
            priority,
            seq,
        });
    }

    /// Removes and returns the highest-priority entry
    pub fn pop(&mut self) -> Option<FrontierEntry> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
