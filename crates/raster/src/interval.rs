//! Real-valued intervals and interval sets used to describe valid and invalid
//! pixel value ranges for mask synthesis.

/// A closed, open or half-open interval over f64. Bounds may be infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    lower: f64,
    upper: f64,
    lower_open: bool,
    upper_open: bool,
}

impl Interval {
    /// [lower, upper]
    pub fn closed(lower: f64, upper: f64) -> Self {
        Interval {
            lower,
            upper,
            lower_open: false,
            upper_open: false,
        }
    }

    /// (lower, upper)
    pub fn open(lower: f64, upper: f64) -> Self {
        Interval {
            lower,
            upper,
            lower_open: true,
            upper_open: true,
        }
    }

    /// (lower, upper]
    pub fn left_open(lower: f64, upper: f64) -> Self {
        Interval {
            lower,
            upper,
            lower_open: true,
            upper_open: false,
        }
    }

    /// [lower, upper)
    pub fn right_open(lower: f64, upper: f64) -> Self {
        Interval {
            lower,
            upper,
            lower_open: false,
            upper_open: true,
        }
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn is_lower_open(&self) -> bool {
        self.lower_open
    }

    pub fn is_upper_open(&self) -> bool {
        self.upper_open
    }

    pub fn is_empty(&self) -> bool {
        self.lower > self.upper || (self.lower == self.upper && (self.lower_open || self.upper_open))
    }

    /// Containment test for values from integer-typed images. Open bounds
    /// exclude their endpoint, so (3, 9] accepts 4..=9.
    pub fn contains_int(&self, v: f64) -> bool {
        let lower_ok = if self.lower_open { v > self.lower } else { v >= self.lower };
        let upper_ok = if self.upper_open { v < self.upper } else { v <= self.upper };
        lower_ok && upper_ok
    }

    /// Containment test for values from floating point images. Open bounds are
    /// treated as closed; strict openness on floats is not supported.
    pub fn contains_float(&self, v: f64) -> bool {
        v >= self.lower && v <= self.upper
    }

    fn intersect(&self, other: &Interval) -> Option<Interval> {
        let (lower, lower_open) = tighter_lower(self.lower, self.lower_open, other.lower, other.lower_open);
        let (upper, upper_open) = tighter_upper(self.upper, self.upper_open, other.upper, other.upper_open);
        let result = Interval {
            lower,
            upper,
            lower_open,
            upper_open,
        };
        if result.is_empty() { None } else { Some(result) }
    }

    /// True when the union of the two intervals is a single interval.
    fn touches(&self, other: &Interval) -> bool {
        let (first, second) = if self.lower <= other.lower { (self, other) } else { (other, self) };
        if second.lower < first.upper {
            return true;
        }
        // adjacent bounds merge unless both are open
        second.lower == first.upper && !(second.lower_open && first.upper_open)
    }

    fn merge(&self, other: &Interval) -> Interval {
        let (lower, lower_open) = looser_lower(self.lower, self.lower_open, other.lower, other.lower_open);
        let (upper, upper_open) = looser_upper(self.upper, self.upper_open, other.upper, other.upper_open);
        Interval {
            lower,
            upper,
            lower_open,
            upper_open,
        }
    }
}

fn tighter_lower(a: f64, a_open: bool, b: f64, b_open: bool) -> (f64, bool) {
    if a > b || (a == b && a_open) { (a, a_open) } else { (b, b_open) }
}

fn tighter_upper(a: f64, a_open: bool, b: f64, b_open: bool) -> (f64, bool) {
    if a < b || (a == b && a_open) { (a, a_open) } else { (b, b_open) }
}

fn looser_lower(a: f64, a_open: bool, b: f64, b_open: bool) -> (f64, bool) {
    if a < b || (a == b && !a_open) { (a, a_open) } else { (b, b_open) }
}

fn looser_upper(a: f64, a_open: bool, b: f64, b_open: bool) -> (f64, bool) {
    if a > b || (a == b && !a_open) { (a, a_open) } else { (b, b_open) }
}

/// A finite union of disjoint intervals, kept sorted and normalised.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub fn new() -> Self {
        IntervalSet::default()
    }

    pub fn all() -> Self {
        IntervalSet::from(Interval::closed(f64::NEG_INFINITY, f64::INFINITY))
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interval> {
        self.intervals.iter()
    }

    /// Set union with a single interval.
    pub fn insert(&mut self, interval: Interval) {
        if interval.is_empty() {
            return;
        }

        let mut merged = interval;
        let mut result = Vec::with_capacity(self.intervals.len() + 1);
        for iv in &self.intervals {
            if iv.touches(&merged) {
                merged = merged.merge(iv);
            } else {
                result.push(*iv);
            }
        }
        result.push(merged);
        result.sort_by(|a, b| a.lower.partial_cmp(&b.lower).unwrap_or(std::cmp::Ordering::Equal));
        self.intervals = result;
    }

    pub fn union(&self, other: &IntervalSet) -> IntervalSet {
        let mut result = self.clone();
        for iv in &other.intervals {
            result.insert(*iv);
        }
        result
    }

    pub fn intersection(&self, other: &IntervalSet) -> IntervalSet {
        let mut result = IntervalSet::new();
        for a in &self.intervals {
            for b in &other.intervals {
                if let Some(iv) = a.intersect(b) {
                    result.insert(iv);
                }
            }
        }
        result
    }

    pub fn difference(&self, other: &IntervalSet) -> IntervalSet {
        let mut result = IntervalSet::new();
        for a in &self.intervals {
            let mut pieces = vec![*a];
            for b in &other.intervals {
                let mut remaining = Vec::new();
                for piece in &pieces {
                    remaining.extend(subtract(piece, b));
                }
                pieces = remaining;
            }
            for piece in pieces {
                result.insert(piece);
            }
        }
        result
    }

    pub fn symmetric_difference(&self, other: &IntervalSet) -> IntervalSet {
        self.union(other).difference(&self.intersection(other))
    }

    pub fn contains_int(&self, v: f64) -> bool {
        self.intervals.iter().any(|iv| iv.contains_int(v))
    }

    pub fn contains_float(&self, v: f64) -> bool {
        self.intervals.iter().any(|iv| iv.contains_float(v))
    }
}

impl From<Interval> for IntervalSet {
    fn from(interval: Interval) -> Self {
        let mut set = IntervalSet::new();
        set.insert(interval);
        set
    }
}

/// The part of `a` not covered by `b`, as zero, one or two intervals.
fn subtract(a: &Interval, b: &Interval) -> Vec<Interval> {
    let Some(overlap) = a.intersect(b) else {
        return vec![*a];
    };

    let mut pieces = Vec::with_capacity(2);
    let left = Interval {
        lower: a.lower,
        lower_open: a.lower_open,
        upper: overlap.lower,
        upper_open: !overlap.lower_open,
    };
    if !left.is_empty() {
        pieces.push(left);
    }
    let right = Interval {
        lower: overlap.upper,
        lower_open: !overlap.upper_open,
        upper: a.upper,
        upper_open: a.upper_open,
    };
    if !right.is_empty() {
        pieces.push(right);
    }
    pieces
}
