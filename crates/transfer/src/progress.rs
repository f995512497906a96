/// Percentage of `total` covered by `offset`, floored and clamped to `0..=100`.
///
/// An empty transfer is complete by definition.
pub fn percent(offset: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = u128::from(offset) * 100 / u128::from(total);
    pct.min(100) as u8
}

/// Turns a stream of offsets into percentage reports.
///
/// Holds no transfer state of its own beyond the last value it reported,
/// so consecutive chunks that land on the same percentage produce one
/// report instead of many.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    total: u64,
    last: Option<u8>,
}

impl ProgressReporter {
    pub fn new(total: u64) -> Self {
        Self { total, last: None }
    }

    /// Returns the percentage to report if it differs from the last one.
    pub fn observe(&mut self, offset: u64) -> Option<u8> {
        let pct = percent(offset, self.total);
        if self.last == Some(pct) {
            return None;
        }
        self.last = Some(pct);
        Some(pct)
    }

    /// Returns the percentage for `offset` unconditionally.
    ///
    /// Used for the first report of an attempt so observers always see a
    /// starting point.
    pub fn force(&mut self, offset: u64) -> u8 {
        let pct = percent(offset, self.total);
        self.last = Some(pct);
        pct
    }

    /// Last reported percentage.
    pub fn last(&self) -> Option<u8> {
        self.last
    }
}
