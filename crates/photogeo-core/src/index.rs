use crate::photo::PhotoRecord;

/// Accumulates GPS-tagged photos in any order; [`seal`](Self::seal) sorts them once.
#[derive(Debug, Default)]
pub struct TimeIndexBuilder {
    records: Vec<PhotoRecord>,
}

impl TimeIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    /// Add a GPS-tagged photo. A photo without a coordinate is handed back untouched.
    pub fn push(&mut self, record: PhotoRecord) -> Result<(), PhotoRecord> {
        if !record.has_gps() {
            return Err(record);
        }
        self.records.push(record);
        Ok(())
    }

    /// Sort by capture time and freeze.
    pub fn seal(mut self) -> TimeOrderedIndex {
        // Equal timestamps need no secondary key, so the unstable sort is fine
        self.records.sort_unstable_by(PhotoRecord::cmp_by_capture);
        TimeOrderedIndex {
            records: self.records,
        }
    }
}

/// GPS-tagged photos in non-decreasing capture order. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct TimeOrderedIndex {
    records: Vec<PhotoRecord>,
}

impl TimeOrderedIndex {
    /// Build from tagged photos. Photos lacking a coordinate are returned alongside the index.
    pub fn build(records: impl IntoIterator<Item = PhotoRecord>) -> (Self, Vec<PhotoRecord>) {
        let mut builder = TimeIndexBuilder::new();
        let mut rejected = Vec::new();
        for record in records {
            if let Err(record) = builder.push(record) {
                rejected.push(record);
            }
        }
        (builder.seal(), rejected)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn as_slice(&self) -> &[PhotoRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PhotoRecord> {
        self.records.iter()
    }
}

impl FromIterator<PhotoRecord> for TimeOrderedIndex {
    /// Untagged photos are dropped.
    fn from_iter<I: IntoIterator<Item = PhotoRecord>>(iter: I) -> Self {
        Self::build(iter).0
    }
}

impl<'a> IntoIterator for &'a TimeOrderedIndex {
    type Item = &'a PhotoRecord;
    type IntoIter = std::slice::Iter<'a, PhotoRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
