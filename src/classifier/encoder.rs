/// Stable bijection between season labels and dense integer indices.
///
/// Classes are the sorted unique labels seen at fit time, so encode/decode is
/// reproducible across refits on the same label set and "lowest encoded
/// index" tie-breaks are lexicographic. The table is owned by its classifier
/// and never mutated from outside.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    #[must_use]
    pub fn fit(labels: &[String]) -> Self {
        let mut classes = labels.to_vec();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    #[must_use]
    pub fn encode(&self, label: &str) -> Option<usize> {
        self.classes.binary_search_by(|class| class.as_str().cmp(label)).ok()
    }

    #[must_use]
    pub fn decode(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
