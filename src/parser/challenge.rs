/// Case-insensitive scan of rendered content for anti-automation interstitials.
#[derive(Debug, Clone)]
pub struct BlockDetector {
    indicators: Vec<String>,
}

impl BlockDetector {
    pub fn new<I, S>(indicators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            indicators: indicators
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Return the first indicator found in `content`, if any.
    pub fn detect(&self, content: &str) -> Option<&str> {
        let lower = content.to_lowercase();
        self.indicators
            .iter()
            .find(|ind| lower.contains(ind.as_str()))
            .map(String::as_str)
    }
}
