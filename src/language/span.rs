#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn join(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// 1-based line number of the span start within `source`.
    pub fn line(&self, source: &str) -> usize {
        source[..self.start.min(source.len())]
            .bytes()
            .filter(|b| *b == b'\n')
            .count()
            + 1
    }
}

impl Default for Span {
    fn default() -> Self {
        Span::new(0, 0)
    }
}
