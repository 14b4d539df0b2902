//! Line windows and the consumed-line protocol
//!
//! Every extractor takes a [`LineWindow`] and returns a [`Parsed`] value
//! together with the exact number of lines it read. Callers resume scanning
//! at `window.advance(parsed.consumed)`.

/// Immutable view over pre-trimmed lines
#[derive(Debug, Clone, Copy)]
pub struct LineWindow<'a> {
    lines: &'a [String],
    /// Absolute index of `lines[0]` in the original source
    offset: usize,
}

impl<'a> LineWindow<'a> {
    pub fn new(lines: &'a [String]) -> Self {
        Self { lines, offset: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Absolute line number of the first line (0-based)
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn lines(&self) -> &'a [String] {
        self.lines
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&'a str> {
        self.lines.get(index).map(String::as_str)
    }

    #[inline]
    pub fn first(&self) -> Option<&'a str> {
        self.get(0)
    }

    /// Window starting `n` lines later (empty when `n` passes the end)
    pub fn advance(&self, n: usize) -> LineWindow<'a> {
        let n = n.min(self.lines.len());
        LineWindow {
            lines: &self.lines[n..],
            offset: self.offset + n,
        }
    }

    /// Window holding at most the first `n` lines
    pub fn take(&self, n: usize) -> LineWindow<'a> {
        let n = n.min(self.lines.len());
        LineWindow {
            lines: &self.lines[..n],
            offset: self.offset,
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &'a str> + ExactSizeIterator + 'a {
        self.lines.iter().map(String::as_str)
    }

    /// Index of the first line matching `pred`
    pub fn position<F>(&self, pred: F) -> Option<usize>
    where
        F: FnMut(&'a str) -> bool,
    {
        self.iter().position(pred)
    }
}

/// Value produced by an extractor and the number of lines it consumed
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub value: T,
    pub consumed: usize,
}

impl<T> Parsed<T> {
    pub fn new(value: T, consumed: usize) -> Self {
        Self { value, consumed }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Parsed<U> {
        Parsed {
            value: f(self.value),
            consumed: self.consumed,
        }
    }
}
