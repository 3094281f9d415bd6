//! Mapping from byte offsets to the 1-based line/column pairs that GraphQL
//! reports in an error's `locations` list.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A 1-based line and column in a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

/// Line start table for a source string.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<u32>,
    len: u32,
}

impl LineIndex {
    /// Builds the index. `\n`, `\r\n` and a lone `\r` all terminate a line.
    #[must_use]
    pub fn new(source: &str) -> Self {
        let bytes = source.as_bytes();
        let mut line_starts = vec![0];
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\n' => line_starts.push(offset(i + 1)),
                b'\r' => {
                    if bytes.get(i + 1) == Some(&b'\n') {
                        i += 1;
                    }
                    line_starts.push(offset(i + 1));
                }
                _ => {}
            }
            i += 1;
        }
        Self {
            line_starts,
            len: offset(bytes.len()),
        }
    }

    /// Returns the location of a byte offset. Offsets past the end clamp to
    /// the end of the source.
    #[must_use]
    pub fn location(&self, pos: u32) -> Location {
        let pos = pos.min(self.len);
        let line = match self.line_starts.binary_search(&pos) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        Location {
            line: offset(line + 1),
            column: pos - self.line_starts[line] + 1,
        }
    }

    /// Returns the number of lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

fn offset(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        let index = LineIndex::new("{ add(x: 2) }");
        assert_eq!(index.location(0), Location { line: 1, column: 1 });
        assert_eq!(index.location(2), Location { line: 1, column: 3 });
    }

    #[test]
    fn test_multiple_lines() {
        let index = LineIndex::new("query {\n  a\r\n  b\r}");
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.location(10), Location { line: 2, column: 3 });
        assert_eq!(index.location(15), Location { line: 3, column: 3 });
        assert_eq!(index.location(17), Location { line: 4, column: 1 });
    }

    #[test]
    fn test_clamps_past_end() {
        let index = LineIndex::new("ab");
        assert_eq!(index.location(99), Location { line: 1, column: 3 });
    }
}
