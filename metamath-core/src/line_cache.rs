//! Utilities for source-offset/line-number mapping.

use crate::statement::Position;
use std::convert::TryFrom;

/// An object for efficient repeated byte offset to line conversions.
///
/// The index stores the offset at which each line starts, and is built once
/// per buffer.  Queries are a binary search in that index.
#[derive(Default, Debug, Clone)]
pub struct LineCache {
    starts: Vec<usize>,
}

impl LineCache {
    /// Builds the line index for a buffer.
    #[must_use]
    pub fn new(buf: &str) -> Self {
        let mut starts = Vec::with_capacity(buf.len() / 40 + 1);
        starts.push(0);
        starts.extend(
            buf.bytes()
                .enumerate()
                .filter(|&(_, ch)| ch == b'\n')
                .map(|(pos, _)| pos + 1),
        );
        LineCache { starts }
    }

    /// Number of lines in the buffer.  A trailing newline starts an empty last line.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// Map a 1-based line to the offset of its first character.
    /// Lines past the end map to `None`.
    #[must_use]
    pub fn to_offset(&self, line: u32) -> Option<usize> {
        self.starts.get((line as usize).checked_sub(1)?).copied()
    }

    /// Map a buffer index to a 1-based (line, column) position.
    #[must_use]
    pub fn from_offset(&self, offset: usize) -> Position {
        let line = match self.starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let column = offset - self.starts[line];
        Position::new(
            u32::try_from(line + 1).unwrap_or(u32::MAX),
            u32::try_from(column + 1).unwrap_or(u32::MAX),
        )
    }

    /// Map a 1-based position back to a buffer index.
    #[must_use]
    pub fn position_to_offset(&self, pos: Position) -> Option<usize> {
        Some(self.to_offset(pos.line)? + pos.column as usize - 1)
    }

    /// Find the offset just after the end of the line (usually the
    /// location of a '\n', unless we are at the end of the file).
    #[must_use]
    pub fn line_end(buf: &str, offset: usize) -> usize {
        buf.as_bytes()
            .iter()
            .skip(offset)
            .position(|&ch| ch == b'\n')
            .map_or(buf.len(), |pos| pos + offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_based() {
        let lc = LineCache::new("ab\ncd\n\nef");
        assert_eq!(lc.from_offset(0), Position::new(1, 1));
        assert_eq!(lc.from_offset(1), Position::new(1, 2));
        assert_eq!(lc.from_offset(3), Position::new(2, 1));
        assert_eq!(lc.from_offset(6), Position::new(3, 1));
        assert_eq!(lc.from_offset(8), Position::new(4, 2));
        assert_eq!(lc.position_to_offset(Position::new(4, 2)), Some(8));
        assert_eq!(lc.to_offset(5), None);
        assert_eq!(LineCache::line_end("ab\ncd", 3), 5);
        assert_eq!(LineCache::line_end("ab\ncd", 0), 2);
    }
}
