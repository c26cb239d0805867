//! Document positions and ranges (0-indexed).

/// A 0-indexed line/column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    /// Sentinel at or past the end of any document.
    ///
    /// Editors clamp it to the real end of the file when rendering.
    pub const END_OF_DOCUMENT: Self = Self {
        line: u32::MAX,
        column: u32::MAX,
    };

    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    #[must_use]
    pub fn line(self) -> u32 {
        self.line
    }

    #[must_use]
    pub fn column(self) -> u32 {
        self.column
    }

    #[must_use]
    pub fn is_end_of_document(self) -> bool {
        self == Self::END_OF_DOCUMENT
    }
}

/// A half-open range between two positions. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceRange {
    start: Position,
    end: Position,
}

impl SourceRange {
    /// Zero-width range at `at`.
    #[must_use]
    pub const fn point(at: Position) -> Self {
        Self { start: at, end: at }
    }

    /// Range covering everything from `start` to the end of the document.
    #[must_use]
    pub const fn to_end_of_document(start: Position) -> Self {
        Self {
            start,
            end: Position::END_OF_DOCUMENT,
        }
    }

    #[must_use]
    pub fn start(self) -> Position {
        self.start
    }

    #[must_use]
    pub fn end(self) -> Position {
        self.end
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.start == self.end
    }
}
