//! A1-style coordinates and merged-range resolution.

use std::collections::HashMap;

/// One worksheet coordinate, 1-based row and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> CellRef {
        CellRef { row, col }
    }

    /// Parses `"E6"` / `"AA10"`. Returns None for anything malformed.
    pub fn parse(a1: &str) -> Option<CellRef> {
        let split = a1.find(|c: char| c.is_ascii_digit())?;
        let (letters, digits) = a1.split_at(split);
        if letters.is_empty() {
            return None;
        }

        let mut col: u32 = 0;
        for c in letters.chars() {
            if !c.is_ascii_alphabetic() {
                return None;
            }
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        }

        let row: u32 = digits.parse().ok()?;
        if row == 0 {
            return None;
        }
        Some(CellRef { row, col })
    }

    pub fn to_a1(&self) -> String {
        let mut col = self.col;
        let mut letters = Vec::new();
        while col > 0 {
            let rem = (col - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            col = (col - 1) / 26;
        }
        letters.reverse();
        format!("{}{}", letters.into_iter().collect::<String>(), self.row)
    }
}

/// Rectangular merged region. Only its top-left anchor is writable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedRange {
    pub start: CellRef,
    pub end: CellRef,
}

impl MergedRange {
    /// Parses `"E6:G7"` (or a degenerate single-cell `"E6"`), normalizing
    /// so that `start` is the top-left corner.
    pub fn parse(reference: &str) -> Option<MergedRange> {
        let (first, second) = match reference.split_once(':') {
            Some((a, b)) => (CellRef::parse(a)?, CellRef::parse(b)?),
            None => {
                let only = CellRef::parse(reference)?;
                (only, only)
            }
        };

        Some(MergedRange {
            start: CellRef::new(first.row.min(second.row), first.col.min(second.col)),
            end: CellRef::new(first.row.max(second.row), first.col.max(second.col)),
        })
    }

    pub fn contains(&self, cell: CellRef) -> bool {
        cell.row >= self.start.row
            && cell.row <= self.end.row
            && cell.col >= self.start.col
            && cell.col <= self.end.col
    }

    pub fn anchor(&self) -> CellRef {
        self.start
    }
}

/// Coordinate→anchor lookup precomputed from a sheet's merged ranges, so
/// each write resolves in O(1) instead of rescanning every range.
/// Ranges are non-overlapping, making the resolution order-independent.
#[derive(Debug, Clone, Default)]
pub struct MergeMap {
    anchors: HashMap<CellRef, CellRef>,
}

impl MergeMap {
    pub fn from_ranges(ranges: &[MergedRange]) -> MergeMap {
        let mut anchors = HashMap::new();
        for range in ranges {
            let anchor = range.anchor();
            for row in range.start.row..=range.end.row {
                for col in range.start.col..=range.end.col {
                    anchors.insert(CellRef::new(row, col), anchor);
                }
            }
        }
        MergeMap { anchors }
    }

    /// Anchor of the merged range containing `cell`, or `cell` itself.
    pub fn resolve(&self, cell: CellRef) -> CellRef {
        *self.anchors.get(&cell).unwrap_or(&cell)
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}
