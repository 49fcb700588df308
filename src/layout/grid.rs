use std::collections::BTreeMap;

use super::error::{LayoutError, LayoutResult};

/// Row-major 2-D array of optional node ids.
///
/// A node id appears in at most one cell; the reverse index keeps lookups by
/// id constant time while rows and columns are inserted or dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    cells: Vec<Vec<Option<String>>>,
    cols: usize,
    index: BTreeMap<String, (usize, usize)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridDir {
    Left,
    Right,
    Up,
    Down,
}

impl Grid {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            cells: vec![vec![None; cols]; rows],
            cols,
            index: BTreeMap::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.cells
            .get(row)
            .and_then(|cells| cells.get(col))
            .and_then(|cell| cell.as_deref())
    }

    pub fn find(&self, id: &str) -> Option<(usize, usize)> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn place(&mut self, id: &str, row: usize, col: usize) -> LayoutResult<()> {
        if row >= self.rows() || col >= self.cols {
            return Err(LayoutError::CellOutOfRange {
                row,
                col,
                rows: self.rows(),
                cols: self.cols,
            });
        }
        if let Some(&(r, c)) = self.index.get(id) {
            if (r, c) == (row, col) {
                return Ok(());
            }
            return Err(LayoutError::DuplicateCell {
                node: id.to_string(),
                row: r,
                col: c,
            });
        }
        if let Some(occupant) = self.get(row, col) {
            return Err(LayoutError::DuplicateCell {
                node: occupant.to_string(),
                row,
                col,
            });
        }
        self.cells[row][col] = Some(id.to_string());
        self.index.insert(id.to_string(), (row, col));
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<(usize, usize)> {
        let (row, col) = self.index.remove(id)?;
        self.cells[row][col] = None;
        Some((row, col))
    }

    pub fn push_row(&mut self) -> usize {
        self.cells.push(vec![None; self.cols]);
        self.cells.len() - 1
    }

    /// Inserts an empty row before `at`; rows at or below `at` shift down.
    pub fn insert_row(&mut self, at: usize) {
        let at = at.min(self.rows());
        self.cells.insert(at, vec![None; self.cols]);
        self.reindex();
    }

    /// Inserts an empty column before `at`; columns at or right of `at` shift right.
    pub fn insert_col(&mut self, at: usize) {
        let at = at.min(self.cols);
        for row in &mut self.cells {
            row.insert(at, None);
        }
        self.cols += 1;
        self.reindex();
    }

    pub fn is_row_empty(&self, row: usize) -> bool {
        self.cells
            .get(row)
            .map(|cells| cells.iter().all(Option::is_none))
            .unwrap_or(true)
    }

    pub fn is_col_empty(&self, col: usize) -> bool {
        self.cells
            .iter()
            .all(|cells| cells.get(col).map(Option::is_none).unwrap_or(true))
    }

    /// Drops fully empty rows and returns the original indices that survived.
    pub fn drop_empty_rows(&mut self) -> Vec<usize> {
        let mut kept = Vec::new();
        let mut cells = Vec::with_capacity(self.cells.len());
        for (idx, row) in std::mem::take(&mut self.cells).into_iter().enumerate() {
            if row.iter().any(Option::is_some) {
                kept.push(idx);
                cells.push(row);
            }
        }
        self.cells = cells;
        self.reindex();
        kept
    }

    /// Drops fully empty columns and returns the original indices that survived.
    pub fn drop_empty_cols(&mut self) -> Vec<usize> {
        let kept: Vec<usize> = (0..self.cols).filter(|&c| !self.is_col_empty(c)).collect();
        for row in &mut self.cells {
            let old = std::mem::take(row);
            *row = kept.iter().map(|&c| old[c].clone()).collect();
        }
        self.cols = kept.len();
        self.reindex();
        kept
    }

    pub fn row_nodes(&self, row: usize) -> Vec<&str> {
        self.cells
            .get(row)
            .map(|cells| cells.iter().filter_map(|c| c.as_deref()).collect())
            .unwrap_or_default()
    }

    pub fn col_nodes(&self, col: usize) -> Vec<&str> {
        self.cells
            .iter()
            .filter_map(|cells| cells.get(col).and_then(|c| c.as_deref()))
            .collect()
    }

    /// Nearest occupied cell from `id` in the given direction.
    pub fn neighbor(&self, id: &str, dir: GridDir) -> Option<&str> {
        let (row, col) = self.find(id)?;
        match dir {
            GridDir::Left => (0..col).rev().find_map(|c| self.get(row, c)),
            GridDir::Right => (col + 1..self.cols).find_map(|c| self.get(row, c)),
            GridDir::Up => (0..row).rev().find_map(|r| self.get(r, col)),
            GridDir::Down => (row + 1..self.rows()).find_map(|r| self.get(r, col)),
        }
    }

    /// True when the cell directly in `dir` exists and holds a node.
    pub fn is_adjacent_occupied(&self, id: &str, dir: GridDir) -> bool {
        let Some((row, col)) = self.find(id) else {
            return false;
        };
        let cell = match dir {
            GridDir::Left => col.checked_sub(1).map(|c| (row, c)),
            GridDir::Right => Some((row, col + 1)),
            GridDir::Up => row.checked_sub(1).map(|r| (r, col)),
            GridDir::Down => Some((row + 1, col)),
        };
        cell.and_then(|(r, c)| self.get(r, c)).is_some()
    }

    /// Node ids in row-major order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.cells
            .iter()
            .flat_map(|cells| cells.iter().filter_map(|c| c.as_deref()))
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (r, row) in self.cells.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if let Some(id) = cell {
                    self.index.insert(id.clone(), (r, c));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_rejects_duplicates() {
        let mut grid = Grid::new(2, 2);
        grid.place("A", 0, 0).unwrap();
        assert!(grid.place("A", 0, 0).is_ok());
        assert!(matches!(
            grid.place("A", 1, 1),
            Err(LayoutError::DuplicateCell { row: 0, col: 0, .. })
        ));
        assert!(grid.place("B", 0, 0).is_err());
        assert!(matches!(
            grid.place("B", 2, 0),
            Err(LayoutError::CellOutOfRange { .. })
        ));
    }

    #[test]
    fn insert_row_and_col_shift_index() {
        let mut grid = Grid::new(1, 2);
        grid.place("A", 0, 0).unwrap();
        grid.place("B", 0, 1).unwrap();
        grid.insert_row(0);
        grid.insert_col(1);
        assert_eq!(grid.find("A"), Some((1, 0)));
        assert_eq!(grid.find("B"), Some((1, 2)));
        assert_eq!(grid.rows(), 2);
        assert_eq!(grid.cols(), 3);
        assert_eq!(grid.neighbor("A", GridDir::Right), Some("B"));
        assert!(!grid.is_adjacent_occupied("A", GridDir::Right));
    }

    #[test]
    fn drops_empty_rows_and_cols() {
        let mut grid = Grid::new(3, 3);
        grid.place("A", 0, 0).unwrap();
        grid.place("B", 2, 2).unwrap();
        assert_eq!(grid.drop_empty_rows(), vec![0, 2]);
        assert_eq!(grid.drop_empty_cols(), vec![0, 2]);
        assert_eq!(grid.find("B"), Some((1, 1)));
        assert_eq!(grid.node_ids().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn neighbor_queries() {
        let mut grid = Grid::new(3, 1);
        grid.place("top", 0, 0).unwrap();
        grid.place("bottom", 2, 0).unwrap();
        assert_eq!(grid.neighbor("top", GridDir::Down), Some("bottom"));
        assert_eq!(grid.neighbor("bottom", GridDir::Up), Some("top"));
        assert_eq!(grid.neighbor("top", GridDir::Up), None);
        assert_eq!(grid.col_nodes(0), vec!["top", "bottom"]);
        grid.remove("top");
        assert!(grid.is_row_empty(0));
    }
}
