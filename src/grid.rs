// src/grid.rs

/// Dense 2D index space for SDF fields.
///
/// `nx` is the number of columns (x), `ny` the number of rows (y).
/// Storage is row-major, so a field value at (x, y) lives at `y * nx + x`,
/// matching the (row, column) = (y, x) addressing of the fusion fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid2D {
    pub nx: usize,
    pub ny: usize,
}

impl Grid2D {
    /// Create a new 2D grid with nx columns and ny rows.
    pub fn new(nx: usize, ny: usize) -> Self {
        Self { nx, ny }
    }

    /// Square grid, the usual shape of the 2D fusion experiments.
    pub fn square(size: usize) -> Self {
        Self::new(size, size)
    }

    /// Total number of cells.
    pub fn n_cells(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.nx == 0 || self.ny == 0
    }

    /// Convert (x, y) to a flat index into a 1D array.
    #[inline]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.nx && y < self.ny);
        y * self.nx + x
    }

    /// True if the signed coordinate (x, y) addresses a cell of this grid.
    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as u64) < self.nx as u64 && (y as u64) < self.ny as u64
    }
}
