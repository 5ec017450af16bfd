use log::debug;

use crate::error::{RastileError, Result};

/// A rectangular pixel region of the output raster, in half-open
/// row/column coordinates. Tiles produced by a [`WindowGrid`] exactly
/// and disjointly cover the raster extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl Tile {
    pub fn height(&self) -> usize {
        self.row_end - self.row_start
    }

    pub fn width(&self) -> usize {
        self.col_end - self.col_start
    }
}

/// Partition of a raster extent into nominal-size tiles, clipped at the
/// raster boundary. Iteration is row-major (top-to-bottom, left-to-right)
/// so output assembly is reproducible regardless of worker count.
#[derive(Debug, Clone)]
pub struct WindowGrid {
    raster_width: usize,
    raster_height: usize,
    tile_width: usize,
    tile_height: usize,
    pub num_tiles_x: usize,
    pub num_tiles_y: usize,
}

impl WindowGrid {
    pub fn new(
        raster_width: usize,
        raster_height: usize,
        tile_width: usize,
        tile_height: usize,
    ) -> Result<Self> {
        if raster_width == 0 || raster_height == 0 {
            return Err(RastileError::InvalidDimensions(raster_width, raster_height));
        }
        if tile_width == 0 || tile_height == 0 {
            return Err(RastileError::InvalidWindowSize(tile_width, tile_height));
        }

        // ceiling division
        let num_tiles_x = (raster_width + tile_width - 1) / tile_width;
        let num_tiles_y = (raster_height + tile_height - 1) / tile_height;

        debug!(
            "WindowGrid: {}x{} raster, tiles {}x{} -> {}x{} tiles ({} total)",
            raster_width,
            raster_height,
            tile_width,
            tile_height,
            num_tiles_x,
            num_tiles_y,
            num_tiles_x * num_tiles_y
        );

        Ok(Self {
            raster_width,
            raster_height,
            tile_width,
            tile_height,
            num_tiles_x,
            num_tiles_y,
        })
    }

    pub fn raster_width(&self) -> usize {
        self.raster_width
    }

    pub fn raster_height(&self) -> usize {
        self.raster_height
    }

    pub fn len(&self) -> usize {
        self.num_tiles_x * self.num_tiles_y
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tile at a row-major linear index. Edge tiles are clipped to the
    /// raster bounds rather than overhanging.
    pub fn get(&self, idx: usize) -> Tile {
        let tile_y = idx / self.num_tiles_x;
        let tile_x = idx % self.num_tiles_x;

        Tile {
            row_start: tile_y * self.tile_height,
            row_end: ((tile_y + 1) * self.tile_height).min(self.raster_height),
            col_start: tile_x * self.tile_width,
            col_end: ((tile_x + 1) * self.tile_width).min(self.raster_width),
        }
    }

    pub fn iter(&self) -> TileIter<'_> {
        TileIter {
            grid: self,
            current: 0,
        }
    }
}

pub struct TileIter<'a> {
    grid: &'a WindowGrid,
    current: usize,
}

impl Iterator for TileIter<'_> {
    type Item = Tile;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current < self.grid.len() {
            let tile = self.grid.get(self.current);
            self.current += 1;
            Some(tile)
        } else {
            None
        }
    }
}
