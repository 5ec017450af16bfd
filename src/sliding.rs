use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

use log::info;

use crate::dispatch::{self, DispatchContext, WorkItem};
use crate::error::{RastileError, Result};
use crate::grid::WindowGrid;
use crate::io::{self, OutputAssembler, OutputDescriptor, OutputDtype};
use crate::padding::EdgePolicy;
use crate::processor::TileTransform;

/// Windowing and output configuration shared by every tool.
#[derive(Debug, Clone)]
pub struct SlidingOptions {
    /// Nominal tile size (width, height).
    pub window_size: (usize, usize),
    /// Edge synthesis rule for boundary windows.
    pub pad_policy: EdgePolicy,
    /// 1-based source bands to process; `None` or empty means all bands.
    pub bands: Option<Vec<usize>>,
    /// Worker count; `None` defers to `RASTILE_MAX_WORKERS` or core count.
    pub workers: Option<usize>,
    /// GTiff compression (DEFLATE, LZW, ZSTD or NONE).
    pub compression: String,
    /// Output pixel type.
    pub dtype: OutputDtype,
    /// Output nodata; defaults to the source nodata.
    pub nodata: Option<f64>,
}

impl Default for SlidingOptions {
    fn default() -> Self {
        Self {
            window_size: (1024, 1024),
            pad_policy: EdgePolicy::Edge,
            bands: None,
            workers: None,
            compression: "LZW".to_string(),
            dtype: OutputDtype::Float32,
            nodata: None,
        }
    }
}

/// Highest power of two that does not exceed n.
fn highest_power_of_2(n: usize) -> usize {
    debug_assert!(n > 0);
    1 << (usize::BITS - 1 - n.leading_zeros())
}

/// Shrink the nominal block size to the raster when the raster is smaller
/// than a window, keeping a TIFF-valid tile dimension.
fn block_dimension(nominal: usize, raster: usize) -> usize {
    if raster < nominal {
        highest_power_of_2(raster).max(16)
    } else {
        nominal
    }
}

fn resolve_bands(requested: &Option<Vec<usize>>, count: usize) -> Result<Vec<usize>> {
    match requested {
        Some(bands) if !bands.is_empty() => {
            for &b in bands {
                if b < 1 || b > count {
                    return Err(RastileError::InvalidBand(b, count));
                }
            }
            Ok(bands.clone())
        }
        _ => Ok((1..=count).collect()),
    }
}

/// Expand the grid into work items. Per-band transforms process one band
/// per item; stack transforms take all selected bands at once. Output
/// bands are the 1-based positions in the selection.
fn build_work_items(grid: &WindowGrid, bands: &[usize], per_band: bool) -> Vec<WorkItem> {
    let mut items = Vec::new();
    for tile in grid.iter() {
        if per_band {
            for (i, &b) in bands.iter().enumerate() {
                items.push(WorkItem {
                    tile,
                    in_bands: vec![b],
                    out_bands: vec![i + 1],
                });
            }
        } else {
            items.push(WorkItem {
                tile,
                in_bands: bands.to_vec(),
                out_bands: (1..=bands.len()).collect(),
            });
        }
    }
    items
}

/// Run a transform over an input raster tile by tile and assemble the
/// output raster: partition, padded reads, parallel transform, trimmed
/// locked writes. A failed run leaves any partially written output on
/// disk and reports the first failing tile.
pub fn compute_sliding(
    input: &Path,
    output: &Path,
    transform: &dyn TileTransform,
    options: &SlidingOptions,
    cancel: Option<&AtomicBool>,
) -> Result<()> {
    let workers = dispatch::resolve_worker_count(options.workers)?;
    let (win_w, win_h) = options.window_size;
    if win_w == 0 || win_h == 0 {
        return Err(RastileError::InvalidWindowSize(win_w, win_h));
    }

    let overlap = transform.required_overlap();
    if overlap > 0 && overlap >= win_w.min(win_h) / 2 {
        return Err(RastileError::InvalidOverlap {
            overlap,
            window: win_w.min(win_h),
        });
    }

    let source = io::open_source(input)?;
    let metadata = io::extract_metadata(&source)?;
    let bands = resolve_bands(&options.bands, metadata.count)?;

    info!(
        "Processing {} ({}x{}, {} band(s)) with '{}', window {}x{}, overlap {}, {} worker(s)",
        input.display(),
        metadata.width,
        metadata.height,
        metadata.count,
        transform.name(),
        win_w,
        win_h,
        overlap,
        workers
    );

    let descriptor = OutputDescriptor {
        dtype: options.dtype,
        nodata: options.nodata.or(metadata.nodata).unwrap_or(match options.dtype {
            OutputDtype::UInt8 => 255.0,
            _ => f64::NAN,
        }),
        band_count: bands.len(),
        compression: options.compression.clone(),
        block_size: (
            block_dimension(win_w, metadata.width),
            block_dimension(win_h, metadata.height),
        ),
    };
    let assembler = OutputAssembler::create(output, &metadata, descriptor)?;

    let grid = WindowGrid::new(metadata.width, metadata.height, win_w, win_h)?;
    let items = build_work_items(&grid, &bands, transform.per_band());

    let source = Mutex::new(source);
    let ctx = DispatchContext {
        source: &source,
        assembler: &assembler,
        transform,
        raster_width: metadata.width,
        raster_height: metadata.height,
        radius: overlap,
        policy: options.pad_policy,
        nodata: metadata.nodata,
    };
    dispatch::run(&ctx, &items, workers, cancel)?;

    assembler.finish()?;
    info!("Wrote {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highest_power_of_2() {
        assert_eq!(highest_power_of_2(1), 1);
        assert_eq!(highest_power_of_2(2), 2);
        assert_eq!(highest_power_of_2(1000), 512);
        assert_eq!(highest_power_of_2(1024), 1024);
        assert_eq!(highest_power_of_2(1500), 1024);
    }

    #[test]
    fn test_block_dimension() {
        assert_eq!(block_dimension(1024, 4000), 1024);
        assert_eq!(block_dimension(1024, 1000), 512);
        // tiny rasters still get a TIFF-valid tile dimension
        assert_eq!(block_dimension(1024, 10), 16);
    }

    #[test]
    fn test_resolve_bands() {
        assert_eq!(resolve_bands(&None, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(resolve_bands(&Some(vec![]), 2).unwrap(), vec![1, 2]);
        assert_eq!(resolve_bands(&Some(vec![2]), 3).unwrap(), vec![2]);
        assert!(matches!(
            resolve_bands(&Some(vec![4]), 3),
            Err(RastileError::InvalidBand(4, 3))
        ));
        assert!(matches!(
            resolve_bands(&Some(vec![0]), 3),
            Err(RastileError::InvalidBand(0, 3))
        ));
    }

    #[test]
    fn test_work_item_expansion() {
        let grid = WindowGrid::new(100, 100, 60, 60).unwrap();
        let stack = build_work_items(&grid, &[1, 3], false);
        assert_eq!(stack.len(), 4);
        assert_eq!(stack[0].in_bands, vec![1, 3]);
        assert_eq!(stack[0].out_bands, vec![1, 2]);

        let per_band = build_work_items(&grid, &[1, 3], true);
        assert_eq!(per_band.len(), 8);
        assert_eq!(per_band[0].in_bands, vec![1]);
        assert_eq!(per_band[0].out_bands, vec![1]);
        assert_eq!(per_band[1].in_bands, vec![3]);
        assert_eq!(per_band[1].out_bands, vec![2]);
    }
}
