use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use gdal::Dataset;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};
use rayon::prelude::*;

use crate::error::{RastileError, Result};
use crate::grid::Tile;
use crate::io::{self, OutputAssembler};
use crate::padding::{pad_window, EdgePolicy, PaddedWindow};
use crate::processor::{process_tile, TileTransform};

/// Environment variable overriding the worker count.
pub const MAX_WORKERS_ENV: &str = "RASTILE_MAX_WORKERS";
/// Environment variable disabling the progress bar ("1" or "true").
pub const NO_PROGRESS_ENV: &str = "RASTILE_NO_PROGRESS";

/// One unit of work: a tile together with the source bands it reads and
/// the destination bands its result lands in. Per-band transforms get one
/// item per (tile, band) pair.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub tile: Tile,
    pub in_bands: Vec<usize>,
    pub out_bands: Vec<usize>,
}

/// Resolve the effective worker count: explicit request, then the
/// `RASTILE_MAX_WORKERS` environment variable, then all available cores.
pub fn resolve_worker_count(requested: Option<usize>) -> Result<usize> {
    if let Some(n) = requested {
        if n == 0 {
            return Err(RastileError::InvalidWorkerCount(0));
        }
        return Ok(n);
    }
    if let Ok(value) = env::var(MAX_WORKERS_ENV) {
        match value.parse::<usize>() {
            Ok(n) if n > 0 => return Ok(n),
            _ => warn!("Ignoring invalid {}={}", MAX_WORKERS_ENV, value),
        }
    }
    Ok(std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1))
}

fn progress_bar(total: u64) -> ProgressBar {
    let disabled = env::var(NO_PROGRESS_ENV)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true"))
        .unwrap_or(false);
    let bar = if disabled {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total)
    };
    bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tiles")
            .expect("invalid progress template")
            .progress_chars("#>-"),
    );
    bar
}

/// Everything a worker needs to run one item end to end. The source handle
/// is behind a lock because the raster driver does not support concurrent
/// reads from one handle; the destination lock lives inside the assembler.
pub struct DispatchContext<'a> {
    pub source: &'a Mutex<Dataset>,
    pub assembler: &'a OutputAssembler,
    pub transform: &'a dyn TileTransform,
    pub raster_width: usize,
    pub raster_height: usize,
    pub radius: usize,
    pub policy: EdgePolicy,
    pub nodata: Option<f64>,
}

fn run_item(ctx: &DispatchContext<'_>, item: &WorkItem) -> Result<()> {
    let window = PaddedWindow::new(item.tile, ctx.radius, ctx.raster_width, ctx.raster_height);

    // Hold the read lock only for the raw pixel read
    let read = {
        let source = ctx.source.lock().expect("source lock poisoned");
        io::read_padded_window(&source, &window, &item.in_bands, ctx.nodata)
            .map_err(|e| e.for_tile(item.tile))?
    };

    let padded = pad_window(read, &window, ctx.policy);
    let trimmed = process_tile(ctx.transform, &padded, &window, ctx.policy)?;
    ctx.assembler.write_tile(&item.tile, &trimmed, &item.out_bands)
}

/// Run every work item with up to `workers` parallel workers. Tile results
/// may complete in any order; the partition guarantees their writes never
/// overlap, so the output is identical for any worker count.
///
/// On the first failure no new items are started; items already running
/// finish (and commit their writes) before the tagged error is returned.
/// The optional `cancel` flag stops dispatch cooperatively.
pub fn run(
    ctx: &DispatchContext<'_>,
    items: &[WorkItem],
    workers: usize,
    cancel: Option<&AtomicBool>,
) -> Result<()> {
    if workers == 0 {
        return Err(RastileError::InvalidWorkerCount(0));
    }

    debug!("Dispatching {} work items on {} worker(s)", items.len(), workers);
    let progress = progress_bar(items.len() as u64);
    let failed = AtomicBool::new(false);
    let first_error: Mutex<Option<RastileError>> = Mutex::new(None);

    let execute = |item: &WorkItem| {
        if failed.load(Ordering::SeqCst)
            || cancel.map(|c| c.load(Ordering::SeqCst)).unwrap_or(false)
        {
            return;
        }
        match run_item(ctx, item) {
            Ok(()) => progress.inc(1),
            Err(e) => {
                failed.store(true, Ordering::SeqCst);
                let mut slot = first_error.lock().expect("error slot poisoned");
                slot.get_or_insert(e);
            }
        }
    };

    if workers == 1 {
        items.iter().for_each(execute);
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .expect("failed to build worker pool");
        pool.install(|| items.par_iter().for_each(execute));
    }
    progress.finish_and_clear();

    if let Some(e) = first_error.into_inner().expect("error slot poisoned") {
        return Err(e);
    }
    if cancel.map(|c| c.load(Ordering::SeqCst)).unwrap_or(false) {
        return Err(RastileError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_worker_count() {
        assert_eq!(resolve_worker_count(Some(4)).unwrap(), 4);
        assert!(matches!(
            resolve_worker_count(Some(0)),
            Err(RastileError::InvalidWorkerCount(0))
        ));
    }

    #[test]
    fn test_default_worker_count_positive() {
        // no explicit request: whatever the fallback resolves to, it is
        // a usable pool size
        if env::var(MAX_WORKERS_ENV).is_err() {
            assert!(resolve_worker_count(None).unwrap() >= 1);
        }
    }
}
