use std::path::Path;
use std::sync::Mutex;

use gdal::cpl::CslStringList;
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager};
use log::{debug, info};
use ndarray::Array3;

use crate::error::{RastileError, Result};
use crate::grid::Tile;
use crate::padding::PaddedWindow;

/// Geospatial metadata of a source raster, captured once before dispatch.
#[derive(Debug, Clone)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    pub count: usize,
    pub geotransform: [f64; 6],
    pub projection: String,
    pub nodata: Option<f64>,
}

pub fn open_source(path: &Path) -> Result<Dataset> {
    info!("Opening input raster: {}", path.display());
    Ok(Dataset::open(path)?)
}

pub fn extract_metadata(dataset: &Dataset) -> Result<RasterMetadata> {
    let rasterband = dataset.rasterband(1)?;

    let width = rasterband.x_size();
    let height = rasterband.y_size();
    if width == 0 || height == 0 {
        return Err(RastileError::InvalidDimensions(width, height));
    }

    Ok(RasterMetadata {
        width,
        height,
        count: dataset.raster_count(),
        geotransform: dataset.geo_transform()?,
        projection: dataset.projection(),
        nodata: rasterband.no_data_value(),
    })
}

/// Read the clipped region of a padded window for the given 1-based bands.
/// Nodata pixels are mapped to NaN so transforms can ignore them uniformly.
pub fn read_padded_window(
    dataset: &Dataset,
    window: &PaddedWindow,
    bands: &[usize],
    nodata: Option<f64>,
) -> Result<Array3<f64>> {
    let read_width = window.read_width();
    let read_height = window.read_height();

    debug!(
        "Reading window: offset=({},{}), size=({},{}), bands={:?}",
        window.read_col_start, window.read_row_start, read_width, read_height, bands
    );

    let mut data = Array3::<f64>::zeros((bands.len(), read_height, read_width));
    for (i, &band_index) in bands.iter().enumerate() {
        let rasterband = dataset.rasterband(band_index)?;
        let buffer = rasterband.read_as::<f64>(
            (window.read_col_start as isize, window.read_row_start as isize),
            (read_width, read_height),
            (read_width, read_height),
            None,
        )?;

        let mut band = data.index_axis_mut(ndarray::Axis(0), i);
        for (dst, &src) in band.iter_mut().zip(buffer.data().iter()) {
            *dst = match nodata {
                Some(nd) if src == nd => f64::NAN,
                _ => src,
            };
        }
    }

    Ok(data)
}

/// Pixel type of the destination raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDtype {
    UInt8,
    Float32,
    Float64,
}

/// Destination raster layout, computed once before dispatch and applied
/// uniformly to every tile write.
#[derive(Debug, Clone)]
pub struct OutputDescriptor {
    pub dtype: OutputDtype,
    pub nodata: f64,
    pub band_count: usize,
    pub compression: String,
    pub block_size: (usize, usize),
}

pub fn validate_compression(compression: &str) -> Result<()> {
    let valid_types = ["DEFLATE", "LZW", "ZSTD", "NONE"];
    if !valid_types.contains(&compression) {
        return Err(RastileError::InvalidCompression(compression.to_string()));
    }
    Ok(())
}

impl OutputDescriptor {
    fn creation_options(&self) -> Vec<String> {
        vec![
            format!("COMPRESS={}", self.compression),
            "TILED=YES".to_string(),
            format!("BLOCKXSIZE={}", self.block_size.0),
            format!("BLOCKYSIZE={}", self.block_size.1),
            "BIGTIFF=IF_SAFER".to_string(),
        ]
    }
}

/// Destination raster plus the single write path through which every tile
/// result is committed. The dataset handle is owned exclusively here; all
/// writes serialize on the internal lock so concurrent tile completions
/// cannot interleave block writes.
pub struct OutputAssembler {
    dataset: Mutex<Dataset>,
    descriptor: OutputDescriptor,
}

impl OutputAssembler {
    /// Create the destination raster with the descriptor's layout and the
    /// source's (or caller-supplied) geotransform and projection.
    pub fn create(
        path: &Path,
        metadata: &RasterMetadata,
        descriptor: OutputDescriptor,
    ) -> Result<Self> {
        info!("Creating output raster: {}", path.display());
        validate_compression(&descriptor.compression)?;

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut options = CslStringList::new();
        for opt in descriptor.creation_options() {
            options.add_string(&opt)?;
        }

        let mut dataset = match descriptor.dtype {
            OutputDtype::UInt8 => driver.create_with_band_type_with_options::<u8, _>(
                path,
                metadata.width,
                metadata.height,
                descriptor.band_count,
                &options,
            )?,
            OutputDtype::Float32 => driver.create_with_band_type_with_options::<f32, _>(
                path,
                metadata.width,
                metadata.height,
                descriptor.band_count,
                &options,
            )?,
            OutputDtype::Float64 => driver.create_with_band_type_with_options::<f64, _>(
                path,
                metadata.width,
                metadata.height,
                descriptor.band_count,
                &options,
            )?,
        };

        dataset.set_geo_transform(&metadata.geotransform)?;
        dataset.set_projection(&metadata.projection)?;
        for band_index in 1..=descriptor.band_count {
            let mut band = dataset.rasterband(band_index)?;
            band.set_no_data_value(Some(descriptor.nodata))?;
        }

        Ok(Self {
            dataset: Mutex::new(dataset),
            descriptor,
        })
    }

    pub fn descriptor(&self) -> &OutputDescriptor {
        &self.descriptor
    }

    /// Write a trimmed tile result into its output position. `out_bands`
    /// are the 1-based destination band indexes, one per band of `data`.
    /// Never writes outside the tile's extent.
    pub fn write_tile(&self, tile: &Tile, data: &Array3<f64>, out_bands: &[usize]) -> Result<()> {
        let (bands, rows, cols) = data.dim();
        if rows != tile.height() || cols != tile.width() || bands != out_bands.len() {
            return Err(RastileError::ShapeMismatch {
                expected: (out_bands.len(), tile.height(), tile.width()),
                actual: (bands, rows, cols),
            }
            .for_tile(*tile));
        }
        for &b in out_bands {
            if b < 1 || b > self.descriptor.band_count {
                return Err(
                    RastileError::InvalidBand(b, self.descriptor.band_count).for_tile(*tile)
                );
            }
        }

        let nodata = self.descriptor.nodata;
        let offset = (tile.col_start as isize, tile.row_start as isize);
        let size = (tile.width(), tile.height());

        let mut dataset = self.dataset.lock().expect("output lock poisoned");
        for (i, &band_index) in out_bands.iter().enumerate() {
            let band_data = data.index_axis(ndarray::Axis(0), i);
            let values: Vec<f64> = band_data
                .iter()
                .map(|&v| if v.is_nan() { nodata } else { v })
                .collect();

            let mut rasterband = dataset.rasterband(band_index)?;
            match self.descriptor.dtype {
                OutputDtype::UInt8 => {
                    let mut buffer =
                        Buffer::new(size, values.into_iter().map(|v| v as u8).collect());
                    rasterband.write(offset, size, &mut buffer)?;
                }
                OutputDtype::Float32 => {
                    let mut buffer =
                        Buffer::new(size, values.into_iter().map(|v| v as f32).collect());
                    rasterband.write(offset, size, &mut buffer)?;
                }
                OutputDtype::Float64 => {
                    let mut buffer = Buffer::new(size, values);
                    rasterband.write(offset, size, &mut buffer)?;
                }
            }
        }

        debug!(
            "Wrote tile at ({},{}) size {}x{} to bands {:?}",
            tile.col_start,
            tile.row_start,
            size.0,
            size.1,
            out_bands
        );
        Ok(())
    }

    /// Flush and close the destination, consuming the assembler.
    pub fn finish(self) -> Result<()> {
        let mut dataset = self.dataset.into_inner().expect("output lock poisoned");
        dataset.flush_cache()?;
        Ok(())
    }
}
