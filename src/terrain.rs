use ndarray::{s, Array2, Array3};

use crate::error::{RastileError, Result};
use crate::processor::TileTransform;

/// Points of a Bresenham line from the origin toward angle `theta`
/// (degrees), up to `radius` pixels away. Each point carries its
/// (row, col) offset and distance from the origin; the origin itself is
/// not included.
fn bresenham_line(theta: f64, radius: usize) -> Vec<(isize, isize, f64)> {
    let mut pts = Vec::new();
    if radius == 0 {
        return pts;
    }
    let radius = radius as f64;

    let dx = theta.to_radians().cos();
    let dy = theta.to_radians().sin();
    let sx: isize = if dx < 0.0 { -1 } else { 1 };
    let sy: isize = if dy < 0.0 { -1 } else { 1 };

    let (mut x, mut y): (isize, isize) = (0, 0);
    let mut r = 0.0;
    let mut err = 0.0;
    if dx.abs() > dy.abs() {
        let delta = theta.to_radians().tan().abs();
        while r < radius {
            x += sx;
            err += delta;
            if err > 0.5 {
                y += sy;
                err -= 1.0;
            }
            r = ((x * x + y * y) as f64).sqrt();
            pts.push((x, y, r));
        }
    } else {
        let delta = (90.0 - theta).to_radians().tan().abs();
        while r < radius {
            y += sy;
            err += delta;
            if err > 0.5 {
                x += sx;
                err -= 1.0;
            }
            r = ((x * x + y * y) as f64).sqrt();
            pts.push((x, y, r));
        }
    }
    pts
}

/// For each interior pixel, the largest elevation-angle tangent toward any
/// point of the given ray. `band` must have NaN already mapped to 0.
fn max_tangent_along(
    band: &Array2<f64>,
    axis: &[(isize, isize, f64)],
    radius: usize,
    resolution: f64,
    view: &Array2<f64>,
) -> Array2<f64> {
    let (rows, cols) = band.dim();
    let mut ratios = Array2::<f64>::zeros((rows - 2 * radius, cols - 2 * radius));
    for &(x_tr, y_tr, r) in axis {
        let r0 = (radius as isize + x_tr) as usize;
        let c0 = (radius as isize + y_tr) as usize;
        let shifted = band.slice(s![
            r0..r0 + rows - 2 * radius,
            c0..c0 + cols - 2 * radius
        ]);
        let scale = r * resolution;
        ndarray::Zip::from(&mut ratios)
            .and(&shifted)
            .and(view)
            .for_each(|ratio, &s, &v| {
                let tangent = (s - v) / scale;
                if tangent > *ratio {
                    *ratio = tangent;
                }
            });
    }
    ratios
}

/// Binary cast-shadow mask of a digital height model under a given sun
/// position. A pixel is shadowed when the horizon angle toward the sun
/// exceeds the sun's elevation.
pub struct Hillshade {
    elevation: f64,
    azimuth: f64,
    radius: usize,
    resolution: f64,
}

impl Hillshade {
    pub fn new(elevation: f64, azimuth: f64, radius: usize, resolution: f64) -> Result<Self> {
        if !(0.0..=90.0).contains(&elevation) {
            return Err(RastileError::InvalidParameter {
                name: "elevation",
                value: elevation,
            });
        }
        if radius == 0 {
            return Err(RastileError::InvalidParameter {
                name: "radius",
                value: 0.0,
            });
        }
        if resolution <= 0.0 {
            return Err(RastileError::InvalidParameter {
                name: "resolution",
                value: resolution,
            });
        }
        Ok(Self {
            elevation,
            azimuth,
            radius,
            resolution,
        })
    }

    /// Radius (in pixels) beyond which no terrain can shadow a pixel,
    /// derived from the model's altitude range and the sun elevation.
    pub fn derive_radius(
        min_altitude: f64,
        max_altitude: f64,
        elevation: f64,
        resolution: f64,
    ) -> Result<usize> {
        if elevation <= 0.0 || elevation >= 90.0 {
            return Err(RastileError::InvalidParameter {
                name: "elevation",
                value: elevation,
            });
        }
        let reach = (max_altitude - min_altitude) / (elevation.to_radians().tan() * resolution);
        Ok(reach.ceil().max(1.0) as usize)
    }
}

impl TileTransform for Hillshade {
    fn name(&self) -> &str {
        "hillshade"
    }

    fn per_band(&self) -> bool {
        true
    }

    fn required_overlap(&self) -> usize {
        self.radius
    }

    fn apply(&self, data: &Array3<f64>) -> Result<Array3<f64>> {
        let (bands, rows, cols) = data.dim();
        if bands != 1 {
            return Err(RastileError::ShapeMismatch {
                expected: (1, rows, cols),
                actual: data.dim(),
            });
        }
        let radius = self.radius;
        let mut out = Array3::<f64>::zeros((1, rows, cols));
        if rows <= 2 * radius || cols <= 2 * radius {
            return Ok(out);
        }

        let band = data
            .index_axis(ndarray::Axis(0), 0)
            .mapv(|v| if v.is_nan() { 0.0 } else { v });
        let view = band
            .slice(s![radius..rows - radius, radius..cols - radius])
            .to_owned();

        // single ray pointing away from the sun
        let axis = bresenham_line(180.0 - self.azimuth, radius);
        let ratios = max_tangent_along(&band, &axis, radius, self.resolution, &view);

        let threshold = self.elevation.to_radians();
        let shadow = ratios.mapv(|t| if t.atan() > threshold { 1.0 } else { 0.0 });
        out.slice_mut(s![0, radius..rows - radius, radius..cols - radius])
            .assign(&shadow);
        Ok(out)
    }
}

/// Sky view factor of a digital height model: the fraction of the sky
/// visible above each pixel, estimated from the horizon angle along a
/// configurable number of directions.
pub struct SkyViewFactor {
    radius: usize,
    directions: usize,
    resolution: f64,
    altitude: Option<f64>,
}

impl SkyViewFactor {
    pub fn new(
        radius: usize,
        directions: usize,
        resolution: f64,
        altitude: Option<f64>,
    ) -> Result<Self> {
        if radius == 0 {
            return Err(RastileError::InvalidParameter {
                name: "radius",
                value: 0.0,
            });
        }
        if directions == 0 {
            return Err(RastileError::InvalidParameter {
                name: "directions",
                value: 0.0,
            });
        }
        if resolution <= 0.0 {
            return Err(RastileError::InvalidParameter {
                name: "resolution",
                value: resolution,
            });
        }
        Ok(Self {
            radius,
            directions,
            resolution,
            altitude,
        })
    }
}

impl TileTransform for SkyViewFactor {
    fn name(&self) -> &str {
        "svf"
    }

    fn per_band(&self) -> bool {
        true
    }

    fn required_overlap(&self) -> usize {
        self.radius
    }

    fn apply(&self, data: &Array3<f64>) -> Result<Array3<f64>> {
        let (bands, rows, cols) = data.dim();
        if bands != 1 {
            return Err(RastileError::ShapeMismatch {
                expected: (1, rows, cols),
                actual: data.dim(),
            });
        }
        let radius = self.radius;
        let mut out = Array3::<f64>::zeros((1, rows, cols));
        if rows <= 2 * radius || cols <= 2 * radius {
            return Ok(out);
        }

        let band = data
            .index_axis(ndarray::Axis(0), 0)
            .mapv(|v| if v.is_nan() { 0.0 } else { v });

        // elevation angles are measured either from each pixel's own
        // altitude or from a fixed reference altitude
        let view = match self.altitude {
            Some(altitude) => {
                Array2::from_elem((rows - 2 * radius, cols - 2 * radius), altitude)
            }
            None => band
                .slice(s![radius..rows - radius, radius..cols - radius])
                .to_owned(),
        };

        let mut accumulated = Array2::<f64>::zeros((rows - 2 * radius, cols - 2 * radius));
        for i in 0..self.directions {
            let theta = 360.0 * i as f64 / self.directions as f64;
            let axis = bresenham_line(theta, radius);
            let ratios = max_tangent_along(&band, &axis, radius, self.resolution, &view);
            // visible sky portion in this direction: cos of the horizon
            // angle, via cos = 1/sqrt(1 + tan^2)
            accumulated += &ratios.mapv(|t| 1.0 / (t * t + 1.0).sqrt());
        }
        accumulated /= self.directions as f64;

        out.slice_mut(s![0, radius..rows - radius, radius..cols - radius])
            .assign(&accumulated);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bresenham_east() {
        // theta 0: straight along +x, radius points
        let pts = bresenham_line(0.0, 4);
        assert_eq!(pts.len(), 4);
        for (i, &(x, y, r)) in pts.iter().enumerate() {
            assert_eq!(x, i as isize + 1);
            assert_eq!(y, 0);
            assert_relative_eq!(r, (i + 1) as f64);
        }
    }

    #[test]
    fn test_bresenham_diagonal() {
        let pts = bresenham_line(45.0, 8);
        assert!(!pts.is_empty());
        // every point stays within the radius plus one step
        for &(x, y, r) in &pts {
            assert!(x.unsigned_abs() <= 8 && y.unsigned_abs() <= 8);
            assert_relative_eq!(r, ((x * x + y * y) as f64).sqrt());
        }
        // a 45 degree line advances both coordinates together
        let &(x, y, _) = pts.last().unwrap();
        assert!((x - y).abs() <= 1);
    }

    #[test]
    fn test_bresenham_zero_radius() {
        assert!(bresenham_line(90.0, 0).is_empty());
    }

    #[test]
    fn test_svf_flat_terrain_sees_full_sky() {
        let data = Array3::<f64>::zeros((1, 20, 20));
        let svf = SkyViewFactor::new(5, 8, 1.0, None).unwrap();
        let out = svf.apply(&data).unwrap();
        // interior of a flat model: no horizon obstruction in any direction
        for r in 5..15 {
            for c in 5..15 {
                assert_relative_eq!(out[[0, r, c]], 1.0, epsilon = 1e-12);
            }
        }
        // the uncomputed ring stays zero and is trimmed by the engine
        assert_eq!(out[[0, 0, 0]], 0.0);
    }

    #[test]
    fn test_svf_next_to_wall_is_reduced() {
        let mut data = Array3::<f64>::zeros((1, 20, 20));
        // tall north-south wall through the middle
        for r in 0..20 {
            data[[0, r, 10]] = 50.0;
        }
        let svf = SkyViewFactor::new(4, 8, 1.0, None).unwrap();
        let out = svf.apply(&data).unwrap();
        assert!(out[[0, 10, 9]] < 0.9);
        assert!(out[[0, 10, 9]] > 0.0);
    }

    #[test]
    fn test_hillshade_wall_casts_shadow() {
        let mut data = Array3::<f64>::zeros((1, 24, 24));
        for r in 0..24 {
            data[[0, r, 12]] = 30.0;
        }
        // sun low in the east: pixels west of the wall are shadowed
        let hillshade = Hillshade::new(10.0, 90.0, 6, 1.0).unwrap();
        let out = hillshade.apply(&data).unwrap();
        assert_eq!(out[[0, 12, 10]], 1.0);
        // far side of the wall is lit
        assert_eq!(out[[0, 12, 17]], 0.0);
    }

    #[test]
    fn test_flat_terrain_has_no_shadow() {
        let data = Array3::<f64>::zeros((1, 24, 24));
        let hillshade = Hillshade::new(45.0, 315.0, 6, 1.0).unwrap();
        let out = hillshade.apply(&data).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_derive_radius() {
        // 100 m of relief at 45 degrees and 1 m pixels reaches 100 pixels
        assert_eq!(Hillshade::derive_radius(0.0, 100.0, 45.0, 1.0).unwrap(), 100);
        // shallower sun reaches further
        assert!(Hillshade::derive_radius(0.0, 100.0, 10.0, 1.0).unwrap() > 100);
        assert!(Hillshade::derive_radius(0.0, 100.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(Hillshade::new(100.0, 0.0, 8, 1.0).is_err());
        assert!(Hillshade::new(45.0, 0.0, 0, 1.0).is_err());
        assert!(SkyViewFactor::new(0, 8, 1.0, None).is_err());
        assert!(SkyViewFactor::new(8, 0, 1.0, None).is_err());
    }
}
