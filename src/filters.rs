use ndarray::{s, Array2, Array3};

use crate::error::{RastileError, Result};
use crate::processor::TileTransform;

fn check_kernel_size(kernel_size: usize) -> Result<()> {
    if kernel_size == 0 {
        return Err(RastileError::InvalidKernelSize(kernel_size));
    }
    Ok(())
}

/// Overlap every kernel filter requests around its tiles: half the kernel,
/// rounded up.
fn kernel_overlap(kernel_size: usize) -> usize {
    (kernel_size + 1) / 2
}

/// Median of the k x k neighborhood, skipping invalid (NaN) pixels.
pub struct MedianFilter {
    kernel_size: usize,
}

impl MedianFilter {
    pub fn new(kernel_size: usize) -> Result<Self> {
        check_kernel_size(kernel_size)?;
        Ok(Self { kernel_size })
    }
}

impl TileTransform for MedianFilter {
    fn name(&self) -> &str {
        "median"
    }

    fn required_overlap(&self) -> usize {
        kernel_overlap(self.kernel_size)
    }

    fn apply(&self, data: &Array3<f64>) -> Result<Array3<f64>> {
        let (bands, rows, cols) = data.dim();
        let k = self.kernel_size;
        // window offsets around the center pixel: k/2 before, (k-1)/2 after
        let lo = k / 2;
        let hi = (k - 1) / 2;

        let mut out = Array3::<f64>::zeros((bands, rows, cols));
        let mut values = Vec::with_capacity(k * k);
        for b in 0..bands {
            for r in 0..rows {
                let r0 = r.saturating_sub(lo);
                let r1 = (r + hi + 1).min(rows);
                for c in 0..cols {
                    let c0 = c.saturating_sub(lo);
                    let c1 = (c + hi + 1).min(cols);

                    values.clear();
                    for rr in r0..r1 {
                        for cc in c0..c1 {
                            let v = data[[b, rr, cc]];
                            if !v.is_nan() {
                                values.push(v);
                            }
                        }
                    }
                    out[[b, r, c]] = median_of(&mut values);
                }
            }
        }
        Ok(out)
    }
}

fn median_of(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Prefix-sum table with a zero first row/column, so any window sum is
/// four lookups. NaN contributes zero.
fn integral_image(band: ndarray::ArrayView2<'_, f64>) -> Array2<f64> {
    let (rows, cols) = band.dim();
    let mut ii = Array2::<f64>::zeros((rows + 1, cols + 1));
    for r in 0..rows {
        let mut row_sum = 0.0;
        for c in 0..cols {
            let v = band[[r, c]];
            if !v.is_nan() {
                row_sum += v;
            }
            ii[[r + 1, c + 1]] = ii[[r, c + 1]] + row_sum;
        }
    }
    ii
}

fn window_sum(ii: &Array2<f64>, r0: usize, r1: usize, c0: usize, c1: usize) -> f64 {
    ii[[r1, c1]] - ii[[r0, c1]] - ii[[r1, c0]] + ii[[r0, c0]]
}

/// Shared integral-image walk for the local sum and mean filters. For each
/// pixel far enough from the array border, hands the window bounds to `f`;
/// the uncomputed border stays zero and is trimmed off by the engine.
fn local_window_map<F>(band: ndarray::ArrayView2<'_, f64>, k: usize, mut f: F) -> Array2<f64>
where
    F: FnMut(&ndarray::ArrayView2<'_, f64>, usize, usize, usize, usize) -> f64,
{
    let (rows, cols) = band.dim();
    let mut out = Array2::<f64>::zeros((rows, cols));
    if k > rows || k > cols {
        return out;
    }
    let posd = (k + 1) / 2;
    let posf = k - posd;
    for r in posd..rows - posf {
        let r0 = r + 1 - posd;
        for c in posd..cols - posf {
            let c0 = c + 1 - posd;
            out[[r, c]] = f(&band, r0, r0 + k, c0, c0 + k);
        }
    }
    out
}

/// Sum of the k x k neighborhood, computed with an integral image.
/// Invalid (NaN) pixels count as zero.
pub struct LocalSum {
    kernel_size: usize,
}

impl LocalSum {
    pub fn new(kernel_size: usize) -> Result<Self> {
        check_kernel_size(kernel_size)?;
        Ok(Self { kernel_size })
    }
}

impl TileTransform for LocalSum {
    fn name(&self) -> &str {
        "sum"
    }

    fn required_overlap(&self) -> usize {
        kernel_overlap(self.kernel_size)
    }

    fn apply(&self, data: &Array3<f64>) -> Result<Array3<f64>> {
        let (bands, rows, cols) = data.dim();
        let k = self.kernel_size;
        let mut out = Array3::<f64>::zeros((bands, rows, cols));
        for b in 0..bands {
            let band = data.index_axis(ndarray::Axis(0), b);
            let result = if k == 1 {
                band.to_owned()
            } else {
                let ii = integral_image(band);
                local_window_map(band, k, |_, r0, r1, c0, c1| window_sum(&ii, r0, r1, c0, c1))
            };
            out.slice_mut(s![b, .., ..]).assign(&result);
        }
        Ok(out)
    }
}

/// Mean over the valid (non-NaN) pixels of the k x k neighborhood.
pub struct LocalMean {
    kernel_size: usize,
}

impl LocalMean {
    pub fn new(kernel_size: usize) -> Result<Self> {
        check_kernel_size(kernel_size)?;
        Ok(Self { kernel_size })
    }
}

impl TileTransform for LocalMean {
    fn name(&self) -> &str {
        "mean"
    }

    fn required_overlap(&self) -> usize {
        kernel_overlap(self.kernel_size)
    }

    fn apply(&self, data: &Array3<f64>) -> Result<Array3<f64>> {
        let (bands, rows, cols) = data.dim();
        let k = self.kernel_size;
        let mut out = Array3::<f64>::zeros((bands, rows, cols));
        for b in 0..bands {
            let band = data.index_axis(ndarray::Axis(0), b);
            let result = if k == 1 {
                band.to_owned()
            } else {
                let ii = integral_image(band);
                let valid = integral_image(
                    band.mapv(|v| if v.is_nan() { 0.0 } else { 1.0 }).view(),
                );
                local_window_map(band, k, |_, r0, r1, c0, c1| {
                    let count = window_sum(&valid, r0, r1, c0, c1);
                    if count > 0.0 {
                        window_sum(&ii, r0, r1, c0, c1) / count
                    } else {
                        0.0
                    }
                })
            };
            out.slice_mut(s![b, .., ..]).assign(&result);
        }
        Ok(out)
    }
}

/// Edge-preserving smoothing: per-pixel weights from local gradients, then
/// `kernel_size` rounds of 3x3 weighted averaging with a symmetric
/// boundary. Runs per band.
pub struct AdaptiveGaussian {
    kernel_size: usize,
    sigma: f64,
}

impl AdaptiveGaussian {
    pub fn new(kernel_size: usize, sigma: f64) -> Result<Self> {
        check_kernel_size(kernel_size)?;
        if sigma <= 0.0 {
            return Err(RastileError::InvalidParameter {
                name: "sigma",
                value: sigma,
            });
        }
        Ok(Self { kernel_size, sigma })
    }
}

/// 3x3 box convolution with a symmetric boundary (same-size output).
fn convolve3x3_symmetric(input: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = input.dim();
    let mut out = Array2::<f64>::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let mut acc = 0.0;
            for dr in -1isize..=1 {
                for dc in -1isize..=1 {
                    let rr = (r as isize + dr).clamp(0, rows as isize - 1) as usize;
                    let cc = (c as isize + dc).clamp(0, cols as isize - 1) as usize;
                    acc += input[[rr, cc]];
                }
            }
            out[[r, c]] = acc;
        }
    }
    out
}

impl TileTransform for AdaptiveGaussian {
    fn name(&self) -> &str {
        "adaptive_gaussian"
    }

    fn per_band(&self) -> bool {
        true
    }

    fn required_overlap(&self) -> usize {
        kernel_overlap(self.kernel_size)
    }

    fn apply(&self, data: &Array3<f64>) -> Result<Array3<f64>> {
        let (bands, rows, cols) = data.dim();
        if bands != 1 {
            return Err(RastileError::ShapeMismatch {
                expected: (1, rows, cols),
                actual: data.dim(),
            });
        }
        if rows < 3 || cols < 3 {
            return Ok(data.clone());
        }
        let band = data.index_axis(ndarray::Axis(0), 0);

        // squared horizontal and vertical gradients over a 2-pixel span
        let mut weights = Array2::<f64>::zeros((rows - 2, cols - 2));
        for r in 0..rows - 2 {
            for c in 0..cols - 2 {
                let gx = band[[r + 1, c]] - band[[r + 1, c + 2]];
                let gy = band[[r, c + 1]] - band[[r + 2, c + 1]];
                weights[[r, c]] =
                    (-(gx * gx + gy * gy) / (2.0 * self.sigma * self.sigma)).exp();
            }
        }
        let mut weight_sum = convolve3x3_symmetric(&weights);
        weight_sum.mapv_inplace(|v| v + f64::EPSILON);

        let mut out = data.clone();
        for _ in 0..self.kernel_size {
            let interior = out.slice(s![0, 1..rows - 1, 1..cols - 1]).to_owned();
            let conv = convolve3x3_symmetric(&(&weights * &interior));
            out.slice_mut(s![0, 1..rows - 1, 1..cols - 1])
                .assign(&(&conv / &weight_sum));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn band(values: Array2<f64>) -> Array3<f64> {
        let (h, w) = values.dim();
        values.into_shape_with_order((1, h, w)).unwrap()
    }

    #[test]
    fn test_median_flat() {
        let data = band(Array2::from_elem((5, 5), 3.0));
        let out = MedianFilter::new(3).unwrap().apply(&data).unwrap();
        assert!(out.iter().all(|&v| v == 3.0));
    }

    #[test]
    fn test_median_center() {
        let data = band(arr2(&[
            [1.0, 2.0, 3.0],
            [4.0, 100.0, 6.0],
            [7.0, 8.0, 9.0],
        ]));
        let out = MedianFilter::new(3).unwrap().apply(&data).unwrap();
        // median of 1..9 with the outlier in place of 5
        assert_eq!(out[[0, 1, 1]], 6.0);
    }

    #[test]
    fn test_median_skips_nan() {
        let data = band(arr2(&[
            [1.0, f64::NAN, 3.0],
            [4.0, 5.0, 6.0],
            [7.0, 8.0, 9.0],
        ]));
        let out = MedianFilter::new(3).unwrap().apply(&data).unwrap();
        // eight valid values: median = (5+6)/2
        assert_eq!(out[[0, 1, 1]], 5.5);
    }

    #[test]
    fn test_local_sum_centered_window() {
        let data = band(Array2::from_elem((7, 7), 1.0));
        let out = LocalSum::new(3).unwrap().apply(&data).unwrap();
        // interior pixels see the full 3x3 window
        assert_eq!(out[[0, 3, 3]], 9.0);
        // the uncomputed border stays zero
        assert_eq!(out[[0, 0, 0]], 0.0);
        assert_eq!(out[[0, 6, 6]], 0.0);
    }

    #[test]
    fn test_local_sum_kernel_one_is_identity() {
        let data = band(arr2(&[[1.0, 2.0], [3.0, 4.0]]));
        let out = LocalSum::new(1).unwrap().apply(&data).unwrap();
        assert_eq!(out, band(arr2(&[[1.0, 2.0], [3.0, 4.0]])));
    }

    #[test]
    fn test_local_mean_excludes_nan_from_denominator() {
        let mut flat = Array2::from_elem((7, 7), 2.0);
        flat[[3, 4]] = f64::NAN;
        let data = band(flat);
        let out = LocalMean::new(3).unwrap().apply(&data).unwrap();
        // window with the NaN: 8 valid pixels of value 2 -> mean still 2
        assert!((out[[0, 3, 3]] - 2.0).abs() < 1e-12);
        assert!((out[[0, 5, 5]] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_adaptive_gaussian_uniform_fixed_point() {
        let data = band(Array2::from_elem((8, 8), 5.0));
        let out = AdaptiveGaussian::new(4, 1.0).unwrap().apply(&data).unwrap();
        for &v in out.iter() {
            assert!((v - 5.0).abs() < 1e-9, "value drifted: {v}");
        }
    }

    #[test]
    fn test_adaptive_gaussian_requires_single_band() {
        let data = Array3::<f64>::zeros((2, 8, 8));
        assert!(AdaptiveGaussian::new(4, 1.0).unwrap().apply(&data).is_err());
    }

    #[test]
    fn test_invalid_kernel_size() {
        assert!(MedianFilter::new(0).is_err());
        assert!(LocalSum::new(0).is_err());
        assert!(AdaptiveGaussian::new(4, 0.0).is_err());
    }

    #[test]
    fn test_required_overlap() {
        assert_eq!(MedianFilter::new(8).unwrap().required_overlap(), 4);
        assert_eq!(LocalSum::new(3).unwrap().required_overlap(), 2);
    }
}
