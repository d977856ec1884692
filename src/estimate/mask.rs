//! Frequency-domain fit mask.
//!
//! The plane fit runs over an annular, half-plane subset of the shifted
//! spectrum: the DC bin carries no shift information, bins beyond the fit
//! radius are noise-dominated, and the lower half-plane duplicates the upper
//! one for real inputs (Hermitian symmetry).

/// Masked bin set in centered frequency coordinates.
#[derive(Clone, Debug)]
pub struct SpectrumMask {
    kernel_width: usize,
    max_radius: usize,
    bins: Vec<(i32, i32)>,
}

impl SpectrumMask {
    /// Builds the annular half-plane mask for a kernel and fit radius.
    ///
    /// Included bins satisfy `1 <= |f| <= max_radius` and lie in the
    /// half-plane `fx > 0 || (fx == 0 && fy > 0)`.
    pub fn annular_half_plane(kernel_width: usize, max_radius: usize) -> Self {
        let half = (kernel_width / 2) as i32;
        let radius = max_radius as i32;
        let r2_max = radius * radius;
        let mut bins = Vec::new();
        for fy in -half..half {
            for fx in -half..half {
                let r2 = fx * fx + fy * fy;
                if r2 < 1 || r2 > r2_max {
                    continue;
                }
                if fx > 0 || (fx == 0 && fy > 0) {
                    bins.push((fx, fy));
                }
            }
        }
        Self {
            kernel_width,
            max_radius,
            bins,
        }
    }

    /// Kernel width the mask was built for.
    pub fn kernel_width(&self) -> usize {
        self.kernel_width
    }

    /// Fit radius the mask was built for.
    pub fn max_radius(&self) -> usize {
        self.max_radius
    }

    /// Included bins as centered `(fx, fy)` coordinates.
    pub fn bins(&self) -> &[(i32, i32)] {
        &self.bins
    }

    /// Number of included bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// True when the mask selects no bins.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::SpectrumMask;

    #[test]
    fn mask_excludes_dc_and_far_bins() {
        let mask = SpectrumMask::annular_half_plane(32, 8);
        assert!(!mask.is_empty());
        for &(fx, fy) in mask.bins() {
            let r2 = fx * fx + fy * fy;
            assert!(r2 >= 1);
            assert!(r2 <= 64);
            assert!(fx > 0 || (fx == 0 && fy > 0));
        }
    }

    #[test]
    fn mask_covers_half_the_annulus() {
        let mask = SpectrumMask::annular_half_plane(32, 8);
        // Half-plane of an origin-symmetric annulus holds exactly half its bins.
        let full: i32 = {
            let mut count = 0;
            for fy in -16i32..16 {
                for fx in -16i32..16 {
                    let r2 = fx * fx + fy * fy;
                    if (1..=64).contains(&r2) {
                        count += 1;
                    }
                }
            }
            count
        };
        assert_eq!(mask.len() as i32 * 2, full);
    }

    #[test]
    fn tiny_radius_yields_empty_mask() {
        let mask = SpectrumMask::annular_half_plane(16, 0);
        assert!(mask.is_empty());
    }
}
