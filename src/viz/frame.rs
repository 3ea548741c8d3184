//! Visualization sample frames.
//!
//! One [`SampleFrame`] is a single visualization tick: the live spectrum
//! collapsed into exactly [`BAND_COUNT`] band magnitudes, scaled to visual
//! units and floor-clamped so bars never collapse to zero height.
//!
//! # Example
//!
//! ```rust
//! use stream2pod::viz::{SampleFrame, BAND_COUNT, MAGNITUDE_FLOOR};
//!
//! let frame = SampleFrame::from_bins(&[0.0; 16]);
//! assert_eq!(frame.bands.len(), BAND_COUNT);
//! // Silence still renders visible bars at the floor height.
//! assert!(frame.bands.iter().all(|&b| b == MAGNITUDE_FLOOR));
//! ```

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Number of visualization bands per frame.
pub const BAND_COUNT: usize = 4;

/// Minimum band magnitude in visual units — bars never collapse below this.
pub const MAGNITUDE_FLOOR: f32 = 20.0;

/// Maximum band magnitude in visual units.
pub const MAGNITUDE_CEIL: f32 = 102.0;

// ---------------------------------------------------------------------------
// SampleFrame
// ---------------------------------------------------------------------------

/// One visualization tick: [`BAND_COUNT`] band magnitudes in
/// `[MAGNITUDE_FLOOR, MAGNITUDE_CEIL]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleFrame {
    pub bands: [f32; BAND_COUNT],
}

impl SampleFrame {
    /// Collapse a spectrum (bin magnitudes normalized to `[0.0, 1.0]`) into
    /// band magnitudes.
    ///
    /// The bins are split into [`BAND_COUNT`] contiguous groups; each band
    /// takes the peak magnitude of its group, scaled to visual units and
    /// clamped to `[MAGNITUDE_FLOOR, MAGNITUDE_CEIL]`.  Empty input yields a
    /// floor frame.
    pub fn from_bins(bins: &[f32]) -> Self {
        if bins.is_empty() {
            return Self::floor();
        }

        let chunk = (bins.len() + BAND_COUNT - 1) / BAND_COUNT;
        let mut bands = [MAGNITUDE_FLOOR; BAND_COUNT];

        for (b, band) in bands.iter_mut().enumerate() {
            let start = b * chunk;
            if start >= bins.len() {
                break;
            }
            let end = (start + chunk).min(bins.len());
            let peak = bins[start..end].iter().cloned().fold(0.0_f32, f32::max);
            *band = (peak * MAGNITUDE_CEIL).clamp(MAGNITUDE_FLOOR, MAGNITUDE_CEIL);
        }

        Self { bands }
    }

    /// A frame with every band at the floor magnitude — what bars show when
    /// nothing is playing.
    pub fn floor() -> Self {
        Self {
            bands: [MAGNITUDE_FLOOR; BAND_COUNT],
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_renders_floor_bars() {
        let frame = SampleFrame::from_bins(&[0.0; 16]);
        assert!(frame.bands.iter().all(|&b| b == MAGNITUDE_FLOOR));
    }

    #[test]
    fn hot_signal_clamps_to_ceiling() {
        let frame = SampleFrame::from_bins(&[1.0; 16]);
        assert!(frame.bands.iter().all(|&b| b == MAGNITUDE_CEIL));
    }

    #[test]
    fn single_hot_bin_raises_only_its_band() {
        let mut bins = [0.0_f32; 16];
        bins[0] = 1.0; // first group of four → band 0
        let frame = SampleFrame::from_bins(&bins);

        assert_eq!(frame.bands[0], MAGNITUDE_CEIL);
        assert!(frame.bands[1..].iter().all(|&b| b == MAGNITUDE_FLOOR));
    }

    #[test]
    fn band_takes_the_peak_of_its_group() {
        let mut bins = [0.0_f32; 8];
        bins[2] = 0.5; // second bin of band 1 (chunk = 2)
        bins[3] = 0.8;
        let frame = SampleFrame::from_bins(&bins);

        let expected = (0.8 * MAGNITUDE_CEIL).clamp(MAGNITUDE_FLOOR, MAGNITUDE_CEIL);
        assert!((frame.bands[1] - expected).abs() < 1e-4);
    }

    #[test]
    fn empty_bins_yield_floor_frame() {
        assert_eq!(SampleFrame::from_bins(&[]), SampleFrame::floor());
    }

    #[test]
    fn fewer_bins_than_bands_pads_with_floor() {
        let frame = SampleFrame::from_bins(&[1.0]);
        assert_eq!(frame.bands[0], MAGNITUDE_CEIL);
        assert!(frame.bands[1..].iter().all(|&b| b == MAGNITUDE_FLOOR));
    }

    #[test]
    fn magnitudes_stay_bounded_for_out_of_range_input() {
        let frame = SampleFrame::from_bins(&[4.0, -1.0, 0.3, 0.3]);
        for &b in &frame.bands {
            assert!((MAGNITUDE_FLOOR..=MAGNITUDE_CEIL).contains(&b), "band {b}");
        }
    }
}
