//! Linear interpolation of tabulated optical constants.
//!
//! Tabulated $(n, k)$ data is only known at discrete wavelengths. Between two
//! samples both components are interpolated linearly; outside the tabulated
//! range the nearest boundary sample is returned unchanged (no extrapolation).

use num_complex::Complex64;

use crate::provider::MaterialError;
use crate::sample::OpticalSample;

/// Resolve $\tilde{n} = n + ik$ at `wavelength_nm` from a wavelength-sorted
/// sample table.
///
/// # Errors
/// [`MaterialError::InvalidArgument`] if `samples` is empty or the wavelength
/// is not finite.
pub fn interpolate(
    samples: &[OpticalSample],
    wavelength_nm: f64,
) -> Result<Complex64, MaterialError> {
    let (first, last) = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(MaterialError::InvalidArgument(
                "cannot interpolate an empty sample table".into(),
            ))
        }
    };
    if !wavelength_nm.is_finite() {
        return Err(MaterialError::InvalidArgument(format!(
            "wavelength must be finite, got {}",
            wavelength_nm
        )));
    }

    if wavelength_nm <= first.wavelength_nm {
        return Ok(first.refractive_index());
    }
    if wavelength_nm >= last.wavelength_nm {
        return Ok(last.refractive_index());
    }

    // Binary search for the enclosing interval; first < λ < last holds here.
    let mut lo = 0;
    let mut hi = samples.len() - 1;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if samples[mid].wavelength_nm > wavelength_nm {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    let below = &samples[lo];
    let above = &samples[hi];
    if below.wavelength_nm == wavelength_nm {
        return Ok(below.refractive_index());
    }

    let t = (wavelength_nm - below.wavelength_nm) / (above.wavelength_nm - below.wavelength_nm);
    let n = below.n + t * (above.n - below.n);
    let k = below.k + t * (above.k - below.k);
    Ok(Complex64::new(n, k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn three_point_table() -> Vec<OpticalSample> {
        vec![
            OpticalSample::new(400.0, 1.0, 0.0),
            OpticalSample::new(500.0, 1.5, 0.1),
            OpticalSample::new(600.0, 2.0, 0.2),
        ]
    }

    #[test]
    fn test_midpoint_is_linear() {
        let idx = interpolate(&three_point_table(), 450.0).unwrap();
        assert_abs_diff_eq!(idx.re, 1.25, epsilon = 1e-12);
        assert_abs_diff_eq!(idx.im, 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_clamps_below_and_above_range() {
        let table = three_point_table();
        assert_eq!(interpolate(&table, 350.0).unwrap(), Complex64::new(1.0, 0.0));
        assert_eq!(interpolate(&table, 650.0).unwrap(), Complex64::new(2.0, 0.2));
        assert_eq!(interpolate(&table, 400.0).unwrap(), Complex64::new(1.0, 0.0));
        assert_eq!(interpolate(&table, 600.0).unwrap(), Complex64::new(2.0, 0.2));
    }

    #[test]
    fn test_exact_knot_returns_sample() {
        assert_eq!(
            interpolate(&three_point_table(), 500.0).unwrap(),
            Complex64::new(1.5, 0.1)
        );
    }

    #[test]
    fn test_result_stays_within_bracket() {
        let table = vec![
            OpticalSample::new(300.0, 2.9, 0.4),
            OpticalSample::new(350.0, 2.7, 0.1),
            OpticalSample::new(420.0, 2.6, 0.0),
            OpticalSample::new(700.0, 2.5, 0.0),
        ];
        let mut lambda = 300.0;
        while lambda <= 700.0 {
            let idx = interpolate(&table, lambda).unwrap();
            let hi = table.iter().position(|s| s.wavelength_nm >= lambda).unwrap();
            let lo = hi.saturating_sub(1);
            let (a, b) = (&table[lo], &table[hi]);
            assert!(idx.re >= a.n.min(b.n) - 1e-12 && idx.re <= a.n.max(b.n) + 1e-12);
            assert!(idx.im >= a.k.min(b.k) - 1e-12 && idx.im <= a.k.max(b.k) + 1e-12);
            lambda += 7.5;
        }
    }

    #[test]
    fn test_single_sample_table_is_constant() {
        let table = [OpticalSample::new(550.0, 1.38, 0.0)];
        assert_eq!(interpolate(&table, 300.0).unwrap(), Complex64::new(1.38, 0.0));
        assert_eq!(interpolate(&table, 900.0).unwrap(), Complex64::new(1.38, 0.0));
    }

    #[test]
    fn test_empty_table_is_invalid_argument() {
        let err = interpolate(&[], 500.0).unwrap_err();
        assert!(matches!(err, MaterialError::InvalidArgument(_)));
    }

    #[test]
    fn test_nan_wavelength_rejected() {
        let err = interpolate(&three_point_table(), f64::NAN).unwrap_err();
        assert!(matches!(err, MaterialError::InvalidArgument(_)));
    }
}
