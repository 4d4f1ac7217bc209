//! Peak search on a 1D trace
//!
//! Local maxima (plateaus resolve to their middle sample) filtered in a fixed
//! order: height band, minimum horizontal distance, minimum prominence.

/// Filters applied by [`find_peaks`]; `None` disables a filter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeakFilter {
    /// Inclusive (min, max) peak height
    pub height: Option<(f64, f64)>,
    /// Minimum index distance between kept peaks
    pub distance: Option<usize>,
    /// Minimum prominence
    pub prominence: Option<f64>,
}

/// One detected peak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoundPeak {
    pub index: usize,
    pub height: f64,
    pub prominence: f64,
}

/// Indices of local maxima, midpoints for flat plateaus
pub fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut maxima = Vec::new();
    if x.len() < 3 {
        return maxima;
    }
    let last = x.len() - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                maxima.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    maxima
}

/// Height of `peak` above the higher of its two surrounding minima
///
/// Each side is walked outward while the trace stays at or below the peak.
pub fn prominence(x: &[f64], peak: usize) -> f64 {
    let top = x[peak];

    let mut left_min = top;
    for &v in x[..=peak].iter().rev() {
        if v > top {
            break;
        }
        left_min = left_min.min(v);
    }

    let mut right_min = top;
    for &v in &x[peak..] {
        if v > top {
            break;
        }
        right_min = right_min.min(v);
    }

    top - left_min.max(right_min)
}

/// Drop peaks closer than `distance` to a higher one
///
/// Higher peaks are kept first; among equal heights the later peak wins.
fn select_by_distance(x: &[f64], peaks: &[usize], distance: usize) -> Vec<bool> {
    let mut keep = vec![true; peaks.len()];
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));

    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            k -= 1;
            keep[k] = false;
        }
        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }
    keep
}

/// Find peaks in `x` passing every enabled filter, in index order
///
/// # Example
/// ```
/// use echorange_core::analysis::peaks::{find_peaks, PeakFilter};
///
/// let x = [0.0, 2.0, 0.0, 5.0, 5.0, 5.0, 1.0, 0.0];
/// let peaks = find_peaks(&x, &PeakFilter::default());
/// assert_eq!(peaks.iter().map(|p| p.index).collect::<Vec<_>>(), vec![1, 4]);
/// ```
pub fn find_peaks(x: &[f64], filter: &PeakFilter) -> Vec<FoundPeak> {
    let mut peaks = local_maxima(x);

    if let Some((low, high)) = filter.height {
        peaks.retain(|&p| x[p] >= low && x[p] <= high);
    }

    if let Some(distance) = filter.distance.filter(|&d| d > 1) {
        let keep = select_by_distance(x, &peaks, distance);
        peaks = peaks
            .into_iter()
            .zip(keep)
            .filter_map(|(p, k)| k.then_some(p))
            .collect();
    }

    peaks
        .into_iter()
        .map(|index| FoundPeak {
            index,
            height: x[index],
            prominence: prominence(x, index),
        })
        .filter(|p| filter.prominence.is_none_or(|min| p.prominence >= min))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(peaks: &[FoundPeak]) -> Vec<usize> {
        peaks.iter().map(|p| p.index).collect()
    }

    #[test]
    fn test_local_maxima() {
        assert_eq!(local_maxima(&[0.0, 1.0, 0.0, 2.0, 1.0]), vec![1, 3]);
        // Edges never count
        assert_eq!(local_maxima(&[3.0, 1.0, 2.0]), Vec::<usize>::new());
        assert!(local_maxima(&[1.0, 2.0]).is_empty());
    }

    #[test]
    fn test_plateau_midpoint() {
        assert_eq!(local_maxima(&[0.0, 1.0, 1.0, 1.0, 1.0, 0.0]), vec![2]);
        assert_eq!(local_maxima(&[0.0, 1.0, 1.0, 1.0, 0.0]), vec![2]);
        // A plateau running into the edge is not a peak
        assert!(local_maxima(&[0.0, 1.0, 1.0, 1.0]).is_empty());
        // A plateau stepping up is not a peak
        assert!(local_maxima(&[0.0, 1.0, 1.0, 2.0]).is_empty());
    }

    #[test]
    fn test_prominence() {
        let x = [0.0, 3.0, 1.0, 5.0, 2.0, 4.0, 0.0];
        assert_eq!(prominence(&x, 3), 5.0);
        // Left walk stops at 5.0, so the higher base is 2.0
        assert_eq!(prominence(&x, 5), 2.0);
        assert_eq!(prominence(&x, 1), 2.0);
    }

    #[test]
    fn test_height_filter() {
        let x = [0.0, 1.0, 0.0, 5.0, 0.0, 3.0, 0.0];
        let filter = PeakFilter {
            height: Some((2.0, 4.0)),
            ..Default::default()
        };
        assert_eq!(indices(&find_peaks(&x, &filter)), vec![5]);
    }

    #[test]
    fn test_distance_filter_keeps_higher() {
        let x = [0.0, 1.0, 0.0, 5.0, 0.0, 3.0, 0.0, 0.0, 0.0, 2.0, 0.0];
        let filter = PeakFilter {
            distance: Some(3),
            ..Default::default()
        };
        assert_eq!(indices(&find_peaks(&x, &filter)), vec![3, 9]);
    }

    #[test]
    fn test_distance_filter_tie_keeps_later() {
        let x = [0.0, 2.0, 0.0, 2.0, 0.0];
        let filter = PeakFilter {
            distance: Some(3),
            ..Default::default()
        };
        assert_eq!(indices(&find_peaks(&x, &filter)), vec![3]);
    }

    #[test]
    fn test_prominence_filter() {
        let x = [0.0, 3.0, 2.5, 5.0, 0.0];
        let filter = PeakFilter {
            prominence: Some(1.0),
            ..Default::default()
        };
        let peaks = find_peaks(&x, &filter);
        assert_eq!(indices(&peaks), vec![3]);
        assert_eq!(peaks[0].prominence, 5.0);
        assert_eq!(peaks[0].height, 5.0);
    }

    #[test]
    fn test_filters_apply_in_order() {
        // The 5.0 peak is dropped by height before it can shadow 3.0 by distance
        let x = [0.0, 3.0, 0.0, 5.0, 0.0];
        let filter = PeakFilter {
            height: Some((1.0, 4.0)),
            distance: Some(5),
            prominence: None,
        };
        assert_eq!(indices(&find_peaks(&x, &filter)), vec![1]);
    }

    #[test]
    fn test_empty_input() {
        assert!(find_peaks(&[], &PeakFilter::default()).is_empty());
    }
}
