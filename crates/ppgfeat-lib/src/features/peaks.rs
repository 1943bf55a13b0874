use crate::signal::Events;

/// Strict local maxima; a flat top counts once, at its (lower) midpoint.
pub fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut out = Vec::new();
    if x.len() < 3 {
        return out;
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
                out.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    out
}

/// Peaks at least `distance` samples apart; taller peaks win conflicts.
pub fn find_peaks(x: &[f64], distance: usize) -> Events {
    let peaks = local_maxima(x);
    if distance <= 1 || peaks.len() < 2 {
        return Events::from_indices(peaks);
    }
    let mut keep = vec![true; peaks.len()];
    let mut priority: Vec<usize> = (0..peaks.len()).collect();
    // stable sort: among equal heights the rightmost peak is visited first
    priority.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));
    for &j in priority.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }
        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }
    let indices = peaks
        .into_iter()
        .zip(keep)
        .filter_map(|(p, kept)| kept.then_some(p))
        .collect();
    Events::from_indices(indices)
}

/// Troughs are the peaks of the negated window.
pub fn find_troughs(x: &[f64], distance: usize) -> Events {
    let negated: Vec<f64> = x.iter().map(|v| -v).collect();
    find_peaks(&negated, distance)
}

/// Minimum peak spacing in samples for a spacing in seconds.
pub fn distance_samples(min_distance_s: f64, fs: f64) -> usize {
    ((min_distance_s * fs).ceil() as usize).max(1)
}
