//! One dimensional rise/drop detectors over image profiles.
//!
//! Each detector arms on a rise and emits the midpoint between the arming
//! index and the drop index. An armed state left at the end is dropped.

/// Rescale to [0, 1]. A constant sequence maps to all zeros.
pub fn normalize(seq: &[f64]) -> Vec<f64> {
    let min = seq.iter().copied().fold(f64::INFINITY, f64::min);
    let max = seq.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    if span.is_nan() || span <= 0.0 {
        return vec![0.0; seq.len()];
    }
    seq.iter().map(|v| (v - min) / span).collect()
}

/// Armed while the value is at or above `rise`, emits once it falls to `drop`.
pub fn schmitt_rise_drop(seq: &[f64], rise: f64, drop: f64) -> Vec<usize> {
    let mut start: Option<usize> = None;
    let mut ret = Vec::new();

    for (i, v) in seq.iter().enumerate() {
        match start {
            None if *v >= rise => start = Some(i),
            Some(s) if *v <= drop => {
                ret.push((s + i) / 2);
                start = None;
            }
            _ => {}
        }
    }
    ret
}

/// Same, but over the first difference. A later rise re-arms.
pub fn diff_rise_drop(seq: &[f64], rise: f64, drop: f64) -> Vec<usize> {
    let mut start: Option<usize> = None;
    let mut ret = Vec::new();

    for (i, pair) in seq.windows(2).enumerate() {
        let i = i + 1;
        let d = pair[1] - pair[0];

        if d >= rise {
            start = Some(i);
        } else if d <= drop {
            if let Some(s) = start.take() {
                ret.push((s + i) / 2);
            }
        }
    }
    ret
}
