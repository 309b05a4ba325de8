/// Median of integer dBm samples.
///
/// Odd counts return the central value. Even counts return the mean of the two
/// central values truncated toward zero, so `[-65, -60]` yields `-62`.
pub fn median(values: &[i32]) -> Option<i32> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;

    if sorted.len() % 2 == 0 {
        let sum = i64::from(sorted[mid - 1]) + i64::from(sorted[mid]);
        Some((sum / 2) as i32)
    } else {
        Some(sorted[mid])
    }
}
