use crate::alignment::inventory::PhonemeInventory;
use crate::types::PhonemeInterval;

/// Map each query time to the class index of the first interval containing it.
///
/// Times covered by no interval produce no output, so the result may be shorter
/// than `times`. Output order follows `times`.
pub fn align(
    intervals: &[PhonemeInterval],
    times: &[f64],
    inventory: &PhonemeInventory,
) -> Vec<usize> {
    times
        .iter()
        .filter_map(|&t| {
            intervals
                .iter()
                .find(|interval| interval.contains(t))
                .map(|interval| inventory.index_of(&interval.label))
        })
        .collect()
}

/// Frame-centre times of `num_frames` frames spaced `hop_seconds` apart.
///
/// The last point is snapped to `transcript_duration` so that rounding drift between
/// audio-derived and transcript-derived durations lands inside the transcript.
pub fn frame_times(num_frames: usize, hop_seconds: f64, transcript_duration: f64) -> Vec<f64> {
    let mut times: Vec<f64> = (0..num_frames)
        .map(|i| (i as f64 + 0.5) * hop_seconds)
        .collect();
    if let Some(last) = times.last_mut() {
        *last = transcript_duration;
    }
    times
}
