use crate::note::PitchSource;

pub const PITCH_STEP_SECONDS: f64 = 0.01;

/// Marks "no pitch" in the transport format, which cannot carry NaN.
pub const NO_PITCH: f64 = -f64::MAX;

/// Sample times covering `[start_time, end_time]` in 10 ms steps, always
/// including the exact end time. Non-finite bounds collapse to `[0.0]`.
pub fn collect_pitch_times(start_time: f64, end_time: f64) -> Vec<f64> {
    if !start_time.is_finite() || !end_time.is_finite() {
        return vec![0.0];
    }

    let (start_time, end_time) = if end_time < start_time {
        (end_time, start_time)
    } else {
        (start_time, end_time)
    };

    let duration = (end_time - start_time).max(0.0);
    let count = ((duration / PITCH_STEP_SECONDS).ceil() as usize + 1).max(1);
    let mut times: Vec<f64> = (0..count)
        .map(|i| (start_time + i as f64 * PITCH_STEP_SECONDS).min(end_time))
        .collect();

    if times.last().is_some_and(|last| *last < end_time) {
        times.push(end_time);
    }

    times
}

pub fn sanitize_pitch_values(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .map(|v| if v.is_finite() { *v } else { NO_PITCH })
        .collect()
}

/// Evaluates `source` at `times` and returns one transport-safe value per time.
pub fn sample_pitch(source: &dyn PitchSource, times: &[f64]) -> Vec<f64> {
    let mut values = sanitize_pitch_values(&source.values_at(times));
    values.resize(times.len(), NO_PITCH);
    values
}
