/// Formats a duration in seconds as `HH:MM:SS.mmm`.
pub fn time_str(sec: f64) -> String {
    let ms = (sec.max(0.0) * 1000f64).round() as u64;
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let milliseconds = ms % 1000;

    format!(
        "{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}
