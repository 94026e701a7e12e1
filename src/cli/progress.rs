use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Adds a bar counting blocks, or a spinner when the total is unknown.
pub fn create_progress_bar(
    multi: &MultiProgress,
    total_blocks: Option<u64>,
    message: &'static str,
) -> Result<ProgressBar> {
    let pb = if let Some(total) = total_blocks {
        let pb = multi.add(ProgressBar::new(total));
        pb.set_style(ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} blocks ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
        )?);

        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    } else {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template(
            "{spinner:.green} {pos} blocks\n{msg} | elapsed: {elapsed_precise}",
        )?);

        pb
    };
    pb.set_message(message);
    Ok(pb)
}

/// Replaces the bar's message with throughput and the audio duration handled.
pub fn finish_progress_bar(
    pb: Option<&ProgressBar>,
    samples: u64,
    sample_rate: u32,
    start_time: std::time::Instant,
) {
    if let Some(pb) = pb {
        let audio_secs = samples as f64 / sample_rate as f64;
        let elapsed = start_time.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 { audio_secs / elapsed } else { 0.0 };

        pb.finish_with_message(format!(
            "speed: {speed:.1}x | duration: {}",
            crate::timestamp::time_str(audio_secs)
        ));
    }
}
