//! Offline rendering through `Engine::compute`.

use anyhow::{Context, Result};
use rtdsp_audio::Engine;

/// Longest offline render accepted from the command line
pub const MAX_RENDER_SECONDS: f64 = 24.0 * 60.0 * 60.0;

/// Convert a render length in seconds to a frame count.
pub fn frames_for_seconds(seconds: f64, sample_rate: u32) -> Result<usize> {
    anyhow::ensure!(
        seconds.is_finite() && seconds >= 0.0,
        "--seconds must be a finite, non-negative number (got {seconds})"
    );
    anyhow::ensure!(
        seconds <= MAX_RENDER_SECONDS,
        "--seconds {seconds} exceeds the {MAX_RENDER_SECONDS}s render limit"
    );
    Ok((seconds * f64::from(sample_rate)).round() as usize)
}

/// Run `frames` frames of `input` through a started engine.
///
/// Input channels may be shorter than `frames` (silence follows) or absent.
/// Returns exactly `frames` frames per output channel.
pub fn render_offline(
    engine: &mut Engine,
    input: &[Vec<f32>],
    frames: usize,
) -> Result<Vec<Vec<f32>>> {
    let config = *engine.config();
    let block_size = config.block_size;
    let mut rendered: Vec<Vec<f32>> = vec![Vec::new(); config.output_channels];
    let mut block_out = vec![vec![0.0; block_size]; config.output_channels];

    let mut position = 0;
    while position < frames {
        let block_in: Vec<&[f32]> = input
            .iter()
            .map(|channel| channel.get(position..).unwrap_or(&[]))
            .collect();
        {
            let mut output_refs: Vec<&mut [f32]> =
                block_out.iter_mut().map(Vec::as_mut_slice).collect();
            engine
                .compute_into(&block_in, &mut output_refs)
                .context("Offline compute failed")?;
        }

        let take = block_size.min(frames - position);
        for (dst, src) in rendered.iter_mut().zip(&block_out) {
            dst.extend_from_slice(&src[..take]);
        }
        position += block_size;

        if (position / block_size) % 100 == 0 {
            tracing::debug!("Rendered {}/{} frames", position.min(frames), frames);
        }
    }

    tracing::info!("Rendered {} frames total", frames);
    Ok(rendered)
}
