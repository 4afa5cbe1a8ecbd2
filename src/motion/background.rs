//! Per-pixel adaptive mixture-of-Gaussians background model.
//!
//! Each pixel keeps up to `mixtures` Gaussian modes (mean per channel, one
//! shared variance, a weight). Modes stay sorted by weight. A pixel is
//! background when it matches one of the heaviest modes whose cumulative weight
//! is still below `background_ratio`. Pixels that are a darker copy of a
//! background mode are reported as shadow.

use crate::frame::{Frame, MotionMask, CHANNELS, MASK_BACKGROUND, MASK_FOREGROUND, MASK_SHADOW};

/// Tuning parameters for [`BackgroundModel`].
#[derive(Clone, Debug, PartialEq)]
pub struct MogParams {
    /// Frames over which the learning rate decays to its floor.
    pub history: u32,
    /// Squared Mahalanobis distance below which a pixel matches a background mode.
    pub var_threshold: f32,
    pub mixtures: usize,
    pub background_ratio: f32,
    /// Squared distance below which a sample updates an existing mode.
    pub var_threshold_gen: f32,
    pub var_init: f32,
    pub var_min: f32,
    pub var_max: f32,
    /// Complexity reduction prior; weak modes are pruned by this much per frame.
    pub complexity_reduction: f32,
    pub detect_shadows: bool,
    pub shadow_value: u8,
    /// Darkening ratio lower bound for shadow classification.
    pub shadow_threshold: f32,
}

impl Default for MogParams {
    fn default() -> Self {
        Self {
            history: 500,
            var_threshold: 16.0,
            mixtures: 5,
            background_ratio: 0.9,
            var_threshold_gen: 9.0,
            var_init: 15.0,
            var_min: 4.0,
            var_max: 75.0,
            complexity_reduction: 0.05,
            detect_shadows: true,
            shadow_value: MASK_SHADOW,
            shadow_threshold: 0.5,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Mode {
    weight: f32,
    variance: f32,
    mean: [f32; CHANNELS],
}

/// Running background model for one stream.
pub struct BackgroundModel {
    params: MogParams,
    width: u32,
    height: u32,
    /// `mixtures` slots per pixel, heaviest first.
    modes: Vec<Mode>,
    modes_used: Vec<u8>,
    frames_seen: u64,
}

impl BackgroundModel {
    /// `params.mixtures` is clamped to `1..=255` so the per-pixel mode count
    /// always fits its `u8` counter.
    pub fn new(mut params: MogParams) -> Self {
        params.mixtures = params.mixtures.clamp(1, u8::MAX as usize);
        Self {
            params,
            width: 0,
            height: 0,
            modes: Vec::new(),
            modes_used: Vec::new(),
            frames_seen: 0,
        }
    }

    /// Frames absorbed since construction or the last reset.
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Drop all learned state.
    pub fn reset(&mut self) {
        self.width = 0;
        self.height = 0;
        self.modes.clear();
        self.modes_used.clear();
        self.frames_seen = 0;
    }

    /// Update the model with `frame` and return the raw foreground mask.
    pub fn apply(&mut self, frame: &Frame) -> MotionMask {
        if frame.width() != self.width || frame.height() != self.height {
            if self.frames_seen > 0 {
                log::warn!(
                    "background model: frame size changed {}x{} -> {}x{}, relearning",
                    self.width,
                    self.height,
                    frame.width(),
                    frame.height()
                );
            }
            self.allocate(frame.width(), frame.height());
        }

        self.frames_seen += 1;
        let alpha = 1.0 / (2 * self.frames_seen).min(self.params.history.max(1) as u64) as f32;

        let pixel_count = (self.width as usize) * (self.height as usize);
        let mut mask = vec![MASK_BACKGROUND; pixel_count];
        let bytes = frame.as_bytes();
        let k = self.params.mixtures;

        for (idx, out) in mask.iter_mut().enumerate() {
            let px = &bytes[idx * CHANNELS..idx * CHANNELS + CHANNELS];
            let sample = [px[0] as f32, px[1] as f32, px[2] as f32];
            let slots = &mut self.modes[idx * k..idx * k + k];
            let used = &mut self.modes_used[idx];
            *out = update_pixel(&self.params, slots, used, sample, alpha);
        }

        MotionMask::from_raw_parts(self.width, self.height, mask)
    }

    fn allocate(&mut self, width: u32, height: u32) {
        let pixels = width as usize * height as usize;
        self.width = width;
        self.height = height;
        self.modes = vec![Mode::default(); pixels * self.params.mixtures];
        self.modes_used = vec![0; pixels];
        self.frames_seen = 0;
    }
}

fn update_pixel(
    params: &MogParams,
    modes: &mut [Mode],
    used: &mut u8,
    sample: [f32; CHANNELS],
    alpha: f32,
) -> u8 {
    let prune = -alpha * params.complexity_reduction;
    let one_minus_alpha = 1.0 - alpha;
    let mut n = *used as usize;

    let mut background = false;
    let mut matched = false;
    let mut cumulative = 0.0f32;

    for mode in modes.iter_mut().take(n) {
        let mut weight = one_minus_alpha * mode.weight + prune;
        if !matched {
            let dist2 = squared_distance(&mode.mean, &sample);
            if cumulative < params.background_ratio && dist2 < params.var_threshold * mode.variance {
                background = true;
            }
            if dist2 < params.var_threshold_gen * mode.variance {
                matched = true;
                weight += alpha;
                let k = alpha / weight;
                for c in 0..CHANNELS {
                    mode.mean[c] += k * (sample[c] - mode.mean[c]);
                }
                let var = mode.variance + k * (dist2 - mode.variance);
                mode.variance = var.clamp(params.var_min, params.var_max);
            }
        }
        mode.weight = weight;
        cumulative += weight.max(0.0);
    }

    // Drop modes whose weight fell under the pruning floor, keep the rest in order.
    let mut kept = 0;
    for i in 0..n {
        if modes[i].weight >= -prune {
            modes[kept] = modes[i];
            kept += 1;
        }
    }
    n = kept;

    let total: f32 = modes[..n].iter().map(|m| m.weight).sum();
    if total > 0.0 {
        for mode in &mut modes[..n] {
            mode.weight /= total;
        }
    }
    modes[..n].sort_by(|a, b| b.weight.total_cmp(&a.weight));

    // Shadows are judged against the modes learned before this sample.
    let level = if background {
        MASK_BACKGROUND
    } else if params.detect_shadows && is_shadow(params, &modes[..n], &sample) {
        params.shadow_value
    } else {
        MASK_FOREGROUND
    };

    if !matched {
        let slot = if n == modes.len() { n - 1 } else { n };
        if slot == n {
            n += 1;
        }
        if n == 1 {
            modes[0] = Mode {
                weight: 1.0,
                variance: params.var_init,
                mean: sample,
            };
        } else {
            for mode in &mut modes[..n] {
                mode.weight *= one_minus_alpha;
            }
            modes[slot] = Mode {
                weight: alpha,
                variance: params.var_init,
                mean: sample,
            };
            modes[..n].sort_by(|a, b| b.weight.total_cmp(&a.weight));
        }
    }

    *used = n as u8;
    level
}

/// A shadow is a uniformly darkened copy of a background mode.
fn is_shadow(params: &MogParams, modes: &[Mode], sample: &[f32; CHANNELS]) -> bool {
    let mut cumulative = 0.0f32;
    for mode in modes {
        let numerator: f32 = (0..CHANNELS).map(|c| sample[c] * mode.mean[c]).sum();
        let denominator: f32 = (0..CHANNELS).map(|c| mode.mean[c] * mode.mean[c]).sum();
        if denominator == 0.0 {
            return false;
        }
        if numerator <= denominator && numerator >= params.shadow_threshold * denominator {
            let a = numerator / denominator;
            let dist2a: f32 = (0..CHANNELS)
                .map(|c| {
                    let d = a * mode.mean[c] - sample[c];
                    d * d
                })
                .sum();
            if dist2a < params.var_threshold * mode.variance * a * a {
                return true;
            }
        }
        cumulative += mode.weight;
        if cumulative > params.background_ratio {
            return false;
        }
    }
    false
}

fn squared_distance(mean: &[f32; CHANNELS], sample: &[f32; CHANNELS]) -> f32 {
    (0..CHANNELS)
        .map(|c| {
            let d = mean[c] - sample[c];
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn first_frame_is_all_foreground() -> Result<()> {
        let mut model = BackgroundModel::new(MogParams::default());
        let frame = Frame::filled(8, 8, [40, 80, 120])?;
        let mask = model.apply(&frame);
        assert!(mask.as_bytes().iter().all(|&v| v == MASK_FOREGROUND));
        Ok(())
    }

    #[test]
    fn repeated_frame_becomes_background() -> Result<()> {
        let mut model = BackgroundModel::new(MogParams::default());
        let frame = Frame::filled(8, 8, [40, 80, 120])?;
        model.apply(&frame);
        let mask = model.apply(&frame);
        assert_eq!(mask.count_nonzero(), 0);
        assert_eq!(model.frames_seen(), 2);
        Ok(())
    }

    #[test]
    fn new_object_is_foreground_and_darkening_is_shadow() -> Result<()> {
        let mut model = BackgroundModel::new(MogParams::default());
        let background = Frame::filled(4, 1, [100, 100, 100])?;
        for _ in 0..20 {
            model.apply(&background);
        }

        let mut frame = background.clone();
        frame.set_pixel(0, 0, [250, 10, 10]);
        frame.set_pixel(1, 0, [70, 70, 70]);
        let mask = model.apply(&frame);

        assert_eq!(mask.get(0, 0), MASK_FOREGROUND);
        assert_eq!(mask.get(1, 0), MASK_SHADOW);
        assert_eq!(mask.get(2, 0), MASK_BACKGROUND);
        Ok(())
    }

    #[test]
    fn shadows_can_be_disabled() -> Result<()> {
        let params = MogParams {
            detect_shadows: false,
            ..MogParams::default()
        };
        let mut model = BackgroundModel::new(params);
        let background = Frame::filled(2, 1, [100, 100, 100])?;
        for _ in 0..20 {
            model.apply(&background);
        }
        let mut frame = background.clone();
        frame.set_pixel(0, 0, [70, 70, 70]);
        let mask = model.apply(&frame);
        assert_eq!(mask.get(0, 0), MASK_FOREGROUND);
        Ok(())
    }

    #[test]
    fn size_change_relearns() -> Result<()> {
        let mut model = BackgroundModel::new(MogParams::default());
        model.apply(&Frame::filled(4, 4, [1, 2, 3])?);
        model.apply(&Frame::filled(4, 4, [1, 2, 3])?);
        let mask = model.apply(&Frame::filled(2, 2, [1, 2, 3])?);
        assert_eq!(mask.width(), 2);
        assert_eq!(model.frames_seen(), 1);
        assert_eq!(mask.count_nonzero(), 4);
        Ok(())
    }

    #[test]
    fn mixture_count_is_clamped() -> Result<()> {
        let frame = Frame::filled(4, 4, [80, 80, 80])?;
        for mixtures in [0, 300] {
            let mut model = BackgroundModel::new(MogParams {
                mixtures,
                ..MogParams::default()
            });
            assert_eq!(model.apply(&frame).count_nonzero(), 16);
            assert_eq!(model.apply(&frame).count_nonzero(), 0);
        }
        Ok(())
    }
}
