//! Tunables of the ambient-occlusion demo. The defaults are the values the
//! reference scene was tuned with.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{AoError, AoResult};
use crate::ssao::{blur_radius, MAX_BLUR_RADIUS};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AoTechnique {
    /// Full-screen pixel shader pass followed by a bilateral blur
    Ssao,
    /// Horizon-based compute pass
    Hbao,
}

/// Where the occlusion pass runs
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AoMode {
    /// Everything on the prime device
    Native,
    /// Occlusion on the second device, inputs and result exchanged through
    /// the cross-adapter heaps
    Shared,
}

impl AoMode {
    pub fn toggled(self) -> Self {
        match self {
            AoMode::Native => AoMode::Shared,
            AoMode::Shared => AoMode::Native,
        }
    }
}

impl std::fmt::Display for AoMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AoMode::Native => write!(f, "Native Implementation"),
            AoMode::Shared => write!(f, "Hybrid Implementation"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AoConfig {
    pub width: u32,
    pub height: u32,
    pub frames_in_flight: usize,
    pub technique: AoTechnique,
    pub mode: AoMode,

    pub native_blur_count: u32,
    pub shared_blur_count: u32,
    pub blur_sigma: f32,

    // View-space distances
    pub occlusion_radius: f32,
    pub occlusion_fade_start: f32,
    pub occlusion_fade_end: f32,
    pub surface_epsilon: f32,

    pub hbao_trace_radius: f32,
    pub hbao_max_radius_pixels: f32,
    pub hbao_discard_distance: f32,

    /// Stat calculations each benchmark state waits for
    pub benchmark_steps: u32,
    /// Seconds between two stat calculations
    pub benchmark_time_per_step: f32,
}

impl Default for AoConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frames_in_flight: 3,
            technique: AoTechnique::Ssao,
            mode: AoMode::Native,
            native_blur_count: 3,
            shared_blur_count: 1,
            blur_sigma: 2.5,
            occlusion_radius: 0.5,
            occlusion_fade_start: 0.2,
            occlusion_fade_end: 1.0,
            surface_epsilon: 0.05,
            hbao_trace_radius: 1.0,
            hbao_max_radius_pixels: 50.0,
            hbao_discard_distance: 100.0,
            benchmark_steps: 120,
            benchmark_time_per_step: 1.0,
        }
    }
}

impl AoConfig {
    pub fn set_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn set_technique(mut self, technique: AoTechnique) -> Self {
        self.technique = technique;
        self
    }

    pub fn set_mode(mut self, mode: AoMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn set_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = frames_in_flight;
        self
    }

    pub fn validate(&self) -> AoResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(AoError::Config(format!(
                "render target size {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.frames_in_flight == 0 {
            return Err(AoError::Config(String::from(
                "at least one frame must be in flight",
            )));
        }
        if self.blur_sigma.is_nan() || self.blur_sigma <= 0. {
            return Err(AoError::Config(format!(
                "blur sigma {} must be positive",
                self.blur_sigma
            )));
        }
        let radius = blur_radius(self.blur_sigma);
        if radius > MAX_BLUR_RADIUS {
            return Err(AoError::BlurRadius {
                radius,
                max: MAX_BLUR_RADIUS,
            });
        }
        if self.occlusion_fade_end <= self.occlusion_fade_start {
            return Err(AoError::Config(format!(
                "occlusion fade end {} must be past fade start {}",
                self.occlusion_fade_end, self.occlusion_fade_start
            )));
        }
        if self.benchmark_time_per_step <= 0. {
            return Err(AoError::Config(String::from(
                "benchmark step length must be positive",
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AoConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.native_blur_count, 3);
        assert_eq!(config.shared_blur_count, 1);
        assert_eq!(config.frames_in_flight, 3);
    }

    #[test]
    fn empty_size_is_rejected() {
        let config = AoConfig::default().set_size(0, 720);
        assert!(matches!(config.validate(), Err(AoError::Config(_))));
    }

    #[test]
    fn wide_blur_is_rejected() {
        let config = AoConfig {
            blur_sigma: 3.0,
            ..AoConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AoError::BlurRadius { radius: 6, max: 5 })
        ));
    }

    #[test]
    fn mode_toggles_both_ways() {
        assert_eq!(AoMode::Native.toggled(), AoMode::Shared);
        assert_eq!(AoMode::Shared.toggled(), AoMode::Native);
    }
}
