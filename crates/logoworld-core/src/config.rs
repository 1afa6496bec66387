use crate::error::AgentError;
use logoworld_topology::WorldBounds;
use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

/// Static configuration for a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Inclusive patch bounds; a `pzcor` range makes the world volumetric.
    pub bounds: WorldBounds,
    /// Whether the x axis wraps. Ignored by volumetric worlds, which always wrap.
    pub wrap_x: bool,
    /// Whether the y axis wraps. Ignored by volumetric worlds, which always wrap.
    pub wrap_y: bool,
    /// Patch edge length in screen pixels, kept for renderers.
    pub patch_size: f64,
    /// Seed for the simulation RNG; drawn from entropy when absent.
    pub rng_seed: Option<u64>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            bounds: WorldBounds::default(),
            wrap_x: true,
            wrap_y: true,
            patch_size: 12.0,
            rng_seed: None,
        }
    }
}

impl WorldConfig {
    /// A planar world spanning `[-max_pxcor, max_pxcor] x [-max_pycor, max_pycor]`.
    #[must_use]
    pub fn centered(max_pxcor: i32, max_pycor: i32, wrap: bool) -> Self {
        Self {
            bounds: WorldBounds::new(-max_pxcor, max_pxcor, -max_pycor, max_pycor),
            wrap_x: wrap,
            wrap_y: wrap,
            ..Self::default()
        }
    }

    /// Returns a copy using `seed` for the simulation RNG.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Validates bounds and rendering parameters.
    pub fn validate(&self) -> Result<(), AgentError> {
        self.bounds.validate()?;
        if !(self.patch_size > 0.0) {
            return Err(AgentError::InvalidConfig("patch_size must be positive"));
        }
        Ok(())
    }

    /// Returns the configured seed, generating one from entropy if absent.
    pub(crate) fn resolved_seed(&self) -> u64 {
        self.rng_seed.unwrap_or_else(rand::random)
    }

    /// The auxiliary stream is never seeded from the config so UI randomness cannot
    /// correlate with the simulation stream.
    pub(crate) fn aux_rng() -> SmallRng {
        SmallRng::seed_from_u64(rand::random())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_a_valid_torus() {
        let config = WorldConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.wrap_x && config.wrap_y);
        assert_eq!(config.bounds.width(), 33);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let config = WorldConfig {
            patch_size: 0.0,
            ..WorldConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AgentError::InvalidConfig(_))
        ));
        let config = WorldConfig {
            bounds: WorldBounds::new(1, 5, -1, 1),
            ..WorldConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_json_with_defaults() {
        let parsed: WorldConfig =
            serde_json::from_str(r#"{"wrap_x": false, "rng_seed": 7}"#).expect("parse");
        assert!(!parsed.wrap_x);
        assert!(parsed.wrap_y);
        assert_eq!(parsed.rng_seed, Some(7));
        assert_eq!(parsed.bounds, WorldBounds::default());
    }
}
