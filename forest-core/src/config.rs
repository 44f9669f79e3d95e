use crate::error::{ConfigError, Result};
use crate::grammar::Rules;
use crate::turtle::TurtleParams;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound accepted when loading a grammar from text; expansion grows
/// geometrically with the iteration count.
pub const MAX_ITERATIONS: u32 = 10;

/// Species description: the L-system plus every geometric constant the
/// turtle needs to turn its output into branches and leaves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrammarConfig {
    pub axiom: String,
    pub rules: Rules,
    pub iterations: u32,
    /// Turn angle for `+` / `-`, in degrees.
    pub angle_deg: f32,
    pub segment_length: f32,
    pub initial_radius: f32,
    /// Factor applied by the `R` symbol.
    pub radius_decay: f32,
    /// Floor for the radius after decay.
    pub min_radius: f32,
    /// Branch tips farther than this from the base also get a leaf.
    pub leaf_distance_threshold: f32,
    pub leaf_size_min: f32,
    pub leaf_size_max: f32,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        Self::broadleaf()
    }
}

impl GrammarConfig {
    /// Round-crowned deciduous tree with forking, thinning limbs.
    pub fn broadleaf() -> Self {
        Self {
            axiom: "FF".to_string(),
            rules: Rules::new()
                .with('F', 0.5, "FR[+FRL][-FRL]F")
                .with('F', 0.3, "FR[+FL]F[-FL]")
                .with('F', 0.2, "FR[-FRL]FL"),
            iterations: 3,
            angle_deg: 25.0,
            segment_length: 1.2,
            initial_radius: 0.22,
            radius_decay: 0.86,
            min_radius: 0.03,
            leaf_distance_threshold: 3.0,
            leaf_size_min: 0.5,
            leaf_size_max: 1.1,
        }
    }

    /// Tall narrow tree with short side whorls.
    pub fn conifer() -> Self {
        Self {
            axiom: "FFF".to_string(),
            rules: Rules::new()
                .with('F', 0.7, "F[+RRFL][-RRFL]F")
                .with('F', 0.3, "FF"),
            iterations: 3,
            angle_deg: 55.0,
            segment_length: 1.0,
            initial_radius: 0.18,
            radius_decay: 0.8,
            min_radius: 0.03,
            leaf_distance_threshold: 2.5,
            leaf_size_min: 0.35,
            leaf_size_max: 0.6,
        }
    }

    pub fn turtle_params(&self) -> TurtleParams {
        TurtleParams {
            angle_step_rad: self.angle_deg.to_radians(),
            segment_length: self.segment_length,
            initial_radius: self.initial_radius,
            radius_decay: self.radius_decay,
            min_radius: self.min_radius,
            leaf_distance_threshold: self.leaf_distance_threshold,
            leaf_size: (self.leaf_size_min, self.leaf_size_max),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations > MAX_ITERATIONS {
            return Err(ConfigError::InvalidValue {
                field: "iterations",
                reason: format!("{} exceeds the maximum of {MAX_ITERATIONS}", self.iterations),
            });
        }
        require_finite("angle_deg", self.angle_deg)?;
        require_positive("segment_length", self.segment_length)?;
        require_positive("initial_radius", self.initial_radius)?;
        require_positive("radius_decay", self.radius_decay)?;
        require_positive("min_radius", self.min_radius)?;
        require_non_negative("leaf_distance_threshold", self.leaf_distance_threshold)?;
        require_positive("leaf_size_min", self.leaf_size_min)?;
        require_positive("leaf_size_max", self.leaf_size_max)?;
        if self.leaf_size_min > self.leaf_size_max {
            return Err(ConfigError::InvalidValue {
                field: "leaf_size_min",
                reason: "must not exceed leaf_size_max".to_string(),
            });
        }
        for (symbol, alts) in self.rules.iter() {
            for alt in alts {
                if !alt.probability.is_finite() || alt.probability < 0.0 {
                    return Err(ConfigError::InvalidValue {
                        field: "rules",
                        reason: format!(
                            "symbol `{symbol}` has probability {}",
                            alt.probability
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Timing and shape of the felling animation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallConfig {
    pub duration_secs: f32,
    /// Final tilt as a fraction of a right angle.
    pub target_fraction: f32,
    /// Largest `dt` a single update may consume; `None` disables clamping.
    pub max_dt: Option<f32>,
}

impl Default for FallConfig {
    fn default() -> Self {
        Self {
            duration_secs: 2.0,
            target_fraction: 0.8,
            max_dt: None,
        }
    }
}

impl FallConfig {
    #[inline]
    pub fn target_angle(&self) -> f32 {
        self.target_fraction * std::f32::consts::FRAC_PI_2
    }

    pub fn validate(&self) -> Result<()> {
        require_positive("duration_secs", self.duration_secs)?;
        require_non_negative("target_fraction", self.target_fraction)?;
        if let Some(max_dt) = self.max_dt {
            require_positive("max_dt", max_dt)?;
        }
        Ok(())
    }
}

/// Where and how many trees to plant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    pub count: usize,
    /// Trees are scattered in `[-half_extent, half_extent]` on x and z.
    pub half_extent: f32,
    pub seed: Option<u64>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            count: 300,
            half_extent: 97.0,
            seed: None,
        }
    }
}

/// Complete configuration, loadable from TOML.
///
/// ```toml
/// [population]
/// count = 50
/// seed = 7
///
/// [grammar]
/// axiom = "F"
/// iterations = 2
/// rules.F = [{ p = 1.0, out = "F[+F]F[-F]F" }]
///
/// [fall]
/// duration_secs = 1.5
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub population: PopulationConfig,
    pub grammar: GrammarConfig,
    pub fall: FallConfig,
}

impl ForestConfig {
    /// Parses and validates a TOML document. Missing sections and fields
    /// take their default values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: ForestConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads and validates a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let cfg = Self::from_toml_str(&text)?;
        log::info!("loaded forest config from {}", path.display());
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        require_non_negative("half_extent", self.population.half_extent)?;
        self.grammar.validate()?;
        self.fall.validate()
    }
}

fn require_finite(field: &'static str, v: f32) -> Result<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            reason: format!("{v} is not finite"),
        })
    }
}

fn require_non_negative(field: &'static str, v: f32) -> Result<()> {
    require_finite(field, v)?;
    if v < 0.0 {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("{v} is negative"),
        });
    }
    Ok(())
}

fn require_positive(field: &'static str, v: f32) -> Result<()> {
    require_finite(field, v)?;
    if v <= 0.0 {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("{v} must be greater than zero"),
        });
    }
    Ok(())
}
