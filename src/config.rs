//! Layered configuration (Figment-based).
//!
//! Defaults carry the constants of the deployed hardware (L-type rapid
//! cryostat, 10 A sample magnet, factory rack scaling); a TOML file and
//! `TRANSMEAS_`-prefixed environment variables can override any field.
//! Environment keys use `__` as the section separator, e.g.
//! `TRANSMEAS_CRYOSTAT__BOUNDARIES__MIDDLE_POINT=3.0`.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::controller::{FieldRegime, RegimeBoundaries, StopPolicy};
use crate::error::{TransmeasError, TransmeasResult};
use crate::instrument::ivvi::SourceMode;
use crate::measurement::iv::SweepPlan;

/// Cryostat temperature-control section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CryostatSettings {
    /// Regime boundaries and rate ceilings.
    pub boundaries: RegimeBoundaries,
    /// Stop-confirmation retry budget for regime switches.
    pub stop_policy: StopPolicy,
}

/// Sample magnet section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagnetSettings {
    /// Which entry of `variants` is installed, keyed by coil current rating.
    pub variant: String,
    /// Field limits per known magnet variant.
    pub variants: HashMap<String, FieldRegime>,
    /// Sample temperature ceiling (K) above which field ramps are refused.
    pub max_safe_sample_temperature: f64,
}

impl Default for MagnetSettings {
    fn default() -> Self {
        let mut variants = HashMap::new();
        variants.insert("10".to_string(), FieldRegime::default());
        Self {
            variant: "10".to_string(),
            variants,
            max_safe_sample_temperature: 200.0,
        }
    }
}

impl MagnetSettings {
    /// Field limits of the installed variant.
    pub fn regime(&self) -> TransmeasResult<FieldRegime> {
        self.variants.get(&self.variant).cloned().ok_or_else(|| {
            TransmeasError::Configuration(format!(
                "unknown magnet variant '{}' (known: {:?})",
                self.variant,
                self.variants.keys().collect::<Vec<_>>()
            ))
        })
    }
}

/// IVVI rack section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RackSettings {
    /// Slot holding the S4c source module (2 or 3).
    pub s4c_slot: u8,
    /// Power-on range switch position.
    pub default_range: f64,
    /// Power-on source mode ("I", "V" or "V+R").
    pub default_mode: String,
}

impl Default for RackSettings {
    fn default() -> Self {
        Self {
            s4c_slot: 3,
            default_range: 1e-6,
            default_mode: "I".to_string(),
        }
    }
}

/// Top-level settings for the toolkit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Cryostat temperature control.
    pub cryostat: CryostatSettings,
    /// Sample magnet.
    pub magnet: MagnetSettings,
    /// IVVI rack.
    pub rack: RackSettings,
    /// Default IV sweep grid.
    pub sweep: SweepPlan,
}

impl Settings {
    /// Load settings: defaults, then the TOML file (given path or
    /// `transmeas.toml` in the working directory), then environment
    /// overrides. Validates the merged result.
    pub fn new(path: Option<&Path>) -> TransmeasResult<Self> {
        let file = path.unwrap_or_else(|| Path::new("transmeas.toml"));
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("TRANSMEAS_").split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic validation of the merged configuration.
    pub fn validate(&self) -> TransmeasResult<()> {
        self.cryostat.boundaries.validate()?;
        for regime in self.magnet.variants.values() {
            regime.validate()?;
        }
        self.magnet.regime()?;
        if self.magnet.max_safe_sample_temperature <= 0.0 {
            return Err(TransmeasError::Configuration(
                "safe sample temperature ceiling must be positive".to_string(),
            ));
        }
        self.rack.default_mode.parse::<SourceMode>()?;
        self.sweep.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.cryostat.boundaries.middle_point, 3.3);
        assert_eq!(settings.magnet.regime().unwrap().upper_field, 5.0);
        assert_eq!(settings.rack.s4c_slot, 3);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let settings = Settings::new(Some(Path::new("/nonexistent/transmeas.toml"))).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_toml_overrides_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transmeas.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
[cryostat.boundaries]
middle_point = 3.0

[cryostat.stop_policy]
poll_interval = "50ms"
max_polls = 20

[magnet]
variant = "6"

[magnet.variants."6"]
upper_field = 3.0
lower_field = -3.0
upper_ramp_rate = 0.3
"#
        )
        .unwrap();

        let settings = Settings::new(Some(&path)).unwrap();
        assert_eq!(settings.cryostat.boundaries.middle_point, 3.0);
        // Untouched fields keep their defaults.
        assert_eq!(settings.cryostat.boundaries.upper_limit, 305.0);
        assert_eq!(
            settings.cryostat.stop_policy.poll_interval,
            std::time::Duration::from_millis(50)
        );
        assert_eq!(settings.magnet.regime().unwrap().upper_field, 3.0);
    }

    #[test]
    fn test_unknown_variant_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transmeas.toml");
        std::fs::write(&path, "[magnet]\nvariant = \"99\"\n").unwrap();

        let err = Settings::new(Some(&path)).unwrap_err();
        assert!(matches!(err, TransmeasError::Configuration(_)));
    }

    #[test]
    fn test_bad_source_mode_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transmeas.toml");
        std::fs::write(&path, "[rack]\ndefault_mode = \"Q\"\n").unwrap();

        let err = Settings::new(Some(&path)).unwrap_err();
        assert!(matches!(err, TransmeasError::UnknownMode(_)));
    }
}
