use chrono_tz::Tz;
use serde::Deserialize;
use shared::types::Product;

/// Tunables for the orchestration engine, loaded from a TOML file.
///
/// Every field has a default so an absent or partial file still yields a
/// working configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// IANA zone all civil dates and shift boundaries are interpreted in.
    pub timezone: String,
    /// Rolling horizon maintained by the nightly extender, in months.
    pub horizon_months: u32,
    /// How far back applied shifts feed the fairness history, in weeks.
    pub history_weeks: i64,
    /// Hard ceiling on a single run, enforced at suspension points.
    pub run_timeout_secs: u64,
    pub fairness: FairnessSettings,
    pub rest: RestSettings,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/Amsterdam".to_string(),
            horizon_months: 6,
            history_weeks: 26,
            run_timeout_secs: 300,
            fairness: FairnessSettings::default(),
            rest: RestSettings::default(),
        }
    }
}

/// Exponential-decay half-lives (weeks) and the availability bonus.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FairnessSettings {
    pub incidents_half_life_weeks: f64,
    pub standby_half_life_weeks: f64,
    pub waakdienst_half_life_weeks: f64,
    pub availability_bonus: f64,
}

impl Default for FairnessSettings {
    fn default() -> Self {
        Self {
            incidents_half_life_weeks: 26.0,
            standby_half_life_weeks: 26.0,
            waakdienst_half_life_weeks: 13.0,
            availability_bonus: 0.0,
        }
    }
}

/// Minimum rest gap before a shift, in hours. Zero disables the check.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RestSettings {
    pub incidents_min_rest_hours: i64,
    pub standby_min_rest_hours: i64,
    pub waakdienst_min_rest_hours: i64,
}

impl OrchestratorConfig {
    /// Reads the config from `path`; a missing file yields the defaults.
    pub fn load(path: &str) -> Result<Self, String> {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                toml::from_str(&raw).map_err(|e| format!("Invalid config file {path}: {e}"))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(%path, "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(format!("Failed to read config file {path}: {e}")),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
            .parse()
            .unwrap_or(chrono_tz::Europe::Amsterdam)
    }

    pub fn half_life_weeks(&self, product: Product) -> f64 {
        match product {
            Product::Incidents => self.fairness.incidents_half_life_weeks,
            Product::IncidentsStandby => self.fairness.standby_half_life_weeks,
            Product::Waakdienst => self.fairness.waakdienst_half_life_weeks,
        }
    }

    pub fn min_rest_hours(&self, product: Product) -> i64 {
        match product {
            Product::Incidents => self.rest.incidents_min_rest_hours,
            Product::IncidentsStandby => self.rest.standby_min_rest_hours,
            Product::Waakdienst => self.rest.waakdienst_min_rest_hours,
        }
    }
}
