//! TOML-based simulator configuration with range normalization.

use std::fs;
use std::path::Path;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Top-level simulator configuration parsed from TOML.
///
/// All fields have defaults. Load from TOML with
/// [`SimulatorConfig::from_toml_file`] and pass the result through
/// [`SimulatorConfig::normalized`] before use; the simulator does this itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulatorConfig {
    /// Timer and randomness parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Grid connection parameters.
    #[serde(default)]
    pub grid: GridConfig,
    /// Tariff generator parameters.
    #[serde(default)]
    pub tariff: TariffConfig,
    /// PV plant parameters.
    #[serde(default)]
    pub pv: PvConfig,
    /// Stationary storage parameters.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Charge point fleet parameters.
    #[serde(default)]
    pub evcs: EvcsConfig,
    /// Scenario and suite timing.
    #[serde(default)]
    pub scenario: ScenarioTimingConfig,
}

/// Intensity of the fuzz scenario's random event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FuzzIntensity {
    /// One event every five seconds.
    #[default]
    Normal,
    /// Two events every second.
    High,
}

impl FuzzIntensity {
    /// Seconds between event bursts.
    pub fn interval_s(self) -> f64 {
        match self {
            Self::Normal => 5.0,
            Self::High => 1.0,
        }
    }

    /// Events drawn per burst.
    pub fn events_per_interval(self) -> usize {
        match self {
            Self::Normal => 1,
            Self::High => 2,
        }
    }
}

/// Timer and randomness parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Tick period in milliseconds, `[200, 60000]`.
    #[serde(alias = "updateIntervalMs")]
    pub update_interval_ms: u64,
    /// Seed for physics noise and scenario randomness, `[0, 999999]`.
    #[serde(alias = "randomSeed")]
    pub random_seed: u32,
    /// Base-load noise standard deviation as a percentage of the base load.
    #[serde(alias = "baseLoadNoisePct")]
    pub base_load_noise_pct: f64,
    /// Event cadence of the fuzz scenario.
    #[serde(alias = "fuzzIntensity")]
    pub fuzz_intensity: FuzzIntensity,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 1000,
            random_seed: 42,
            base_load_noise_pct: 3.0,
            fuzz_intensity: FuzzIntensity::Normal,
        }
    }
}

/// Grid connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Import limit at the connection point (kW), `[1, 2000]`.
    #[serde(alias = "gridLimitKw")]
    pub limit_kw: f64,
    /// Uncontrollable site consumption (kW), `[0, 500]`.
    #[serde(alias = "baseLoadKw")]
    pub base_load_kw: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            limit_kw: 80.0,
            base_load_kw: 15.0,
        }
    }
}

/// Tariff mode selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TariffModeConfig {
    /// Sinusoidal day profile with noise.
    #[default]
    Auto,
    /// Flat price set by command.
    Manual,
}

/// Tariff generator parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TariffConfig {
    /// Startup mode.
    pub mode: TariffModeConfig,
    /// Mean price (ct/kWh), `[-500, 500]`.
    pub base_ct_per_kwh: f64,
    /// Day-profile amplitude (ct/kWh), `[0, 200]`.
    pub amplitude_ct_per_kwh: f64,
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            mode: TariffModeConfig::Auto,
            base_ct_per_kwh: 30.0,
            amplitude_ct_per_kwh: 8.0,
        }
    }
}

/// PV plant parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PvConfig {
    /// Installed peak power (kWp), `[0, 2000]`.
    #[serde(alias = "pvInstalledKwp")]
    pub installed_kwp: f64,
    /// Weather derating factor, `[0, 1]`.
    #[serde(alias = "pvWeatherFactor")]
    pub weather_factor: f64,
}

impl Default for PvConfig {
    fn default() -> Self {
        Self {
            installed_kwp: 30.0,
            weather_factor: 0.8,
        }
    }
}

/// Stationary storage parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Usable capacity (kWh), `[1, 5000]`.
    #[serde(alias = "storageCapacityKwh")]
    pub capacity_kwh: f64,
    /// Charge power ceiling (kW), `[0, 5000]`.
    #[serde(alias = "storageMaxChargeKw")]
    pub max_charge_kw: f64,
    /// Discharge power ceiling (kW), `[0, 5000]`.
    #[serde(alias = "storageMaxDischargeKw")]
    pub max_discharge_kw: f64,
    /// State of charge at startup and after a baseline reset (%), `[0, 100]`.
    #[serde(alias = "storageInitialSocPct")]
    pub initial_soc_pct: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: 50.0,
            max_charge_kw: 25.0,
            max_discharge_kw: 25.0,
            initial_soc_pct: 50.0,
        }
    }
}

/// Charge point fleet parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvcsConfig {
    /// Number of charge points, `[1, 200]`. Fixed for the process lifetime.
    #[serde(alias = "chargersCount")]
    pub chargers_count: usize,
    /// Plug vehicles into the first points on baseline.
    #[serde(alias = "autoConnectEnabled")]
    pub auto_connect_enabled: bool,
    /// How many points are auto-connected, `[0, 200]`.
    #[serde(alias = "autoConnectCount")]
    pub auto_connect_count: usize,
    /// Default vehicle departure as `HH:MM`.
    #[serde(alias = "defaultDepartureTime")]
    pub default_departure_time: String,
    /// Default vehicle target SoC (%), `[0, 100]`.
    #[serde(alias = "defaultTargetSocPct")]
    pub default_target_soc_pct: f64,
}

impl Default for EvcsConfig {
    fn default() -> Self {
        Self {
            chargers_count: 6,
            auto_connect_enabled: false,
            auto_connect_count: 2,
            default_departure_time: DEFAULT_DEPARTURE.to_string(),
            default_target_soc_pct: 80.0,
        }
    }
}

/// Scenario and suite timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioTimingConfig {
    /// Run time of every started scenario (s), `[30, 86400]`.
    #[serde(alias = "scenarioDurationSec")]
    pub duration_sec: u32,
    /// Pause between suite scenarios and before a pending baseline reset (s), `[0, 600]`.
    #[serde(alias = "scenarioResetPauseSec")]
    pub reset_pause_sec: u32,
    /// Restore the baseline after a manual scenario ends.
    #[serde(alias = "autoResetToBaseline")]
    pub auto_reset_to_baseline: bool,
}

impl Default for ScenarioTimingConfig {
    fn default() -> Self {
        Self {
            duration_sec: 300,
            reset_pause_sec: 10,
            auto_reset_to_baseline: true,
        }
    }
}

const DEFAULT_DEPARTURE: &str = "07:00";

/// Configuration error with field path and constraint description.
#[derive(Debug, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.update_interval_ms"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl SimulatorConfig {
    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Returns a copy with every option clamped into its documented range.
    ///
    /// Out-of-range values are pulled to the nearest bound, non-finite numbers
    /// fall back to the default, and an unparseable departure time falls back
    /// to `"07:00"`. Every adjustment is logged.
    pub fn normalized(&self) -> Self {
        let d = Self::default();
        let mut c = self.clone();

        let s = &mut c.simulation;
        s.update_interval_ms = clamp_int("simulation.update_interval_ms", s.update_interval_ms, 200, 60_000);
        s.random_seed = clamp_int("simulation.random_seed", s.random_seed, 0, 999_999);
        s.base_load_noise_pct = clamp_num(
            "simulation.base_load_noise_pct",
            s.base_load_noise_pct,
            0.0,
            50.0,
            d.simulation.base_load_noise_pct,
        );

        let g = &mut c.grid;
        g.limit_kw = clamp_num("grid.limit_kw", g.limit_kw, 1.0, 2000.0, d.grid.limit_kw);
        g.base_load_kw = clamp_num("grid.base_load_kw", g.base_load_kw, 0.0, 500.0, d.grid.base_load_kw);

        let t = &mut c.tariff;
        t.base_ct_per_kwh = clamp_num(
            "tariff.base_ct_per_kwh",
            t.base_ct_per_kwh,
            -500.0,
            500.0,
            d.tariff.base_ct_per_kwh,
        );
        t.amplitude_ct_per_kwh = clamp_num(
            "tariff.amplitude_ct_per_kwh",
            t.amplitude_ct_per_kwh,
            0.0,
            200.0,
            d.tariff.amplitude_ct_per_kwh,
        );

        let p = &mut c.pv;
        p.installed_kwp = clamp_num("pv.installed_kwp", p.installed_kwp, 0.0, 2000.0, d.pv.installed_kwp);
        p.weather_factor = clamp_num("pv.weather_factor", p.weather_factor, 0.0, 1.0, d.pv.weather_factor);

        let st = &mut c.storage;
        st.capacity_kwh = clamp_num("storage.capacity_kwh", st.capacity_kwh, 1.0, 5000.0, d.storage.capacity_kwh);
        st.max_charge_kw = clamp_num("storage.max_charge_kw", st.max_charge_kw, 0.0, 5000.0, d.storage.max_charge_kw);
        st.max_discharge_kw = clamp_num(
            "storage.max_discharge_kw",
            st.max_discharge_kw,
            0.0,
            5000.0,
            d.storage.max_discharge_kw,
        );
        st.initial_soc_pct = clamp_num(
            "storage.initial_soc_pct",
            st.initial_soc_pct,
            0.0,
            100.0,
            d.storage.initial_soc_pct,
        );

        let e = &mut c.evcs;
        e.chargers_count = clamp_int("evcs.chargers_count", e.chargers_count, 1, 200);
        e.auto_connect_count = clamp_int("evcs.auto_connect_count", e.auto_connect_count, 0, 200);
        e.default_target_soc_pct = clamp_num(
            "evcs.default_target_soc_pct",
            e.default_target_soc_pct,
            0.0,
            100.0,
            d.evcs.default_target_soc_pct,
        );
        if NaiveTime::parse_from_str(e.default_departure_time.trim(), "%H:%M").is_err() {
            warn!(
                field = "evcs.default_departure_time",
                value = %e.default_departure_time,
                fallback = DEFAULT_DEPARTURE,
                "unparseable departure time, using fallback"
            );
            e.default_departure_time = DEFAULT_DEPARTURE.to_string();
        }

        let sc = &mut c.scenario;
        sc.duration_sec = clamp_int("scenario.duration_sec", sc.duration_sec, 30, 86_400);
        sc.reset_pause_sec = clamp_int("scenario.reset_pause_sec", sc.reset_pause_sec, 0, 600);

        c
    }
}

fn clamp_num(field: &str, value: f64, lo: f64, hi: f64, default: f64) -> f64 {
    if !value.is_finite() {
        warn!(field, fallback = default, "non-finite config value, using default");
        return default;
    }
    let clamped = value.clamp(lo, hi);
    if clamped != value {
        warn!(field, value, clamped, "config value out of range, clamped");
    }
    clamped
}

fn clamp_int<T>(field: &str, value: T, lo: T, hi: T) -> T
where
    T: Ord + Copy + std::fmt::Display,
{
    let clamped = value.clamp(lo, hi);
    if clamped != value {
        warn!(field, %value, %clamped, "config value out of range, clamped");
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_already_normalized() {
        let cfg = SimulatorConfig::default();
        let n = cfg.normalized();
        assert_eq!(n.simulation.update_interval_ms, cfg.simulation.update_interval_ms);
        assert_eq!(n.grid.limit_kw, cfg.grid.limit_kw);
        assert_eq!(n.evcs.chargers_count, cfg.evcs.chargers_count);
        assert_eq!(n.evcs.default_departure_time, "07:00");
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[simulation]
update_interval_ms = 500
random_seed = 7
fuzz_intensity = "high"

[grid]
limit_kw = 120.0
base_load_kw = 20.0

[tariff]
mode = "manual"
base_ct_per_kwh = 25.0

[pv]
installed_kwp = 50.0
weather_factor = 0.6

[storage]
capacity_kwh = 100.0
max_charge_kw = 50.0
max_discharge_kw = 40.0
initial_soc_pct = 30.0

[evcs]
chargers_count = 10
auto_connect_enabled = true
auto_connect_count = 4
default_departure_time = "06:30"
default_target_soc_pct = 90.0

[scenario]
duration_sec = 120
reset_pause_sec = 5
auto_reset_to_baseline = false
"#;
        let cfg = SimulatorConfig::from_toml_str(toml).expect("valid TOML should parse");
        assert_eq!(cfg.simulation.random_seed, 7);
        assert_eq!(cfg.simulation.fuzz_intensity, FuzzIntensity::High);
        assert_eq!(cfg.tariff.mode, TariffModeConfig::Manual);
        assert_eq!(cfg.evcs.chargers_count, 10);
        assert_eq!(cfg.scenario.duration_sec, 120);
        assert!(!cfg.scenario.auto_reset_to_baseline);
    }

    #[test]
    fn camel_case_aliases_are_accepted() {
        let toml = r#"
[simulation]
updateIntervalMs = 250
randomSeed = 9

[grid]
gridLimitKw = 42.0

[evcs]
chargersCount = 3
"#;
        let cfg = SimulatorConfig::from_toml_str(toml).expect("aliases should parse");
        assert_eq!(cfg.simulation.update_interval_ms, 250);
        assert_eq!(cfg.simulation.random_seed, 9);
        assert_eq!(cfg.grid.limit_kw, 42.0);
        assert_eq!(cfg.evcs.chargers_count, 3);
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[grid]
limit_kw = 10.0
bogus_field = true
"#;
        assert!(SimulatorConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg = SimulatorConfig::from_toml_str("[simulation]\nrandom_seed = 99\n")
            .expect("partial TOML should parse");
        assert_eq!(cfg.simulation.random_seed, 99);
        assert_eq!(cfg.simulation.update_interval_ms, 1000);
        assert_eq!(cfg.pv.installed_kwp, 30.0);
    }

    #[test]
    fn normalization_clamps_to_bounds() {
        let mut cfg = SimulatorConfig::default();
        cfg.simulation.update_interval_ms = 10;
        cfg.simulation.random_seed = 5_000_000;
        cfg.grid.limit_kw = 0.0;
        cfg.pv.weather_factor = 1.7;
        cfg.storage.initial_soc_pct = -3.0;
        cfg.evcs.chargers_count = 0;
        cfg.evcs.auto_connect_count = 900;
        cfg.scenario.duration_sec = 5;
        cfg.scenario.reset_pause_sec = 10_000;

        let n = cfg.normalized();
        assert_eq!(n.simulation.update_interval_ms, 200);
        assert_eq!(n.simulation.random_seed, 999_999);
        assert_eq!(n.grid.limit_kw, 1.0);
        assert_eq!(n.pv.weather_factor, 1.0);
        assert_eq!(n.storage.initial_soc_pct, 0.0);
        assert_eq!(n.evcs.chargers_count, 1);
        assert_eq!(n.evcs.auto_connect_count, 200);
        assert_eq!(n.scenario.duration_sec, 30);
        assert_eq!(n.scenario.reset_pause_sec, 600);
    }

    #[test]
    fn non_finite_values_fall_back_to_defaults() {
        let mut cfg = SimulatorConfig::default();
        cfg.grid.base_load_kw = f64::NAN;
        cfg.storage.capacity_kwh = f64::INFINITY;
        let n = cfg.normalized();
        assert_eq!(n.grid.base_load_kw, 15.0);
        assert_eq!(n.storage.capacity_kwh, 50.0);
    }

    #[test]
    fn bad_departure_time_falls_back() {
        let mut cfg = SimulatorConfig::default();
        cfg.evcs.default_departure_time = "quarter past six".to_string();
        assert_eq!(cfg.normalized().evcs.default_departure_time, "07:00");
    }

    #[test]
    fn fuzz_intensity_cadence() {
        assert_eq!(FuzzIntensity::Normal.interval_s(), 5.0);
        assert_eq!(FuzzIntensity::High.interval_s(), 1.0);
        assert_eq!(FuzzIntensity::Normal.events_per_interval(), 1);
        assert_eq!(FuzzIntensity::High.events_per_interval(), 2);
    }
}
