use std::collections::HashSet;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;
use crate::VariantType;

/// Namespace of the simulated sensor nodes.
pub const SIMULATION_NAMESPACE: u16 = 2;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SimulationConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Period of the driver task that advances every sensor
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    #[serde(default = "default_sensors")]
    pub sensors: Vec<SensorConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            update_interval_ms: default_update_interval_ms(),
            sensors: default_sensors(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.update_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "simulation.update_interval_ms must be greater than 0".into(),
            )));
        }

        let mut ids = HashSet::new();
        for sensor in &self.sensors {
            if !ids.insert(sensor.node_id) {
                return Err(Error::Config(ConfigError::Message(format!(
                    "simulation.sensors: duplicate node_id {}",
                    sensor.node_id
                ))));
            }
            sensor.validate()?;
        }
        Ok(())
    }
}

/// One simulated variable node under the Objects folder.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SensorConfig {
    /// Numeric identifier in [`SIMULATION_NAMESPACE`]
    pub node_id: u32,
    pub name: String,
    pub data_type: VariantType,
    /// Grants the CurrentWrite access bit to clients
    #[serde(default)]
    pub writable: bool,
    pub model: SensorModelConfig,
}

impl SensorConfig {
    fn validate(&self) -> Result<()> {
        if !matches!(
            self.data_type,
            VariantType::Double | VariantType::Float | VariantType::Int32 | VariantType::UInt32 | VariantType::Boolean
        ) {
            return Err(Error::Config(ConfigError::Message(format!(
                "simulation.sensors[{}]: data_type {} cannot be simulated",
                self.name, self.data_type
            ))));
        }
        self.model.validate(&self.name)
    }
}

/// Value generator driving a sensor.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorModelConfig {
    /// `offset + amplitude * sin(2π t / period)`
    Sine { offset: f64, amplitude: f64, period_ms: u64 },
    /// Climbs by `step` per update and wraps from `max` back to `min`
    Ramp { min: f64, max: f64, step: f64 },
    /// Flips every `period_ms` when `auto_toggle` is set, otherwise holds its value
    Toggle { period_ms: u64, auto_toggle: bool },
    /// Bounded random walk
    RandomWalk { start: f64, min: f64, max: f64, max_step: f64 },
    Constant { value: f64 },
}

impl SensorModelConfig {
    fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        let invalid = |reason: &str| {
            Err(Error::Config(ConfigError::Message(format!(
                "simulation.sensors[{name}]: {reason}"
            ))))
        };
        match self {
            SensorModelConfig::Sine { period_ms, .. } if *period_ms == 0 => invalid("sine period_ms must be > 0"),
            SensorModelConfig::Ramp { min, max, step } if min >= max || *step <= 0.0 => {
                invalid("ramp requires min < max and step > 0")
            }
            SensorModelConfig::Toggle { period_ms, .. } if *period_ms == 0 => invalid("toggle period_ms must be > 0"),
            SensorModelConfig::RandomWalk { start, min, max, .. } if min > max || start < min || start > max => {
                invalid("random_walk start must lie within [min, max]")
            }
            _ => Ok(()),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_update_interval_ms() -> u64 {
    100
}

fn default_sensors() -> Vec<SensorConfig> {
    vec![
        SensorConfig {
            node_id: 1000,
            name: "TemperatureSensor_Tank1".into(),
            data_type: VariantType::Double,
            writable: false,
            model: SensorModelConfig::Sine {
                offset: 25.0,
                amplitude: 5.0,
                period_ms: 60_000,
            },
        },
        SensorConfig {
            node_id: 1001,
            name: "LevelSensor_Tank1".into(),
            data_type: VariantType::Double,
            writable: false,
            model: SensorModelConfig::Ramp {
                min: 0.0,
                max: 100.0,
                step: 0.5,
            },
        },
        SensorConfig {
            node_id: 1002,
            name: "RelayActuator_Pump1".into(),
            data_type: VariantType::Boolean,
            writable: true,
            model: SensorModelConfig::Toggle {
                period_ms: 10_000,
                auto_toggle: false,
            },
        },
        SensorConfig {
            node_id: 1003,
            name: "MotorSpeed_Conveyor".into(),
            data_type: VariantType::Int32,
            writable: true,
            model: SensorModelConfig::Ramp {
                min: 0.0,
                max: 1500.0,
                step: 10.0,
            },
        },
    ]
}
