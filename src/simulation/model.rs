use std::f64::consts::PI;

#[cfg(test)]
use mockall::automock;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use crate::SensorModelConfig;
use crate::Variant;
use crate::VariantType;

/// Value generator behind one simulated sensor.
///
/// Models produce plain numbers; the driver converts them to the node's data type.
#[cfg_attr(test, automock)]
pub trait SensorModel: Send + Sync + 'static {
    /// Value at `elapsed_ms` since the driver started.
    fn next_value(
        &mut self,
        elapsed_ms: u64,
    ) -> f64;
}

pub struct SineModel {
    offset: f64,
    amplitude: f64,
    period_ms: u64,
}

impl SensorModel for SineModel {
    fn next_value(
        &mut self,
        elapsed_ms: u64,
    ) -> f64 {
        let phase = (elapsed_ms % self.period_ms) as f64 / self.period_ms as f64;
        self.offset + self.amplitude * (2.0 * PI * phase).sin()
    }
}

pub struct RampModel {
    min: f64,
    max: f64,
    step: f64,
    current: f64,
}

impl RampModel {
    pub fn new(
        min: f64,
        max: f64,
        step: f64,
    ) -> Self {
        Self {
            min,
            max,
            step,
            current: min,
        }
    }
}

impl SensorModel for RampModel {
    fn next_value(
        &mut self,
        _elapsed_ms: u64,
    ) -> f64 {
        let value = self.current;
        self.current += self.step;
        if self.current > self.max {
            self.current = self.min;
        }
        value
    }
}

/// 0.0 / 1.0 square wave; holds 0.0 when `auto_toggle` is off.
pub struct ToggleModel {
    period_ms: u64,
    auto_toggle: bool,
}

impl SensorModel for ToggleModel {
    fn next_value(
        &mut self,
        elapsed_ms: u64,
    ) -> f64 {
        if self.auto_toggle && (elapsed_ms / self.period_ms) % 2 == 1 {
            1.0
        } else {
            0.0
        }
    }
}

pub struct RandomWalkModel {
    min: f64,
    max: f64,
    max_step: f64,
    current: f64,
    rng: StdRng,
}

impl RandomWalkModel {
    pub fn new(
        start: f64,
        min: f64,
        max: f64,
        max_step: f64,
    ) -> Self {
        Self::with_rng(start, min, max, max_step, StdRng::from_entropy())
    }

    pub fn with_rng(
        start: f64,
        min: f64,
        max: f64,
        max_step: f64,
        rng: StdRng,
    ) -> Self {
        Self {
            min,
            max,
            max_step: max_step.abs(),
            current: start,
            rng,
        }
    }
}

impl SensorModel for RandomWalkModel {
    fn next_value(
        &mut self,
        _elapsed_ms: u64,
    ) -> f64 {
        let value = self.current;
        let delta = self.rng.gen_range(-self.max_step..=self.max_step);
        self.current = (self.current + delta).clamp(self.min, self.max);
        value
    }
}

pub struct ConstantModel {
    value: f64,
}

impl SensorModel for ConstantModel {
    fn next_value(
        &mut self,
        _elapsed_ms: u64,
    ) -> f64 {
        self.value
    }
}

pub fn build_model(config: &SensorModelConfig) -> Box<dyn SensorModel> {
    match *config {
        SensorModelConfig::Sine {
            offset,
            amplitude,
            period_ms,
        } => Box::new(SineModel {
            offset,
            amplitude,
            period_ms: period_ms.max(1),
        }),
        SensorModelConfig::Ramp { min, max, step } => Box::new(RampModel::new(min, max, step)),
        SensorModelConfig::Toggle { period_ms, auto_toggle } => Box::new(ToggleModel {
            period_ms: period_ms.max(1),
            auto_toggle,
        }),
        SensorModelConfig::RandomWalk {
            start,
            min,
            max,
            max_step,
        } => Box::new(RandomWalkModel::new(start, min, max, max_step)),
        SensorModelConfig::Constant { value } => Box::new(ConstantModel { value }),
    }
}

/// Converts a generated number to the node's data type; `None` for types that are never simulated.
pub fn to_variant(
    data_type: VariantType,
    value: f64,
) -> Option<Variant> {
    let variant = match data_type {
        VariantType::Double => Variant::Double(value),
        VariantType::Float => Variant::Float(value as f32),
        VariantType::Int32 => Variant::Int32(value.round() as i32),
        VariantType::UInt32 => Variant::UInt32(value.max(0.0).round() as u32),
        VariantType::Boolean => Variant::Boolean(value >= 0.5),
        _ => return None,
    };
    Some(variant)
}
