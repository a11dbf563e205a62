use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::build_model;
use super::to_variant;
use super::SensorModel;
use crate::well_known;
use crate::AccessLevel;
use crate::AddressSpace;
use crate::AddressSpaceError;
use crate::NodeId;
use crate::Result;
use crate::SimulationConfig;
use crate::Variant;
use crate::VariantType;
use crate::SIMULATION_NAMESPACE;

struct SimulatedSensor {
    node_id: NodeId,
    data_type: VariantType,
    model: Box<dyn SensorModel>,
    /// Last generated value; unchanged output is not rewritten, so client writes stick.
    last: Option<Variant>,
}

/// Advances every sensor model on a fixed period and stores the results.
pub struct SimulationDriver {
    address_space: Arc<AddressSpace>,
    update_interval: Duration,
    sensors: Vec<SimulatedSensor>,
}

impl SimulationDriver {
    /// Adds one variable per configured sensor under the Objects folder.
    pub fn install(
        config: &SimulationConfig,
        address_space: &AddressSpace,
    ) -> std::result::Result<(), AddressSpaceError> {
        let objects = well_known::objects_folder();
        for sensor in &config.sensors {
            let access = if sensor.writable {
                AccessLevel::read_write()
            } else {
                AccessLevel::read_only()
            };
            address_space.add_variable(
                &objects,
                NodeId::numeric(SIMULATION_NAMESPACE, sensor.node_id),
                &sensor.name,
                sensor.data_type,
                access,
            )?;
        }
        info!(sensors = config.sensors.len(), "simulated sensors installed");
        Ok(())
    }

    pub fn new(
        config: &SimulationConfig,
        address_space: Arc<AddressSpace>,
    ) -> Self {
        let driver = Self {
            address_space,
            update_interval: Duration::from_millis(config.update_interval_ms),
            sensors: Vec::with_capacity(config.sensors.len()),
        };
        config.sensors.iter().fold(driver, |driver, sensor| {
            driver.with_sensor(
                NodeId::numeric(SIMULATION_NAMESPACE, sensor.node_id),
                sensor.data_type,
                build_model(&sensor.model),
            )
        })
    }

    pub fn with_sensor(
        mut self,
        node_id: NodeId,
        data_type: VariantType,
        model: Box<dyn SensorModel>,
    ) -> Self {
        self.sensors.push(SimulatedSensor {
            node_id,
            data_type,
            model,
            last: None,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Generates one value per sensor and stores those that changed. Returns how many were stored.
    pub fn step(
        &mut self,
        elapsed_ms: u64,
    ) -> usize {
        let mut written = 0;
        for sensor in &mut self.sensors {
            let Some(value) = to_variant(sensor.data_type, sensor.model.next_value(elapsed_ms)) else {
                continue;
            };
            if sensor.last.as_ref() == Some(&value) {
                continue;
            }

            match self.address_space.set_simulated_value(&sensor.node_id, value.clone()) {
                Ok(_) => {
                    sensor.last = Some(value);
                    written += 1;
                }
                Err(e) => warn!(node_id = %sensor.node_id, "simulated update rejected: {e}"),
            }
        }
        written
    }

    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        let started = Instant::now();
        let mut ticker = interval(self.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(period = ?self.update_interval, sensors = self.sensors.len(), "simulation driver started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("simulation driver stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.step(started.elapsed().as_millis() as u64);
                }
            }
        }
    }
}
