/*!
 * Driver registry for Alpaca Barn.
 *
 * The registry keeps one [`DriverSet`] per device category. Device numbers
 * exposed over the protocol are positions in the lexicographically sorted
 * id list of a set, recomputed on every lookup.
 */
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use barn_core::config::{MonitorsConfig, WeatherStationsConfig};
use barn_core::types::DriverId;
use barn_core::utils::spawn_and_log;

use crate::device::{DeviceCategory, DeviceError, Driver, DriverInfo, Result};
use crate::monitor::SafetyMonitor;
use crate::rule::SafetyMatchingRule;
use crate::weather::ObservingConditions;

/// Event types for the driver registry
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    /// A driver was added
    DriverAdded {
        /// Category of the driver
        category: DeviceCategory,
        /// Driver id
        id: DriverId,
    },
    /// A driver was removed
    DriverRemoved {
        /// Category of the driver
        category: DeviceCategory,
        /// Driver id
        id: DriverId,
    },
    /// A driver finished a refresh
    DriverRefreshed {
        /// Category of the driver
        category: DeviceCategory,
        /// Driver id
        id: DriverId,
        /// Failure message, if the refresh failed
        error: Option<String>,
    },
}

/// The drivers of one category, addressable by id or by device number
#[derive(Debug)]
pub struct DriverSet<D> {
    category: DeviceCategory,
    drivers: RwLock<BTreeMap<DriverId, Arc<D>>>,
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl<D: Driver + 'static> DriverSet<D> {
    fn new(category: DeviceCategory, event_sender: broadcast::Sender<RegistryEvent>) -> Self {
        Self {
            category,
            drivers: RwLock::new(BTreeMap::new()),
            event_sender,
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<DriverId, Arc<D>>>> {
        self.drivers.read().map_err(|_| DeviceError::LockPoisoned("read"))
    }

    /// Category served by this set
    pub fn category(&self) -> DeviceCategory {
        self.category
    }

    /// Register a driver under its id
    pub fn add(&self, driver: D) -> Result<()> {
        let id = driver.id().clone();
        let mut drivers = self
            .drivers
            .write()
            .map_err(|_| DeviceError::LockPoisoned("write"))?;

        if drivers.contains_key(&id) {
            return Err(DeviceError::AlreadyRegistered(id));
        }

        debug!(category = %self.category, id = %id, kind = driver.kind(), "Registered driver");
        drivers.insert(id.clone(), Arc::new(driver));
        let _ = self.event_sender.send(RegistryEvent::DriverAdded {
            category: self.category,
            id,
        });
        Ok(())
    }

    /// Unregister a driver
    pub fn remove(&self, id: &DriverId) -> Result<Arc<D>> {
        let mut drivers = self
            .drivers
            .write()
            .map_err(|_| DeviceError::LockPoisoned("write"))?;

        let driver = drivers
            .remove(id)
            .ok_or_else(|| DeviceError::NotFound(id.clone()))?;

        debug!(category = %self.category, id = %id, "Unregistered driver");
        let _ = self.event_sender.send(RegistryEvent::DriverRemoved {
            category: self.category,
            id: id.clone(),
        });
        Ok(driver)
    }

    /// Registered ids in device-number order
    pub fn ids(&self) -> Result<Vec<DriverId>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    /// Look a driver up by id
    pub fn get(&self, id: &DriverId) -> Result<Arc<D>> {
        self.read()?
            .get(id)
            .cloned()
            .ok_or_else(|| DeviceError::NotFound(id.clone()))
    }

    /// The id at a device number
    pub fn id_at(&self, index: i64) -> Result<DriverId> {
        let drivers = self.read()?;
        usize::try_from(index)
            .ok()
            .and_then(|index| drivers.keys().nth(index))
            .cloned()
            .ok_or(DeviceError::IndexOutOfRange(index))
    }

    /// The driver at a device number
    pub fn get_by_index(&self, index: i64) -> Result<Arc<D>> {
        let drivers = self.read()?;
        usize::try_from(index)
            .ok()
            .and_then(|index| drivers.values().nth(index))
            .cloned()
            .ok_or(DeviceError::IndexOutOfRange(index))
    }

    /// All drivers in device-number order
    pub fn all(&self) -> Result<Vec<Arc<D>>> {
        Ok(self.read()?.values().cloned().collect())
    }

    /// Number of registered drivers
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    /// Refresh every driver in its own task.
    ///
    /// Outcomes are logged and published as [`RegistryEvent::DriverRefreshed`];
    /// one driver failing or panicking never affects the others.
    pub fn refresh_all(&self) -> Result<Vec<JoinHandle<()>>> {
        let handles = self
            .all()?
            .into_iter()
            .map(|driver| {
                let category = self.category;
                let event_sender = self.event_sender.clone();
                let task_name = format!("refresh {}/{}", category, driver.id());
                spawn_and_log(&task_name, async move {
                    let result = driver.refresh().await;
                    if result.is_ok() {
                        let state = driver.state_summary().await;
                        debug!(category = %category, id = %driver.id(), state = %state, "Refreshed driver");
                    }
                    let _ = event_sender.send(RegistryEvent::DriverRefreshed {
                        category,
                        id: driver.id().clone(),
                        error: result.as_ref().err().map(ToString::to_string),
                    });
                    result
                })
            })
            .collect();
        Ok(handles)
    }
}

/// The registry of every configured driver
#[derive(Debug)]
pub struct Barn {
    monitors: DriverSet<SafetyMonitor>,
    weather: DriverSet<ObservingConditions>,
    event_sender: broadcast::Sender<RegistryEvent>,
}

type Pending<D> = Pin<Box<dyn Future<Output = (DriverId, Result<D>)> + Send>>;

impl Barn {
    /// Create an empty registry
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(100);
        Self {
            monitors: DriverSet::new(DeviceCategory::SafetyMonitor, event_sender.clone()),
            weather: DriverSet::new(DeviceCategory::ObservingConditions, event_sender.clone()),
            event_sender,
        }
    }

    /// Build a registry from configuration.
    ///
    /// Drivers are constructed concurrently, each taking its first reading.
    /// Ids are lowercased. A weather station without a URL is skipped with a
    /// warning rather than failing startup.
    pub async fn from_config(
        monitors: &MonitorsConfig,
        weather: &WeatherStationsConfig,
    ) -> Result<Self> {
        let barn = Self::new();

        let mut pending_monitors: Vec<Pending<SafetyMonitor>> = Vec::new();
        for (id, cfg) in &monitors.http {
            let id = normalize_id(id);
            let info = DriverInfo::new(id.clone(), cfg.name.clone(), cfg.description.clone());
            let rule = SafetyMatchingRule::new(cfg.rule.pattern.clone(), cfg.rule.invert);
            let url = cfg.url.clone();
            pending_monitors.push(Box::pin(async move {
                (id, SafetyMonitor::http(info, url, rule).await)
            }));
        }
        for (id, cfg) in &monitors.file {
            let id = normalize_id(id);
            let info = DriverInfo::new(id.clone(), cfg.name.clone(), cfg.description.clone());
            let rule = SafetyMatchingRule::new(cfg.rule.pattern.clone(), cfg.rule.invert);
            let path = cfg.path.clone();
            pending_monitors.push(Box::pin(async move {
                (id, Ok(SafetyMonitor::file(info, path, rule).await))
            }));
        }
        for (id, cfg) in &monitors.dummy {
            let id = normalize_id(id);
            let info = DriverInfo::new(id.clone(), cfg.name.clone(), cfg.description.clone());
            let monitor = SafetyMonitor::dummy(info, cfg.is_safe);
            pending_monitors.push(Box::pin(async move { (id, Ok(monitor)) }));
        }

        let mut pending_weather: Vec<Pending<ObservingConditions>> = Vec::new();
        for (id, cfg) in &weather.http {
            let id = normalize_id(id);
            let info = DriverInfo::new(id.clone(), cfg.name.clone(), cfg.description.clone());
            let url = cfg.url.clone();
            pending_weather.push(Box::pin(async move {
                (id, ObservingConditions::http(info, url).await)
            }));
        }
        for (id, cfg) in &weather.dummy {
            let id = normalize_id(id);
            let info = DriverInfo::new(id.clone(), cfg.name.clone(), cfg.description.clone());
            let station = ObservingConditions::dummy(info);
            pending_weather.push(Box::pin(async move { (id, Ok(station)) }));
        }

        let (monitors, stations) = tokio::join!(join_all(pending_monitors), join_all(pending_weather));

        for (id, monitor) in monitors {
            if let Err(e) = monitor.and_then(|monitor| barn.monitors.add(monitor)) {
                warn!(id = %id, "Skipping safety monitor: {}", e);
            }
        }
        for (id, station) in stations {
            if let Err(e) = station.and_then(|station| barn.weather.add(station)) {
                warn!(id = %id, "Skipping weather station: {}", e);
            }
        }

        info!(
            monitors = barn.monitors.len()?,
            stations = barn.weather.len()?,
            "Driver registry ready"
        );
        Ok(barn)
    }

    /// Safety monitor drivers
    pub fn monitors(&self) -> &DriverSet<SafetyMonitor> {
        &self.monitors
    }

    /// Weather station drivers
    pub fn weather(&self) -> &DriverSet<ObservingConditions> {
        &self.weather
    }

    /// Subscribe to registry events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Refresh every driver of every category concurrently
    pub fn refresh(&self) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = self.monitors.refresh_all()?;
        handles.extend(self.weather.refresh_all()?);
        Ok(handles)
    }
}

impl Default for Barn {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_id(id: &str) -> DriverId {
    DriverId::from(id.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use barn_core::config::{
        DummyMonitorConfig, DummyWeatherConfig, FileMonitorConfig, HttpWeatherConfig, RuleConfig,
    };
    use tempfile::NamedTempFile;

    fn dummy_monitor(id: &str, safe: bool) -> SafetyMonitor {
        SafetyMonitor::dummy(DriverInfo::new(id, id, ""), safe)
    }

    #[test]
    fn test_device_numbers_follow_sorted_ids() {
        let barn = Barn::new();
        barn.monitors().add(dummy_monitor("roof", true)).unwrap();
        barn.monitors().add(dummy_monitor("cloud", false)).unwrap();
        barn.monitors().add(dummy_monitor("rain", true)).unwrap();

        let ids: Vec<String> = barn.monitors().ids().unwrap().iter().map(|i| i.to_string()).collect();
        assert_eq!(ids, ["cloud", "rain", "roof"]);
        assert_eq!(barn.monitors().id_at(2).unwrap().as_str(), "roof");
        assert_eq!(barn.monitors().get_by_index(0).unwrap().id().as_str(), "cloud");
    }

    #[test]
    fn test_out_of_range_indexes() {
        let barn = Barn::new();
        barn.monitors().add(dummy_monitor("roof", true)).unwrap();

        assert!(matches!(
            barn.monitors().get_by_index(1),
            Err(DeviceError::IndexOutOfRange(1))
        ));
        assert!(matches!(
            barn.monitors().get_by_index(-1),
            Err(DeviceError::IndexOutOfRange(-1))
        ));
        assert!(matches!(barn.weather().id_at(0), Err(DeviceError::IndexOutOfRange(0))));
    }

    #[test]
    fn test_removal_shifts_device_numbers() {
        let barn = Barn::new();
        barn.monitors().add(dummy_monitor("a", true)).unwrap();
        barn.monitors().add(dummy_monitor("b", true)).unwrap();

        barn.monitors().remove(&DriverId::from("a")).unwrap();
        assert_eq!(barn.monitors().id_at(0).unwrap().as_str(), "b");
        assert!(matches!(
            barn.monitors().remove(&DriverId::from("a")),
            Err(DeviceError::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let barn = Barn::new();
        barn.monitors().add(dummy_monitor("roof", true)).unwrap();
        assert!(matches!(
            barn.monitors().add(dummy_monitor("roof", false)),
            Err(DeviceError::AlreadyRegistered(_))
        ));
        assert!(barn.monitors().get(&DriverId::from("roof")).is_ok());
    }

    #[tokio::test]
    async fn test_registry_events() {
        let barn = Barn::new();
        let mut events = barn.subscribe();

        barn.weather()
            .add(ObservingConditions::dummy(DriverInfo::new("station", "Station", "")))
            .unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::DriverAdded {
                category: DeviceCategory::ObservingConditions,
                id: DriverId::from("station"),
            }
        );

        for handle in barn.refresh().unwrap() {
            handle.await.unwrap();
        }
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::DriverRefreshed {
                category: DeviceCategory::ObservingConditions,
                id: DriverId::from("station"),
                error: None,
            }
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_from_config_builds_all_kinds() {
        let mut flag = NamedTempFile::new().unwrap();
        write!(flag, "OPEN").unwrap();

        let mut monitors = MonitorsConfig::default();
        monitors.file.insert(
            "Roof".to_string(),
            FileMonitorConfig {
                name: "Roof".to_string(),
                description: "Roof switch".to_string(),
                path: flag.path().to_string_lossy().to_string(),
                rule: RuleConfig {
                    pattern: "open".to_string(),
                    invert: false,
                },
            },
        );
        monitors.dummy.insert(
            "always".to_string(),
            DummyMonitorConfig {
                name: "Always".to_string(),
                description: String::new(),
                is_safe: true,
            },
        );

        let mut weather = WeatherStationsConfig::default();
        weather.dummy.insert("sim".to_string(), DummyWeatherConfig::default());
        weather.http.insert("nourl".to_string(), HttpWeatherConfig::default());

        let barn = Barn::from_config(&monitors, &weather).await.unwrap();

        let ids: Vec<String> = barn.monitors().ids().unwrap().iter().map(|i| i.to_string()).collect();
        assert_eq!(ids, ["always", "roof"]);

        let roof = barn.monitors().get(&DriverId::from("roof")).unwrap();
        assert!(roof.is_safe().await);
        assert_eq!(roof.name(), "Roof");
        assert_eq!(roof.kind(), "file");

        let stations = barn.weather().ids().unwrap();
        assert_eq!(stations, vec![DriverId::from("sim")]);
    }
}
