/*!
 * The fixed table of weather sensors and whether this gateway serves them.
 */
use std::fmt;

/// Name of the pseudo-sensor carrying the refresh timestamp in device state
pub const TIMESTAMP: &str = "TimeStamp";

/// A named weather quantity of the ObservingConditions interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    /// Averaging window in hours
    AveragePeriod,
    /// Cloud cover in percent
    CloudCover,
    /// Dew point in degrees Celsius
    DewPoint,
    /// Relative humidity in percent
    Humidity,
    /// Pressure in hPa
    Pressure,
    /// Rain rate in mm/h
    RainRate,
    /// Sky brightness in lux
    SkyBrightness,
    /// Sky quality in mag/arcsec²
    SkyQuality,
    /// Sky temperature in degrees Celsius
    SkyTemperature,
    /// Seeing in arcseconds
    StarFwhm,
    /// Ambient temperature in degrees Celsius
    Temperature,
    /// Wind direction in degrees
    WindDirection,
    /// Peak wind gust in m/s
    WindGust,
    /// Wind speed in m/s
    WindSpeed,
}

/// Outcome of looking a sensor name up in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorAvailability {
    /// Not a sensor name at all
    Unknown,
    /// A valid sensor this gateway does not measure
    Disabled(Sensor),
    /// A valid sensor this gateway serves
    Enabled(Sensor),
}

impl SensorAvailability {
    /// Whether the name designates a sensor
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Whether the sensor is served
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }
}

impl Sensor {
    /// Every sensor, in table order
    pub const ALL: [Sensor; 14] = [
        Sensor::AveragePeriod,
        Sensor::CloudCover,
        Sensor::DewPoint,
        Sensor::Humidity,
        Sensor::Pressure,
        Sensor::RainRate,
        Sensor::SkyBrightness,
        Sensor::SkyQuality,
        Sensor::SkyTemperature,
        Sensor::StarFwhm,
        Sensor::Temperature,
        Sensor::WindDirection,
        Sensor::WindGust,
        Sensor::WindSpeed,
    ];

    /// Canonical protocol name
    pub fn name(&self) -> &'static str {
        match self {
            Self::AveragePeriod => "AveragePeriod",
            Self::CloudCover => "CloudCover",
            Self::DewPoint => "DewPoint",
            Self::Humidity => "Humidity",
            Self::Pressure => "Pressure",
            Self::RainRate => "RainRate",
            Self::SkyBrightness => "SkyBrightness",
            Self::SkyQuality => "SkyQuality",
            Self::SkyTemperature => "SkyTemperature",
            Self::StarFwhm => "StarFWHM",
            Self::Temperature => "Temperature",
            Self::WindDirection => "WindDirection",
            Self::WindGust => "WindGust",
            Self::WindSpeed => "WindSpeed",
        }
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::AveragePeriod => "Average period for weather measurements",
            Self::CloudCover => "Cloud cover percentage",
            Self::DewPoint => "Dew point temperature",
            Self::Humidity => "Relative humidity percentage",
            Self::Pressure => "Atmospheric pressure",
            Self::RainRate => "Rain rate measurement",
            Self::SkyBrightness => "Sky brightness measurement",
            Self::SkyQuality => "Sky quality measurement",
            Self::SkyTemperature => "Sky temperature measurement",
            Self::StarFwhm => "Star full width at half maximum",
            Self::Temperature => "Ambient temperature",
            Self::WindDirection => "Wind direction in degrees",
            Self::WindGust => "Wind gust speed",
            Self::WindSpeed => "Wind speed measurement",
        }
    }

    /// Whether this gateway serves the sensor
    pub fn is_enabled(&self) -> bool {
        !matches!(
            self,
            Self::CloudCover
                | Self::SkyBrightness
                | Self::SkyQuality
                | Self::SkyTemperature
                | Self::StarFwhm
        )
    }

    /// Whether the sensor is an actual measurement rather than a setting
    pub fn is_measurement(&self) -> bool {
        !matches!(self, Self::AveragePeriod)
    }

    /// Case-insensitive lookup by protocol name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|sensor| sensor.name().eq_ignore_ascii_case(name))
    }

    /// Classify a sensor name
    pub fn availability(name: &str) -> SensorAvailability {
        match Self::from_name(name) {
            None => SensorAvailability::Unknown,
            Some(sensor) if sensor.is_enabled() => SensorAvailability::Enabled(sensor),
            Some(sensor) => SensorAvailability::Disabled(sensor),
        }
    }

    /// Served measurements, in table order
    pub fn enabled_measurements() -> impl Iterator<Item = Sensor> {
        Self::ALL
            .into_iter()
            .filter(|sensor| sensor.is_enabled() && sensor.is_measurement())
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
