//! Device: a sensor or actuator known to the registry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LumenError, ValidationError};
use crate::id::DeviceId;
use crate::time::Timestamp;

/// What a device does. Serialized as `deviceTypeCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Sensor,
    Actuator,
}

impl DeviceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::Actuator => "actuator",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sensor" => Ok(Self::Sensor),
            "actuator" => Ok(Self::Actuator),
            other => Err(format!("unknown device kind: {other}")),
        }
    }
}

/// Connectivity status of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    #[default]
    Offline,
    Error,
}

impl DeviceStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeviceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown device status: {other}")),
        }
    }
}

/// A registered sensor or actuator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: DeviceId,
    #[serde(rename = "deviceName")]
    pub name: String,
    #[serde(rename = "deviceTypeCode")]
    pub kind: DeviceKind,
    /// Network address used to reach the device (`http://...`, `virtual://...`).
    #[serde(rename = "ipAddress")]
    pub address: String,
    pub status: DeviceStatus,
    pub last_seen: Option<Timestamp>,
    pub location: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    /// Last known actuator position, 0 (closed) to 100 (open).
    pub level: Option<u8>,
}

impl Device {
    /// Create a builder for constructing a [`Device`].
    #[must_use]
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::Validation`] when the name or address is empty
    /// or the level exceeds 100.
    pub fn validate(&self) -> Result<(), LumenError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.address.trim().is_empty() {
            return Err(ValidationError::EmptyAddress.into());
        }
        if let Some(level) = self.level
            && level > 100
        {
            return Err(ValidationError::LevelOutOfRange(level).into());
        }
        Ok(())
    }

    #[must_use]
    pub fn is_sensor(&self) -> bool {
        self.kind == DeviceKind::Sensor
    }

    #[must_use]
    pub fn is_actuator(&self) -> bool {
        self.kind == DeviceKind::Actuator
    }

    /// Apply a status observation unless it is older than what is stored.
    ///
    /// Returns `false` (and leaves the device untouched) when `at` is not
    /// strictly newer than `last_seen`.
    pub fn observe(&mut self, update: StatusUpdate, at: Timestamp) -> bool {
        if self.last_seen.is_some_and(|seen| at <= seen) {
            return false;
        }
        self.status = update.status;
        if update.level.is_some() {
            self.level = update.level;
        }
        self.last_seen = Some(at);
        true
    }

    /// Replace the administrator-owned fields with those of `other`.
    ///
    /// Status and last-seen are kept; the level only changes when `other`
    /// carries one.
    pub fn apply_definition(&mut self, other: Device) {
        self.name = other.name;
        self.kind = other.kind;
        self.address = other.address;
        self.location = other.location;
        self.manufacturer = other.manufacturer;
        self.model = other.model;
        if other.level.is_some() {
            self.level = other.level;
        }
    }
}

/// A status observation recorded through the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: DeviceStatus,
    pub level: Option<u8>,
}

impl StatusUpdate {
    #[must_use]
    pub fn online() -> Self {
        Self::from(DeviceStatus::Online)
    }

    #[must_use]
    pub fn with_level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }
}

impl From<DeviceStatus> for StatusUpdate {
    fn from(status: DeviceStatus) -> Self {
        Self {
            status,
            level: None,
        }
    }
}

/// Step-by-step builder for [`Device`].
#[derive(Debug, Default)]
pub struct DeviceBuilder {
    id: Option<DeviceId>,
    name: Option<String>,
    kind: Option<DeviceKind>,
    address: Option<String>,
    status: Option<DeviceStatus>,
    location: Option<String>,
    manufacturer: Option<String>,
    model: Option<String>,
    level: Option<u8>,
}

impl DeviceBuilder {
    #[must_use]
    pub fn id(mut self, id: DeviceId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: DeviceKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: DeviceStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    /// Consume the builder, validate, and return a [`Device`].
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::Validation`] if the identifier is missing or
    /// any field breaks an invariant.
    pub fn build(self) -> Result<Device, LumenError> {
        let id = self.id.ok_or(ValidationError::MissingField { field: "id" })?;
        let device = Device {
            id,
            name: self.name.unwrap_or_default(),
            kind: self.kind.unwrap_or(DeviceKind::Sensor),
            address: self.address.unwrap_or_default(),
            status: self.status.unwrap_or_default(),
            last_seen: None,
            location: self.location,
            manufacturer: self.manufacturer,
            model: self.model,
            level: self.level,
        };
        device.validate()?;
        Ok(device)
    }
}
