//! Request and response bodies of the JSON API.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{device::Device, media_file::MediaFile};
use crate::error::{AppError, AppResult};

pub const DEVICE_NAME_MAX_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct DeviceCreate {
    pub name: String,
}

impl DeviceCreate {
    pub fn validate(&self) -> AppResult<()> {
        validate_device_name(&self.name)
    }
}

/// A device name must hold between 1 and 100 characters.
pub fn validate_device_name(name: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::Validation("name: field required".into()));
    }
    let len = name.chars().count();
    if len > DEVICE_NAME_MAX_CHARS {
        return Err(AppError::Validation(format!(
            "name: ensure this value has at most {DEVICE_NAME_MAX_CHARS} characters (got {len})"
        )));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DeviceOut {
    pub id: i32,
    pub name: String,
    pub created: DateTime<Utc>,
}

impl From<Device> for DeviceOut {
    fn from(d: Device) -> Self {
        Self {
            id: d.id,
            name: d.name,
            created: as_utc(d.created),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MediaFileOut {
    pub id: i32,
    pub device_id: i32,
    pub file: String,
    pub uploaded: DateTime<Utc>,
}

impl From<MediaFile> for MediaFileOut {
    fn from(m: MediaFile) -> Self {
        Self {
            id: m.id,
            device_id: m.device_id,
            file: m.file,
            uploaded: as_utc(m.uploaded),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub device_id: i32,
}

pub fn as_utc(ts: NaiveDateTime) -> DateTime<Utc> {
    ts.and_utc()
}
