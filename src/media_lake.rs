//! Device and media operations that span the database and payload storage.

use std::sync::Arc;

use actix_web::web;
use log::{info, warn};

use crate::entity::{device::Device, media_file::MediaFile};
use crate::error::{AppError, AppResult};
use crate::repo::{device_repo::DeviceRepo, media_repo::MediaRepo};
use crate::storage::Storage;

/// Diesel calls are blocking; each one runs on the actix blocking pool.
#[derive(Clone)]
pub struct MediaLake {
    devices: Arc<dyn DeviceRepo>,
    media: Arc<dyn MediaRepo>,
    storage: Arc<dyn Storage>,
}

impl MediaLake {
    pub fn new<D, M, S>(devices: D, media: M, storage: S) -> Self
    where
        D: DeviceRepo + 'static,
        M: MediaRepo + 'static,
        S: Storage + 'static,
    {
        Self {
            devices: Arc::new(devices),
            media: Arc::new(media),
            storage: Arc::new(storage),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub async fn list_devices(&self) -> AppResult<Vec<Device>> {
        let repo = self.devices.clone();
        web::block(move || repo.list_devices()).await?
    }

    pub async fn create_device(&self, name: String) -> AppResult<Device> {
        let repo = self.devices.clone();
        let device = web::block(move || repo.create_device(&name)).await??;
        info!("created device {} ({})", device.id, device.name);
        Ok(device)
    }

    pub async fn get_device(&self, id: i32) -> AppResult<Device> {
        let repo = self.devices.clone();
        web::block(move || repo.get_device(id))
            .await??
            .ok_or_else(|| AppError::NotFound(format!("device {id} not found")))
    }

    /// Removes the device, its media rows, then their payloads.
    pub async fn delete_device(&self, id: i32) -> AppResult<()> {
        let repo = self.devices.clone();
        let files = web::block(move || repo.delete_device(id)).await??;
        info!("deleted device {id} with {} media file(s)", files.len());
        for name in files {
            if let Err(e) = self.storage.delete(&name).await {
                warn!("device {id} deleted but payload {name} was not removed: {e:#}");
            }
        }
        Ok(())
    }

    pub async fn list_media(&self) -> AppResult<Vec<MediaFile>> {
        let repo = self.media.clone();
        web::block(move || repo.list_media()).await?
    }

    pub async fn list_media_for_device(&self, device_id: i32) -> AppResult<Vec<MediaFile>> {
        self.get_device(device_id).await?;
        let repo = self.media.clone();
        web::block(move || repo.list_for_device(device_id)).await?
    }

    pub async fn list_media_with_devices(&self) -> AppResult<Vec<(MediaFile, Device)>> {
        let repo = self.media.clone();
        web::block(move || repo.list_with_devices()).await?
    }

    /// Stores `bytes` and records it against `device_id`.
    ///
    /// Nothing is written for an unknown device. If the row cannot be inserted
    /// after the payload was saved, the payload is removed again.
    pub async fn upload_media(
        &self,
        device_id: i32,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> AppResult<MediaFile> {
        self.get_device(device_id).await?;

        let name = self.storage.save(file_name, &bytes).await?;
        let repo = self.media.clone();
        let stored = name.clone();
        let inserted = match web::block(move || repo.insert_media(device_id, &stored)).await {
            Ok(res) => res,
            Err(e) => Err(e.into()),
        };
        match inserted {
            Ok(media) => {
                info!(
                    "stored {} ({} bytes) for device {device_id}",
                    media.file,
                    bytes.len()
                );
                Ok(media)
            }
            Err(e) => {
                if let Err(del) = self.storage.delete(&name).await {
                    warn!("failed to remove orphaned payload {name}: {del:#}");
                }
                Err(e)
            }
        }
    }
}
