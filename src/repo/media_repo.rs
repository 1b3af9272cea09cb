use chrono::Utc;
use diesel::prelude::*;

use crate::{
    db::{Pool, PooledConn},
    entity::device::Device,
    entity::media_file::{MediaFile, NewMediaFile},
    error::{AppError, AppResult},
    schema::{devices, media_files},
};

struct MediaRepoImpl {
    pool: Pool,
}

impl MediaRepoImpl {
    fn new(pool: Pool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> AppResult<PooledConn> {
        Ok(self.pool.get()?)
    }

    pub fn list_media(&self) -> AppResult<Vec<MediaFile>> {
        let mut conn = self.conn()?;
        Ok(media_files::table
            .order(media_files::id.asc())
            .select(MediaFile::as_select())
            .load(&mut conn)?)
    }

    pub fn list_for_device(&self, device_id: i32) -> AppResult<Vec<MediaFile>> {
        let mut conn = self.conn()?;
        Ok(media_files::table
            .filter(media_files::device_id.eq(device_id))
            .order(media_files::id.asc())
            .select(MediaFile::as_select())
            .load(&mut conn)?)
    }

    pub fn list_with_devices(&self) -> AppResult<Vec<(MediaFile, Device)>> {
        let mut conn = self.conn()?;
        Ok(media_files::table
            .inner_join(devices::table)
            .order(media_files::id.asc())
            .select((MediaFile::as_select(), Device::as_select()))
            .load(&mut conn)?)
    }

    pub fn insert_media(&self, device_id: i32, file: &str) -> AppResult<MediaFile> {
        let mut conn = self.conn()?;
        conn.immediate_transaction(|c| {
            let exists = devices::table
                .find(device_id)
                .select(devices::id)
                .first::<i32>(c)
                .optional()?;
            if exists.is_none() {
                return Err(AppError::NotFound(format!("device {device_id} not found")));
            }
            let new_row = NewMediaFile {
                device_id,
                file,
                uploaded: Utc::now().naive_utc(),
            };
            Ok(diesel::insert_into(media_files::table)
                .values(&new_row)
                .returning(MediaFile::as_returning())
                .get_result(c)?)
        })
    }
}

/// Repository interface for media file records.
pub trait MediaRepo: Send + Sync + 'static {
    fn list_media(&self) -> AppResult<Vec<MediaFile>>;

    fn list_for_device(&self, device_id: i32) -> AppResult<Vec<MediaFile>>;

    /// Every media row joined with its owning device, in upload order.
    fn list_with_devices(&self) -> AppResult<Vec<(MediaFile, Device)>>;

    /// Fails with `NotFound` when `device_id` has no device row.
    fn insert_media(&self, device_id: i32, file: &str) -> AppResult<MediaFile>;
}

impl MediaRepo for MediaRepoImpl {
    fn list_media(&self) -> AppResult<Vec<MediaFile>> {
        Self::list_media(self)
    }

    fn list_for_device(&self, device_id: i32) -> AppResult<Vec<MediaFile>> {
        Self::list_for_device(self, device_id)
    }

    fn list_with_devices(&self) -> AppResult<Vec<(MediaFile, Device)>> {
        Self::list_with_devices(self)
    }

    fn insert_media(&self, device_id: i32, file: &str) -> AppResult<MediaFile> {
        Self::insert_media(self, device_id, file)
    }
}

pub fn new_media_repo(pool: Pool) -> impl MediaRepo {
    MediaRepoImpl::new(pool)
}
