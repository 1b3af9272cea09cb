use chrono::Utc;
use diesel::prelude::*;

use crate::{
    db::{Pool, PooledConn},
    entity::device::{Device, NewDevice},
    error::{AppError, AppResult},
    model::validate_device_name,
    schema::{devices, media_files},
};

struct DeviceRepoImpl {
    pool: Pool,
}

impl DeviceRepoImpl {
    fn new(pool: Pool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> AppResult<PooledConn> {
        Ok(self.pool.get()?)
    }

    pub fn list_devices(&self) -> AppResult<Vec<Device>> {
        let mut conn = self.conn()?;
        Ok(devices::table
            .order(devices::id.asc())
            .select(Device::as_select())
            .load(&mut conn)?)
    }

    pub fn create_device(&self, name: &str) -> AppResult<Device> {
        validate_device_name(name)?;
        let mut conn = self.conn()?;
        let new_row = NewDevice {
            name,
            created: Utc::now().naive_utc(),
        };
        Ok(diesel::insert_into(devices::table)
            .values(&new_row)
            .returning(Device::as_returning())
            .get_result(&mut conn)?)
    }

    pub fn get_device(&self, id: i32) -> AppResult<Option<Device>> {
        let mut conn = self.conn()?;
        Ok(devices::table
            .find(id)
            .select(Device::as_select())
            .first(&mut conn)
            .optional()?)
    }

    pub fn delete_device(&self, id: i32) -> AppResult<Vec<String>> {
        let mut conn = self.conn()?;
        conn.immediate_transaction(|c| {
            let exists = devices::table
                .find(id)
                .select(devices::id)
                .first::<i32>(c)
                .optional()?;
            if exists.is_none() {
                return Err(AppError::NotFound(format!("device {id} not found")));
            }
            let files = media_files::table
                .filter(media_files::device_id.eq(id))
                .select(media_files::file)
                .load::<String>(c)?;
            diesel::delete(media_files::table.filter(media_files::device_id.eq(id))).execute(c)?;
            diesel::delete(devices::table.find(id)).execute(c)?;
            Ok(files)
        })
    }
}

/// Repository interface for device records.
/// Public trait; concrete implementation is private to this module.
pub trait DeviceRepo: Send + Sync + 'static {
    fn list_devices(&self) -> AppResult<Vec<Device>>;

    /// Validates the name before inserting.
    fn create_device(&self, name: &str) -> AppResult<Device>;

    fn get_device(&self, id: i32) -> AppResult<Option<Device>>;

    /// Deletes the device and every media row it owns in one transaction.
    /// Returns the stored file names of the removed media.
    fn delete_device(&self, id: i32) -> AppResult<Vec<String>>;
}

impl DeviceRepo for DeviceRepoImpl {
    fn list_devices(&self) -> AppResult<Vec<Device>> {
        Self::list_devices(self)
    }

    fn create_device(&self, name: &str) -> AppResult<Device> {
        Self::create_device(self, name)
    }

    fn get_device(&self, id: i32) -> AppResult<Option<Device>> {
        Self::get_device(self, id)
    }

    fn delete_device(&self, id: i32) -> AppResult<Vec<String>> {
        Self::delete_device(self, id)
    }
}

/// Create a new device repository instance. The concrete type is hidden; callers only see the trait.
pub fn new_device_repo(pool: Pool) -> impl DeviceRepo {
    DeviceRepoImpl::new(pool)
}
