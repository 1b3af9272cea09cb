pub mod device_repo;
pub mod media_repo;

#[cfg(test)]
pub(crate) struct TempDb(std::path::PathBuf);

#[cfg(test)]
impl Drop for TempDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Fresh migrated database in the temp dir, removed when the guard drops.
#[cfg(test)]
pub(crate) fn test_pool() -> (crate::db::Pool, TempDb) {
    let path = std::env::temp_dir().join(format!(
        "backup-device-test-{}.sqlite3",
        uuid::Uuid::new_v4()
    ));
    let pool = crate::db::establish_pool(&path).expect("test pool");
    (pool, TempDb(path))
}
