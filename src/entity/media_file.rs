use crate::schema::media_files;
use chrono::NaiveDateTime;
use diesel::prelude::*;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = media_files)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MediaFile {
    pub id: i32,
    pub device_id: i32,
    /// Stored name under the uploads namespace, e.g. `uploads/<key>_photo.jpg`.
    pub file: String,
    pub uploaded: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = media_files)]
pub struct NewMediaFile<'a> {
    pub device_id: i32,
    pub file: &'a str,
    pub uploaded: NaiveDateTime,
}
