use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use actix_files::NamedFile;
use actix_multipart::{Field, Multipart};
use actix_web::http::header::ContentType;
use actix_web::middleware::Logger;
use actix_web::{App, HttpResponse, HttpServer, Responder, delete, get, post, web};
use anyhow::Result;
use futures_util::StreamExt;
use handlebars::Handlebars;
use log::info;
use serde_json::json;

use crate::error::AppError;
use crate::gallery::{GalleryEntry, gallery_templates, render_gallery};
use crate::media_lake::MediaLake;
use crate::model::{DeviceCreate, DeviceOut, MediaFileOut, UploadQuery};
use crate::repo::{device_repo::DeviceRepo, media_repo::MediaRepo};
use crate::storage::{StorageImpl, UPLOADS_NAMESPACE};

pub const SERVICE_NAME: &str = "backup_device";

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Longest accepted `device_id` form field.
const DEVICE_ID_FIELD_MAX_BYTES: usize = 32;

#[derive(Clone)]
pub struct AppState {
    lake: MediaLake,
    templates: Arc<Handlebars<'static>>,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(lake: MediaLake) -> Result<Self> {
        Ok(Self {
            lake,
            templates: Arc::new(gallery_templates()?),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        })
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

/// Liveness only; never touches the stores.
#[get("/health/")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({"status": "ok", "service": SERVICE_NAME}))
}

#[get("/devices/")]
async fn list_devices(data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let devices: Vec<DeviceOut> = data
        .lake
        .list_devices()
        .await?
        .into_iter()
        .map(DeviceOut::from)
        .collect();
    Ok(HttpResponse::Ok().json(devices))
}

#[post("/devices/")]
async fn create_device(
    payload: web::Json<DeviceCreate>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let payload = payload.into_inner();
    payload.validate()?;
    let device = data.lake.create_device(payload.name).await?;
    Ok(HttpResponse::Ok().json(DeviceOut::from(device)))
}

#[get("/devices/{id}/")]
async fn get_device(
    path: web::Path<i32>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let device = data.lake.get_device(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(DeviceOut::from(device)))
}

#[delete("/devices/{id}/")]
async fn delete_device(
    path: web::Path<i32>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    data.lake.delete_device(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/devices/{id}/media/")]
async fn list_device_media(
    path: web::Path<i32>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let media: Vec<MediaFileOut> = data
        .lake
        .list_media_for_device(path.into_inner())
        .await?
        .into_iter()
        .map(MediaFileOut::from)
        .collect();
    Ok(HttpResponse::Ok().json(media))
}

#[get("/media/")]
async fn list_media(data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let media: Vec<MediaFileOut> = data
        .lake
        .list_media()
        .await?
        .into_iter()
        .map(MediaFileOut::from)
        .collect();
    Ok(HttpResponse::Ok().json(media))
}

fn multipart_error(e: impl std::fmt::Display) -> AppError {
    AppError::Validation(format!("invalid multipart body: {e}"))
}

/// Buffer a field, failing as soon as it grows past `limit` bytes.
async fn read_field(field: &mut Field, limit: usize, label: &str) -> Result<Vec<u8>, AppError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(multipart_error)?;
        if bytes.len() + chunk.len() > limit {
            return Err(AppError::PayloadTooLarge(format!(
                "{label}: exceeds the {limit} byte limit"
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Consume a field without keeping its content.
async fn skip_field(field: &mut Field) -> Result<(), AppError> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(multipart_error)?;
    }
    Ok(())
}

/// `device_id` comes from the query string, or failing that from a form field.
/// The payload is the first part named `file` that carries a filename.
#[post("/media/")]
async fn upload_media(
    query: Option<web::Query<UploadQuery>>,
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let mut device_id = query.map(|q| q.device_id);
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(multipart_error)?;
        let disposition = field.content_disposition().clone();
        match (disposition.get_name().unwrap_or_default(), disposition.get_filename()) {
            ("file", Some(file_name)) if upload.is_none() => {
                let bytes = read_field(&mut field, data.max_upload_bytes, "file").await?;
                upload = Some((file_name.to_string(), bytes));
            }
            ("device_id", _) if device_id.is_none() => {
                let bytes = read_field(&mut field, DEVICE_ID_FIELD_MAX_BYTES, "device_id").await?;
                let raw = String::from_utf8_lossy(&bytes);
                let parsed = raw.trim().parse::<i32>().map_err(|_| {
                    AppError::Validation(format!("device_id: value is not a valid integer: {raw}"))
                })?;
                device_id = Some(parsed);
            }
            _ => skip_field(&mut field).await?,
        }
    }
    let device_id =
        device_id.ok_or_else(|| AppError::Validation("device_id: field required".into()))?;
    let (file_name, bytes) =
        upload.ok_or_else(|| AppError::Validation("file: field required".into()))?;

    info!("uploading file: {} for device {}", file_name, device_id);
    let media = data.lake.upload_media(device_id, bytes, &file_name).await?;
    Ok(HttpResponse::Ok().json(MediaFileOut::from(media)))
}

#[get("/media/uploads/{name}")]
async fn download(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<NamedFile, AppError> {
    let name = format!("{UPLOADS_NAMESPACE}/{}", path.into_inner());
    let file_path = data
        .lake
        .storage()
        .resolve_path(&name)
        .map_err(|_| AppError::NotFound("Not Found".into()))?;
    NamedFile::open_async(&file_path).await.map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            AppError::NotFound("Not Found".into())
        } else {
            e.into()
        }
    })
}

#[get("/gallery/")]
async fn gallery(data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let rows = data.lake.list_media_with_devices().await?;
    let entries: Vec<GalleryEntry> = rows
        .iter()
        .map(|(media, device)| GalleryEntry::new(media, device))
        .collect();
    let html = render_gallery(&data.templates, &entries)?;
    Ok(HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(html))
}

/// Routes and extractor settings. Malformed JSON bodies and path segments answer 422.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    )
    .service(health)
    .service(list_devices)
    .service(create_device)
    .service(get_device)
    .service(delete_device)
    .service(list_device_media)
    .service(list_media)
    .service(upload_media)
    .service(download)
    .service(gallery);
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub storage_root: PathBuf,
    pub addr: String,
    pub max_upload_bytes: usize,
}

pub async fn run<D, M>(config: ServerConfig, device_repo: D, media_repo: M) -> Result<()>
where
    D: DeviceRepo + 'static,
    M: MediaRepo + 'static,
{
    let lake = MediaLake::new(
        device_repo,
        media_repo,
        StorageImpl::new(config.storage_root.clone()),
    );
    let data = web::Data::new(AppState::new(lake)?.with_max_upload_bytes(config.max_upload_bytes));
    let bind_addr = config.addr.clone();
    info!(
        "Starting {} at http://{} (storage root {:?})",
        SERVICE_NAME, &bind_addr, config.storage_root
    );
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(data.clone())
            .configure(configure)
    })
    .bind(&bind_addr)?
    .run()
    .await?;
    Ok(())
}
