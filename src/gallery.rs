use anyhow::Result;
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;

use crate::entity::{device::Device, media_file::MediaFile};
use crate::model::as_utc;

const GALLERY_TEMPLATE: &str = "gallery";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg"];

/// One tile of the gallery page.
#[derive(Debug, Serialize)]
pub struct GalleryEntry {
    pub url: String,
    pub file_name: String,
    pub is_image: bool,
    pub device_id: i32,
    pub device_name: String,
    pub uploaded: String,
}

impl GalleryEntry {
    pub fn new(media: &MediaFile, device: &Device) -> Self {
        let file_name = media
            .file
            .rsplit('/')
            .next()
            .unwrap_or(&media.file)
            .to_string();
        let is_image = file_name
            .rsplit_once('.')
            .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        Self {
            url: format!("/media/{}", media.file),
            file_name,
            is_image,
            device_id: device.id,
            device_name: device.name.clone(),
            uploaded: as_utc(media.uploaded)
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string(),
        }
    }
}

pub fn gallery_templates() -> Result<Handlebars<'static>> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars.register_template_string(
        GALLERY_TEMPLATE,
        include_str!("../templates/gallery.hbs"),
    )?;
    Ok(handlebars)
}

pub fn render_gallery(handlebars: &Handlebars<'_>, entries: &[GalleryEntry]) -> Result<String> {
    Ok(handlebars.render(GALLERY_TEMPLATE, &json!({ "media_files": entries }))?)
}
