pub mod device;
pub mod media_file;
