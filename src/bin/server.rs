use std::{fs, path::PathBuf};

use anyhow::Result;
use backup_device::{
    db::establish_pool,
    logging::init_logging,
    repo::device_repo::new_device_repo,
    repo::media_repo::new_media_repo,
    server::{self, ServerConfig},
};
use clap::Parser;
use log::info;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Device registry and media upload service", long_about = None)]
struct Args {
    /// Storage root directory; payloads land under <root>/uploads
    #[arg(long, default_value = "./media")]
    storage_root: PathBuf,
    /// SQLite db file path
    #[arg(long, default_value = "./db.sqlite3")]
    db_path: PathBuf,
    /// Bind address
    #[arg(long, default_value = "127.0.0.1:8000")]
    addr: String,
    /// Largest accepted upload payload in bytes
    #[arg(long, default_value_t = server::DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,
    /// Run migrations and exit (for testing/deployment)
    #[arg(long, default_value_t = false)]
    migrate_only: bool,
}

#[actix_web::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    fs::create_dir_all(&args.storage_root)?;
    if let Some(parent) = args.db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let pool = establish_pool(&args.db_path)?;
    let device_repo = new_device_repo(pool.clone());
    let media_repo = new_media_repo(pool);

    if args.migrate_only {
        info!("migrations applied, exiting due to --migrate-only flag");
        return Ok(());
    }

    let cfg = ServerConfig {
        storage_root: args.storage_root.clone(),
        addr: args.addr.clone(),
        max_upload_bytes: args.max_upload_bytes,
    };
    server::run(cfg, device_repo, media_repo).await
}
