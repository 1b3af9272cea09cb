use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

/// `file:line` of the log call site, `?` for whatever is unknown.
fn location(record: &log::Record<'_>) -> String {
    let file = record.file().unwrap_or("?");
    let line = record
        .line()
        .map(|l| l.to_string())
        .unwrap_or_else(|| "?".into());
    format!("{file}:{line}")
}

/// Initialize global logging (idempotent). `RUST_LOG` overrides the default `info` filter.
pub fn init_logging() {
    INIT.get_or_init(|| {
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("info,actix_server=warn"),
        )
        .format(|buf, record| {
            use std::io::Write;
            let ts = buf.timestamp_millis();
            writeln!(
                buf,
                "{ts} [{:<5}] {} {}",
                record.level(),
                location(record),
                record.args()
            )
        })
        .try_init(); // tests may initialize more than once
    });
}
