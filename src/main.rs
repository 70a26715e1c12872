use anyhow::Result;
use env_logger::Builder;
use log::kv::Key;
use rocket::data::{Limits, ToByteUnit};
use std::io::Write;

use pixelock::build_rocket;
use pixelock::capability::python::check_python_runtime;
use pixelock::config::APP_CONFIG;
use pixelock::pipeline::Pipeline;

fn initialize_logger() {
    Builder::new()
        .format(|buf, record| {
            let duration = record
                .key_values()
                .get(Key::from("duration"))
                .map(|value| format!(" ({})", value))
                .unwrap_or_default();
            writeln!(
                buf,
                "{} {} {} {}{}",
                buf.timestamp(),
                record.level(),
                record.target(),
                record.args(),
                duration
            )
        })
        .filter(None, log::LevelFilter::Info)
        .filter(Some("rocket"), log::LevelFilter::Warn)
        .init();
}

#[rocket::main]
async fn main() -> Result<()> {
    initialize_logger();
    check_python_runtime(&APP_CONFIG.python_bin, &APP_CONFIG.scripts_dir);

    let pipeline = Pipeline::production(&APP_CONFIG)?;

    let limit = APP_CONFIG.upload_limit_mib.mebibytes();
    let figment = rocket::Config::figment()
        .merge(("port", APP_CONFIG.port))
        .merge((
            "limits",
            Limits::default()
                .limit("file", limit)
                .limit("data-form", limit),
        ));

    build_rocket(figment, pipeline).launch().await?;
    Ok(())
}
