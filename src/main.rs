use anyhow::{Context, Result};
use babelcall::{
    audio::Recorder, broker::TcpBroker, config::AppConfig, init_logging, init_tracing, log_debug,
    log_file_path, session::App, ui,
};
use clap::Parser;
use std::env;
use std::sync::Arc;

#[cfg(not(test))]
fn main() -> Result<()> {
    run_with_args(env::args_os())
}

#[cfg_attr(test, allow(dead_code))]
fn run_with_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let mut config = AppConfig::parse_from(args);

    if config.list_input_devices {
        let output = list_input_devices()?;
        print!("{output}");
        return Ok(());
    }

    config.validate()?;
    init_logging(&config);
    init_tracing(&config);
    let log_path = log_file_path();
    log_debug("=== BabelCall started ===");
    log_debug(&format!("Log file: {log_path:?}"));

    let broker = Arc::new(
        TcpBroker::connect(&config.broker)
            .with_context(|| format!("could not reach the broker at {}", config.broker))?,
    );
    let mut app = App::new(config, broker)?;
    let result = ui::run_app(&mut app);

    log_debug("=== BabelCall exiting ===");
    if let Err(ref e) = result {
        log_debug(&format!("Exit with error: {e:#}"));
    }

    result
}

fn list_input_devices() -> Result<String> {
    let devices = if let Ok(raw) = env::var("BABELCALL_TEST_DEVICES") {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        }
    } else {
        Recorder::list_devices()?
    };
    let mut output = String::new();
    if devices.is_empty() {
        output.push_str("No audio input devices detected.\n");
    } else {
        output.push_str("Available audio input devices:\n");
        for name in devices {
            output.push_str(&format!("  - {name}\n"));
        }
    }
    Ok(output)
}
