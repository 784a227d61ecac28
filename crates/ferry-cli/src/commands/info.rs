//! `ferry info`: version, platform and effective settings.

use std::path::Path;

use ferry_runtime::{descriptors, RuntimeOptions};

pub fn execute(options: &RuntimeOptions, config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("Ferry v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Platform:     {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    println!("CPUs:         {}", num_cpus::get());

    match config_path {
        Some(path) => println!("Config:       {}", path.display()),
        None => println!("Config:       (defaults)"),
    }

    let bridge = &options.config.bridge;
    let workers = &options.config.workers;
    println!();
    println!("Conversion:");
    println!("  max buffer:     {} bytes", bridge.max_external_buffer_len);
    println!("  dynamic types:  {}", bridge.dynamic_types.join(", "));
    println!("Workers:");
    println!("  threads:        {}", workers.thread_count());
    println!("  shutdown wait:  {} ms", workers.shutdown_timeout_ms);

    println!();
    let names: Vec<&str> = descriptors().into_iter().map(|d| d.name()).collect();
    println!("Types:        {}", names.join(", "));

    Ok(())
}
