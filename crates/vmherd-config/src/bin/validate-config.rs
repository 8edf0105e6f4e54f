//! Config validation CLI tool
//!
//! Validates a vmherdd configuration file and reports any errors.

use vmherd_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a vmherdd configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match vmherd_config::load_config(&config_path) {
        Ok(settings) => {
            let rotation = &settings.rotation;
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", vmherd_config::CURRENT_CONFIG_VERSION);
            match &settings.hypervisor.executable {
                Some(path) => println!("  Executable: {}", path.display()),
                None => println!("  Executable: (resolved at startup)"),
            }
            println!("  Escape mode: {:?}", settings.hypervisor.escape_mode);
            println!();
            println!("Rotation:");
            println!("  Enabled: {}", rotation.enabled);
            println!("  Group: {}", rotation.group);
            println!("  Running limit: {}", rotation.running_limit);
            println!("  Work time: {}s", rotation.work_duration.as_secs());
            println!("  Start stagger: {}s", rotation.start_stagger.as_secs());
            println!("  Restart cooldown: {}s", rotation.restart_cooldown.as_secs());
            println!("  Start mode: {}", rotation.start_mode.as_str());

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                vmherd_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                vmherd_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                vmherd_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                vmherd_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        vmherd_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
