//! Config validation CLI tool
//!
//! Validates a tutord configuration file and reports any errors.

use std::path::PathBuf;
use std::process::ExitCode;
use tutor_util::default_config_path;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a tutord configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match tutor_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", tutor_config::CURRENT_CONFIG_VERSION);
            println!("  Data directory: {}", policy.service.data_dir.display());
            println!(
                "  Sweep interval: {}s",
                policy.service.sweep_interval.as_secs()
            );
            println!(
                "  Ending soon: {} days, due soon: {} days, course length: {} months",
                policy.thresholds.ending_soon.num_days(),
                policy.thresholds.due_soon.num_days(),
                policy.thresholds.course_length_months
            );
            println!(
                "  Email: {}",
                if policy.email.enabled { "enabled" } else { "disabled" }
            );

            println!();
            println!("Schedule:");
            for (cohort, days) in policy.schedule.iter() {
                println!("  - {}: {}", cohort, days);
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                tutor_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                tutor_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                tutor_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                tutor_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        tutor_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
