//! `fpstore`: inspect and maintain fingerprint stores.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use fpstore_cli::cli::{self, EXIT_OK, OkEnvelope, exit_code_for, render_error};
use fpstore_cli::tracing::{TracingConfig, TracingFormat, init_tracing};
use fpstore_cli::{execute, load_config};

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();
    let format = if cli.json {
        TracingFormat::Json
    } else {
        cli.log_format
    };
    if let Err(e) = init_tracing(TracingConfig {
        format,
        level: cli.level.into(),
        filter: None,
    }) {
        eprintln!("{e:?}");
    }

    let result = match load_config(cli.config.as_deref()) {
        Ok(config) => execute(cli.command, &config).await,
        Err(err) => Err(err),
    };

    let code = match result {
        Ok(output) => {
            if cli.json {
                match serde_json::to_string(&OkEnvelope::new(output.data)) {
                    Ok(json) => println!("{json}"),
                    Err(e) => eprintln!("Error serializing response: {e}"),
                }
            } else if !output.text.is_empty() {
                println!("{}", output.text);
            }
            EXIT_OK
        }
        Err(err) => {
            render_error(&err, cli.json);
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}
