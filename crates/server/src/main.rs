use junction_runner::{RunController, ScenarioSettings};
use junction_server::{AppState, create_router};
use std::sync::Arc;

fn print_help() {
    eprintln!(
        r#"Junction Server - simulation broker

USAGE:
    junction-server [OPTIONS]

OPTIONS:
    --config <PATH>     Load scenario settings from JSON file
    --run               Run the configured scenario to completion and exit
    --help              Print this help message

ENVIRONMENT VARIABLES:
    HOST                Server host (default: 0.0.0.0)
    PORT                Server port (default: 8080)
    RUST_LOG            Log level filter

EXAMPLES:
    # Serve the control API, settings posted to /setup
    junction-server

    # Serve a preconfigured run
    junction-server --config scenario.json

    # Headless run, report printed to stdout
    junction-server --config scenario.json --run
"#
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut headless = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
                config_path = Some(args[i].clone());
            }
            "--run" => headless = true,
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let client = reqwest::Client::new();
    let controller = match &config_path {
        Some(path) => {
            log::info!("Loading scenario settings from: {}", path);
            let settings = ScenarioSettings::from_file(path)?;
            let controller = RunController::from_settings(&settings, &client)?;
            log::info!(
                "Run {}: {} peers, horizon {}",
                controller.run_id(),
                controller.registry().len(),
                controller.config().horizon
            );
            Some(controller)
        }
        None => None,
    };

    if headless {
        let Some(mut controller) = controller else {
            eprintln!("Error: --run requires --config");
            std::process::exit(1);
        };
        let report = controller.run().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        if !report.is_done() {
            std::process::exit(2);
        }
        return Ok(());
    }

    let state = match controller {
        Some(controller) => AppState::with_controller(client, controller),
        None => AppState::new(client),
    };

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    let app = create_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    log::info!("Simulation broker listening on http://{}:{}", host, port);
    axum::serve(listener, app).await?;

    Ok(())
}
