//! Command line client for a configured backend.
//!
//! Run with: `backend-request --config backend.json --env development /items GET`

use backend_request::{Body, Client, Config, Error, RequestOptions, Response};
use clap::Parser;
use http::Method;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "backend-request", version, about = "Call a configured backend")]
struct Cli {
    /// JSON backend configuration
    #[arg(short, long, env = "BACKEND_CONFIG")]
    config: Option<PathBuf>,

    /// Environment section of the configuration to apply
    #[arg(short, long, env = "BACKEND_ENV")]
    env: Option<String>,

    /// Absolute URL, or a path relative to the backend URL
    url: Option<String>,

    /// HTTP method
    #[arg(default_value = "GET")]
    method: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("backend_request=info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("err: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Error> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path, cli.env.as_deref())?,
        None => Config::default(),
    };

    let Some(url) = cli.url else {
        println!("usage: backend-request [--config FILE] [--env NAME] <url> [method]");
        if let Some(example) = &config.example {
            println!("example: backend-request {}", example);
        }
        return Ok(ExitCode::SUCCESS);
    };

    let method = Method::from_bytes(cli.method.to_ascii_uppercase().as_bytes())
        .map_err(|e| Error::Configuration(format!("Invalid method: {}", e)))?;

    println!("environment={}", cli.env.as_deref().unwrap_or("-"));
    println!("using settings:{:#?}", config);

    let client = Client::new(config)?;
    let response = client
        .request(RequestOptions::from(url).with_method(method))
        .await?;

    print_response(&response);
    if response.class.error().is_some() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_response(response: &Response) {
    let label = if response.class.error().is_some() {
        "ERROR"
    } else {
        "OK"
    };
    println!("{} status:{}", label, response.status.as_u16());
    println!("headers:{:#?}", response.headers);
    match &response.body {
        Body::Json(value) => match serde_json::to_string_pretty(value) {
            Ok(pretty) => println!("body:{}", pretty),
            Err(_) => println!("body:{}", value),
        },
        _ => println!("body:{}", response.text()),
    }
}
