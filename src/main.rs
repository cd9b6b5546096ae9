use bridge::cli::{Cli, Commands};
use bridge::commands;
use clap::{CommandFactory, Parser};
use clap_complete::aot::generate;

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber with env-filter support.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config_file = cli.global.config_file.as_deref();

    let result = match cli.command {
        Commands::Serve { host, port } => commands::serve::run(config_file, host, port).await,
        Commands::Show { url } => commands::show::run(config_file, url).await.map(|()| 0),
        Commands::Stop { url } => commands::stop::run(config_file, url).await.map(|()| 0),
        Commands::Validate => commands::validate::run(config_file).map(|()| 0),
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "bridge", &mut std::io::stdout());
            Ok(0)
        }
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
