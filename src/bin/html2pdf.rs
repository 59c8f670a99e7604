use html2pdf::browser::ChromeEngine;
use html2pdf::cli::Args;
use html2pdf::pdf;
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.log_filter())
    ).init();

    let engine = ChromeEngine::new(args.launch_config());

    match pdf::generate(engine, args.request(), args.network_idle()).await {
        Ok(path) => {
            log::info!("Output at {}", path.display());
            println!("PDF generated successfully!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error generating PDF: {}", e);
            ExitCode::FAILURE
        }
    }
}
