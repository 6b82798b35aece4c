#![warn(missing_docs)]
//! # chart-vision binary
//!
//! Terminal shell for chart-vision: key management and one-shot analysis.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chart_vision_app::{
    AnalyzeOutcome, AppConfig, AppError, ChartVisionApp, PromptKeyPicker, app_version,
    read_line_from,
};
use chart_vision_auth::{KeyPicker, StrategyKind};
use chart_vision_core::ImageFile;
use chart_vision_intake::FsImageSource;
use chart_vision_request::HttpModelTransport;
use chart_vision_ui::{
    KeyEntryMode, Screen, render_credential_prompt_text, render_panel_text,
};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "AI analysis of trading chart screenshots", long_about = None)]
struct Cli {
    /// Credential strategy: environment, picker, persisted or fixed
    #[arg(long, global = true)]
    key_strategy: Option<String>,
    /// Model identifier
    #[arg(long, global = true)]
    model: Option<String>,
    /// Model API base URL
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Ask for a trade suggestion alongside the analysis
    #[arg(long, global = true, default_value_t = false)]
    trade_suggestion: bool,
    /// Log progress to stderr
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Analyze one chart screenshot
    Analyze {
        /// Image file to analyze
        image: PathBuf,
    },
    /// Manage the API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Print the app version
    Version,
}

#[derive(Subcommand, Debug, Clone)]
enum KeyAction {
    /// Save a key (prompts when omitted)
    Set {
        /// Key value
        key: Option<String>,
    },
    /// Delete the saved key
    Clear,
    /// Show whether a key is ready
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("chart-vision: {error}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, AppError> {
    if matches!(cli.command, Command::Version) {
        println!("Chart Vision AI v{}", app_version());
        return Ok(ExitCode::SUCCESS);
    }

    let config = resolve_config(&cli)?;
    log::info!(
        "main | config | strategy={} model={} base_url={}",
        config.key_strategy.as_str(),
        config.model,
        config.base_url
    );

    let picker: Option<Arc<dyn KeyPicker>> = match config.key_strategy {
        StrategyKind::HostPicker => Some(Arc::new(PromptKeyPicker::stdin())),
        _ => None,
    };
    let transport = Arc::new(HttpModelTransport::new(&format!(
        "chart-vision/{}",
        app_version()
    ))?);
    let mut app =
        ChartVisionApp::from_config(&config, picker, transport, Arc::new(FsImageSource))?;

    if let Err(error) = app.start() {
        log::error!("main | start_failed | {error}");
    }

    match cli.command {
        Command::Version => Ok(ExitCode::SUCCESS),
        Command::Key { action } => run_key_action(&mut app, action),
        Command::Analyze { image } => run_analyze(&mut app, image),
    }
}

fn resolve_config(cli: &Cli) -> Result<AppConfig, AppError> {
    let mut config = AppConfig::from_env()?;
    if let Some(raw) = &cli.key_strategy {
        config.key_strategy = StrategyKind::parse(raw)
            .ok_or_else(|| AppError::Config(format!("unknown key strategy '{raw}'")))?;
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    config.trade_suggestion |= cli.trade_suggestion;
    Ok(config)
}

fn run_key_action(app: &mut ChartVisionApp, action: KeyAction) -> Result<ExitCode, AppError> {
    match action {
        KeyAction::Set { key } => {
            let input = match key {
                Some(key) => key,
                None => {
                    eprint!("API key: ");
                    read_line()?
                }
            };
            if let Err(error) = app.save_api_key(&input) {
                print_credential_screen(app);
                return Err(error);
            }
            println!("API key saved.");
        }
        KeyAction::Clear => {
            app.clear_api_key()?;
            println!("API key cleared.");
        }
        KeyAction::Status => {
            let bootstrap = app.bootstrap();
            println!("strategy: {}", bootstrap.strategy_kind().as_str());
            println!("state: {:?}", bootstrap.state());
            if let Some(problem) = bootstrap.configuration_error() {
                println!("error: {problem}");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_analyze(app: &mut ChartVisionApp, image: PathBuf) -> Result<ExitCode, AppError> {
    if !ensure_credential(app)? {
        return Ok(ExitCode::from(2));
    }

    let file = ImageFile::from_path(image)?;
    let name = file.name.clone();
    if !app.select_file(file) {
        eprintln!("{name} is not an image file.");
        return Ok(ExitCode::from(2));
    }

    let outcome = app.analyze();
    print!("{}", render_panel_text(&app.results_panel()));
    match outcome {
        AnalyzeOutcome::Completed => Ok(ExitCode::SUCCESS),
        AnalyzeOutcome::Disabled | AnalyzeOutcome::Failed(_) => Ok(ExitCode::FAILURE),
    }
}

/// Walks the credential screen until the main screen is reached.
///
/// Returns `false` when the user gives up or no entry is possible.
fn ensure_credential(app: &mut ChartVisionApp) -> Result<bool, AppError> {
    loop {
        let prompt = match app.screen() {
            Screen::Main => return Ok(true),
            Screen::Loading => return Ok(false),
            Screen::Credential(prompt) => prompt,
        };
        eprint!("{}", render_credential_prompt_text(&prompt));
        if prompt.configuration_error.is_some() {
            return Ok(false);
        }

        match prompt.mode {
            KeyEntryMode::Unavailable => return Ok(false),
            KeyEntryMode::Picker => {
                app.select_api_key()?;
                if !matches!(app.screen(), Screen::Main) {
                    return Ok(false);
                }
            }
            KeyEntryMode::Manual => {
                eprint!("API key: ");
                let input = read_line()?;
                if input.is_empty() {
                    return Ok(false);
                }
                match app.save_api_key(&input) {
                    Ok(()) => {}
                    Err(AppError::Auth(chart_vision_auth::AuthError::EmptyCredential)) => {}
                    Err(error) => return Err(error),
                }
            }
        }
    }
}

fn print_credential_screen(app: &ChartVisionApp) {
    if let Screen::Credential(prompt) = app.screen() {
        eprint!("{}", render_credential_prompt_text(&prompt));
    } else {
        let prompt = app.credential_prompt();
        if let Some(problem) = prompt.validation_error {
            eprintln!("{problem}");
        }
    }
}

fn read_line() -> Result<String, AppError> {
    read_line_from(&mut std::io::stdin().lock())
}
