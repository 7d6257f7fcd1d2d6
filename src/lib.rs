pub mod api_key;
pub mod audio;
pub mod cli;
pub mod coach;
pub mod live;
pub mod logging;
pub mod settings;
pub mod state_machine;
pub mod stats;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use serde::de::DeserializeOwned;
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast;

use audio::CpalAudioProvider;
use cli::{Cli, Command, KeyAction};
use coach::{
    greeting, CoachChat, CoachError, GeminiClient, Job, JobFilters, ResumeAnalysis,
    COACH_ERROR_MESSAGE,
};
use live::{GeminiLiveTransport, SessionContext, SessionStatus, VoiceSession};
use settings::AppSettings;

/// Parse arguments, set up logging and run one command to completion
pub fn run() {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => settings::load_settings_from(path),
        None => settings::load_settings(),
    };
    logging::init(cli.log_format.unwrap_or(settings.log_format));

    // tungstenite and reqwest share the ring provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(dispatch(cli.command, settings)) {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn dispatch(command: Command, settings: AppSettings) -> Result<(), String> {
    match command {
        Command::Live { analysis } => run_live(&settings, analysis.as_deref()).await,
        Command::Analyze { resume, out } => run_analyze(&settings, &resume, out).await,
        Command::Jobs {
            query,
            location,
            location_type,
            employment_type,
        } => {
            let filters = JobFilters {
                location_type,
                employment_type,
            };
            let jobs = coach_client(&settings)?
                .fetch_jobs(&query, &location, &filters)
                .await
                .map_err(|e| e.to_string())?;
            print_json(&jobs)
        }
        Command::Insight { analysis, job } => {
            let analysis: ResumeAnalysis = read_json(&analysis).await?;
            let job: Job = read_json(&job).await?;
            let insight = coach_client(&settings)?
                .application_insights(&analysis, &job)
                .await
                .map_err(|e| e.to_string())?;
            print_json(&insight)
        }
        Command::Company { name } => {
            let summary = coach_client(&settings)?
                .company_location(&name)
                .await
                .map_err(|e| e.to_string())?;
            println!("{}", summary.trim());
            Ok(())
        }
        Command::Chat { analysis } => run_chat(&settings, analysis.as_deref()).await,
        Command::Key { action } => run_key(action),
    }
}

fn require_api_key() -> Result<String, String> {
    api_key::get_api_key().ok_or_else(|| {
        "No Gemini API key configured. Set GEMINI_API_KEY or run `kazilens key set <key>`"
            .to_string()
    })
}

fn coach_client(settings: &AppSettings) -> Result<GeminiClient, String> {
    let client = GeminiClient::new(require_api_key()?).map_err(|e| e.to_string())?;
    Ok(client
        .with_models(settings.coach_models())
        .with_retry(settings.retry_policy())
        .with_thinking_budget(settings.thinking_budget))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
    serde_json::from_str(&contents).map_err(|e| format!("Invalid JSON in {:?}: {}", path, e))
}

async fn read_analysis(path: Option<&Path>) -> Result<Option<ResumeAnalysis>, String> {
    match path {
        Some(path) => read_json(path).await.map(Some),
        None => Ok(None),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

async fn run_analyze(
    settings: &AppSettings,
    resume: &Path,
    out: Option<PathBuf>,
) -> Result<(), String> {
    let text = tokio::fs::read_to_string(resume)
        .await
        .map_err(|e| format!("Failed to read {:?}: {}", resume, e))?;
    let analysis = coach_client(settings)?
        .analyze_resume(&text)
        .await
        .map_err(|e| e.to_string())?;

    match out {
        Some(path) => {
            let json = serde_json::to_string_pretty(&analysis).map_err(|e| e.to_string())?;
            tokio::fs::write(&path, json)
                .await
                .map_err(|e| format!("Failed to write {:?}: {}", path, e))?;
            println!("Analysis saved to {}", path.display());
            Ok(())
        }
        None => print_json(&analysis),
    }
}

async fn run_live(settings: &AppSettings, analysis: Option<&Path>) -> Result<(), String> {
    let context = SessionContext::new(read_analysis(analysis).await?);
    let transport = GeminiLiveTransport::new(require_api_key()?);
    let session = VoiceSession::new(
        Arc::new(CpalAudioProvider::new()),
        Arc::new(transport),
        settings.live_config(),
    );

    let mut lines = session.subscribe_transcript();
    let mut status = session.subscribe_status();
    let role = context.target_role().to_string();

    session.start(context).await.map_err(|e| e.to_string())?;
    println!("Interview for {} started. Speak when ready, Ctrl-C to finish.", role);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                log::info!("Interrupt received, ending interview");
                break;
            }
            line = lines.recv() => match line {
                Ok(line) => println!("{}", line),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Transcript display skipped {} lines", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                if matches!(current, SessionStatus::Idle | SessionStatus::Closed) {
                    println!("The interviewer ended the session.");
                    break;
                }
            }
        }
    }

    session.stop().await;

    for error in session.errors() {
        eprintln!("[{}] {}: {}", error.timestamp, error.error_type, error.message);
    }
    println!("Session stats:");
    print_json(&session.stats())
}

async fn run_chat(settings: &AppSettings, analysis: Option<&Path>) -> Result<(), String> {
    let analysis = read_analysis(analysis).await?;
    let mut chat = CoachChat::new(coach_client(settings)?, analysis.as_ref());
    println!("{}", greeting(analysis.as_ref()));

    let mut input = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = input
        .next_line()
        .await
        .map_err(|e| format!("Failed to read input: {}", e))?
    {
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        println!("\n{}\n", chat_reply_text(chat.send(message).await));
    }
    Ok(())
}

/// Text shown for one chat turn; failures are logged and replaced by the
/// generic coach error
fn chat_reply_text(result: Result<String, CoachError>) -> String {
    match result {
        Ok(reply) => reply.trim().to_string(),
        Err(e) => {
            log::warn!("Chat: {}", e);
            COACH_ERROR_MESSAGE.to_string()
        }
    }
}

fn run_key(action: KeyAction) -> Result<(), String> {
    match action {
        KeyAction::Set { key } => {
            api_key::set_api_key(Some(&key))?;
            println!("API key stored ({})", api_key::mask_key(key.trim()));
        }
        KeyAction::Clear => {
            api_key::set_api_key(None)?;
            println!("API key removed from the system keyring");
        }
        KeyAction::Status => match api_key::resolve_api_key() {
            Some((key, source)) => {
                println!("API key {} from {}", api_key::mask_key(&key), source)
            }
            None => println!("No API key configured"),
        },
    }
    Ok(())
}
