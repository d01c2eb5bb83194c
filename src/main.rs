use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use page_translator::progress::ChannelProgress;
use page_translator::providers::{Backend, ChatClient, GoogleTranslate};
use page_translator::session::{
    BatchDispatch, LocalDispatcher, RemoteDispatcher, TranslationSession,
};
use page_translator::settings::{self, Settings};
use page_translator::tracker::Page;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "page-translator",
    version,
    about = "Batch text translation and an OpenAI-compatible streaming bridge"
)]
struct Cli {
    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings", global = true)]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Listen port (overrides settings and PORT)
        #[arg(short = 'p', long = "port")]
        port: Option<u16>,

        /// Bind address
        #[arg(long = "bind", default_value = "0.0.0.0")]
        bind: String,
    },
    /// Translate a text document line by line
    Translate {
        /// File to translate (reads stdin when omitted)
        #[arg(short = 'f', long = "file")]
        file: Option<String>,

        /// Target language (default: en)
        #[arg(short = 'l', long = "lang", default_value = "en")]
        lang: String,

        /// Source language. Use "auto" to detect.
        #[arg(short = 'L', long = "source-lang", default_value = "auto")]
        source_lang: String,

        /// Requests per wave (clamped to [batch].max_concurrency)
        #[arg(short = 'c', long = "concurrency")]
        concurrency: Option<usize>,

        /// Base URL of a running page-translator server
        #[arg(long = "api-url")]
        api_url: Option<String>,

        /// Bearer key for --api-url
        #[arg(short = 'k', long = "api-key")]
        api_key: Option<String>,

        /// Send the whole document to the server's batch endpoint
        #[arg(long = "remote-batch")]
        remote_batch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    page_translator::logging::init(cli.verbose)?;
    let mut settings = settings::load_settings(cli.read_settings.as_deref().map(Path::new))?;

    match cli.command {
        Command::Serve { port, bind } => {
            if let Some(port) = port {
                settings.port = port;
            }
            page_translator::server::run_server(settings, &bind).await
        }
        Command::Translate {
            file,
            lang,
            source_lang,
            concurrency,
            api_url,
            api_key,
            remote_batch,
        } => {
            let input = read_input(file.as_deref())?;
            let dispatcher = build_dispatcher(&settings, api_url, api_key, remote_batch)?;
            let concurrency = settings.effective_concurrency(concurrency);
            let output = translate_document(
                dispatcher.as_ref(),
                &input,
                &source_lang,
                &lang,
                concurrency,
            )
            .await?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(output.as_bytes())?;
            if !output.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
            Ok(())
        }
    }
}

fn read_input(file: Option<&str>) -> Result<String> {
    let input = match file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read input file: {}", path))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .with_context(|| "stdin must be UTF-8 text")?;
            buffer
        }
    };
    if input.trim().is_empty() {
        bail!("input is empty");
    }
    Ok(input)
}

fn build_dispatcher(
    settings: &Settings,
    api_url: Option<String>,
    api_key: Option<String>,
    remote_batch: bool,
) -> Result<Box<dyn BatchDispatch>> {
    let api_key = api_key.or_else(|| settings.active_master_key().map(str::to_string));
    match api_url {
        Some(url) if remote_batch => {
            let remote = RemoteDispatcher::new(url, settings.request_timeout)?.with_key(api_key);
            Ok(Box::new(remote))
        }
        Some(url) => {
            let client = ChatClient::new(url, settings.request_timeout)?
                .with_model(settings.default_model.clone())
                .with_key(api_key);
            Ok(Box::new(LocalDispatcher::new(Backend::Chat(client))))
        }
        None if remote_batch => bail!("--remote-batch requires --api-url"),
        None => {
            let key = settings.upstream_key()?.to_string();
            let client = GoogleTranslate::new(key, settings.request_timeout)?
                .with_url(settings.translate_url.clone());
            Ok(Box::new(LocalDispatcher::new(Backend::Google(client))))
        }
    }
}

async fn translate_document(
    dispatcher: &dyn BatchDispatch,
    input: &str,
    source_lang: &str,
    target_lang: &str,
    concurrency: usize,
) -> Result<String> {
    let mut session = TranslationSession::new(Page::from_text(input));
    let (progress, mut events) = ChannelProgress::new();
    let printer = tokio::spawn(async move {
        let mut stderr = io::stderr();
        let mut drawn = false;
        while let Some(event) = events.recv().await {
            let _ = write!(
                stderr,
                "\r{}/{} ({}%)",
                event.completed,
                event.total,
                event.percent()
            );
            let _ = stderr.flush();
            drawn = true;
        }
        if drawn {
            let _ = writeln!(stderr);
        }
    });

    let report = session
        .translate(dispatcher, source_lang, target_lang, concurrency, &progress)
        .await;
    drop(progress);
    let _ = printer.await;
    let report = report?;
    info!(
        "translated {} of {} units ({} failed)",
        report.applied,
        report.total,
        report.failed()
    );
    Ok(session.into_host().render())
}
