use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sgpt_cli::client::{AsyncRequestClient, RequestEvent};
use sgpt_cli::config::Config;
use sgpt_cli::core::traits::NullScene;
use sgpt_cli::core::types::{AddKeyRequest, SetThinkRequest};
use sgpt_cli::core::ConversationController;
use sgpt_cli::server::http::run_inference_server;
use sgpt_cli::supervisor::InferenceServerProcess;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sgpt")]
#[command(author, version, about = "Embedded RAG chatbot assistant with local inference server orchestration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the inference HTTP endpoint (retrieval + generation)
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Completion backend (local, or sim for the simulation backend)
        #[arg(short, long)]
        backend: Option<String>,

        /// Directory of context documents loaded into the index
        #[arg(long)]
        docs: Option<PathBuf>,
    },

    /// Chat with the assistant, supervising a local inference server
    Chat {
        /// Initial message to send; omits the interactive loop
        message: Option<String>,

        /// Port of the inference server
        #[arg(short, long)]
        port: Option<u16>,

        /// Route requests to the remote API backend
        #[arg(long)]
        remote: bool,

        /// Enable thinking mode
        #[arg(long)]
        think: bool,

        /// Stream responses chunk by chunk
        #[arg(long)]
        stream: bool,

        /// Remote API key, installed via /addKey (or SGPT_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Backend for the spawned server (local, sim)
        #[arg(short, long)]
        backend: Option<String>,

        /// Attach to an already-running server instead of spawning one
        #[arg(long)]
        no_spawn: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "sgpt_cli=debug,inference_server=debug"
    } else {
        "sgpt_cli=info,inference_server=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Serve {
            port,
            host,
            backend,
            docs,
        } => {
            let config = Config::load().unwrap_or_default();
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            run_inference_server(&host, port, backend.as_deref(), docs.as_deref(), config)
                .await?;
        }
        Commands::Chat {
            message,
            port,
            remote,
            think,
            stream,
            api_key,
            backend,
            no_spawn,
        } => {
            run_chat(ChatOptions {
                message,
                port,
                remote,
                think,
                stream,
                api_key,
                backend,
                no_spawn,
            })
            .await?;
        }
    }

    Ok(())
}

struct ChatOptions {
    message: Option<String>,
    port: Option<u16>,
    remote: bool,
    think: bool,
    stream: bool,
    api_key: Option<String>,
    backend: Option<String>,
    no_spawn: bool,
}

async fn run_chat(opts: ChatOptions) -> Result<()> {
    let config = Config::load().unwrap_or_default();
    let port = opts.port.unwrap_or(config.server.port);
    let base_url = format!("http://{}:{}", config.server.host, port);
    url::Url::parse(&base_url).context("Invalid inference endpoint URL")?;

    let mut supervisor = InferenceServerProcess::new(base_url.clone(), config.supervisor.clone());
    if !opts.no_spawn {
        let exe = std::env::current_exe().context("Failed to locate own executable")?;
        let mut args = vec![
            "serve".to_string(),
            "--port".to_string(),
            port.to_string(),
        ];
        if let Some(backend) = &opts.backend {
            args.push("--backend".to_string());
            args.push(backend.clone());
        }

        println!("Launching local AI server... Please wait.");
        supervisor.start(&exe.to_string_lossy(), &args)?;
    }
    supervisor.wait_ready().await?;
    println!("Server ready.");

    let control = reqwest::Client::new();
    let api_key = opts
        .api_key
        .or_else(|| std::env::var("SGPT_API_KEY").ok());
    if let Some(key) = api_key {
        control
            .post(format!("{}/addKey", base_url))
            .json(&AddKeyRequest { key })
            .send()
            .await
            .context("Failed to install remote API key")?
            .error_for_status()
            .context("Server rejected the remote API key")?;
    }

    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let client = AsyncRequestClient::new(events_tx, &config.client);
    let mut controller =
        ConversationController::new(Box::new(client), base_url.clone(), Arc::new(NullScene));
    controller.set_thinking(opts.think);
    controller.set_remote_model(opts.remote);
    controller.set_streaming(opts.stream);

    // One-shot mode: send the message, wait for the terminal event, exit
    if let Some(message) = opts.message {
        if controller.submit(&message).is_none() {
            anyhow::bail!("Nothing to send");
        }
        while let Some(event) = events_rx.recv().await {
            if apply_event(&mut controller, event)? {
                break;
            }
        }
        if !opts.no_spawn {
            supervisor.shutdown().await?;
        }
        return Ok(());
    }

    // Interactive loop: stdin lines are submitted through the controller,
    // results drain from the event channel on this task's turn.
    println!("Type a question, /think on|off, /remote on|off, /stream on|off, or /quit.");
    prompt_marker();

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            maybe_line = lines.next_line() => {
                let Some(line) = maybe_line? else { break };
                let line = line.trim().to_string();
                if line == "/quit" {
                    break;
                }
                if handle_meta_command(&line, &mut controller, &control, &base_url).await? {
                    prompt_marker();
                    continue;
                }
                if line.is_empty() {
                    prompt_marker();
                    continue;
                }
                if controller.submit(&line).is_none() {
                    println!("(still generating, please wait)");
                }
            }
            Some(event) = events_rx.recv() => {
                if apply_event(&mut controller, event)? {
                    prompt_marker();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    if !opts.no_spawn {
        supervisor.shutdown().await?;
    }
    Ok(())
}

fn prompt_marker() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Apply one event to the controller; returns true on a terminal event
fn apply_event(controller: &mut ConversationController, event: RequestEvent) -> Result<bool> {
    let streamed = matches!(event, RequestEvent::Chunk(_) | RequestEvent::StreamDone);
    let terminal = !matches!(event, RequestEvent::Chunk(_));

    if let RequestEvent::Chunk(chunk) = &event {
        print!("{}", chunk);
        let _ = std::io::stdout().flush();
    }

    if let Err(e) = controller.on_event(event) {
        tracing::error!("Dialogue state error: {}", e);
        return Ok(terminal);
    }

    if terminal {
        if streamed {
            println!();
        } else if let Some(last) = controller.dialogue().last() {
            println!("{}", last.content);
        }
    }
    Ok(terminal)
}

/// Handle /think, /remote and /stream toggles; returns true when consumed
async fn handle_meta_command(
    line: &str,
    controller: &mut ConversationController,
    control: &reqwest::Client,
    base_url: &str,
) -> Result<bool> {
    if let Some(rest) = line.strip_prefix("/think ") {
        let think = rest == "on";
        controller.set_thinking(think);
        // Mirror the toggle into the server-side default
        let result = control
            .post(format!("{}/setThink", base_url))
            .json(&SetThinkRequest { think })
            .send()
            .await;
        if let Err(e) = result {
            tracing::warn!("Failed to update server think state: {}", e);
        }
        println!("Thinking {}", if think { "enabled" } else { "disabled" });
        return Ok(true);
    }
    if let Some(rest) = line.strip_prefix("/remote ") {
        let remote = rest == "on";
        controller.set_remote_model(remote);
        println!("Remote model {}", if remote { "enabled" } else { "disabled" });
        return Ok(true);
    }
    if let Some(rest) = line.strip_prefix("/stream ") {
        let stream = rest == "on";
        controller.set_streaming(stream);
        println!("Streaming {}", if stream { "enabled" } else { "disabled" });
        return Ok(true);
    }
    Ok(false)
}
