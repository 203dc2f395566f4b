use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use reqwest::Method;
use serde::Serialize;
use thiserror::Error;

use rt3_client::api::error::ApiError;
use rt3_client::api::request::{MultipartForm, RequestOptions};
use rt3_client::api::uploads::{self, ImageFile, ImageKind};
use rt3_client::api::session;
use rt3_client::config::{ClientConfig, ConfigError, TokenBackend};
use rt3_client::hooks::{api_data_hook, HookState, Navigator};
use rt3_client::realtime::{ChannelSnapshot, WebSocketConnector};
use rt3_client::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "rt3", about = "Command-line client for the RT3 team service")]
struct Cli {
    /// Server origin (overrides RT3_API_URL / API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Token storage: file, keychain or memory (overrides RT3_TOKEN_BACKEND)
    #[arg(long, global = true)]
    token_backend: Option<TokenBackend>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session token
    Login {
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session token
    Logout,
    /// Show the logged-in operator
    Whoami,
    /// List the team roster
    Roster,
    /// List tracker items
    Items,
    /// Upload a tracker file
    Upload {
        file: PathBuf,
        /// Extra form fields as name=value
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Upload a dashboard image or avatar
    ImageUpload { kind: ImageKind, file: PathBuf },
    /// Delete a dashboard image or the avatar
    ImageDelete {
        kind: ImageKind,
        /// URL of the dashboard image to delete
        #[arg(long)]
        url: Option<String>,
    },
    /// Send an arbitrary request through the authenticated pipeline
    Request {
        #[arg(value_parser = parse_method)]
        method: Method,
        endpoint: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },
    /// Follow realtime image uploads until Ctrl-C
    Watch,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON body: {0}")]
    Body(#[from] serde_json::Error),
}

/// Hooks redirect to the login route; in a terminal that means asking the
/// user to log in again.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, route: &str) {
        log::debug!("Redirect to {}", route);
        eprintln!("Session missing or expired. Run `rt3 login <username>` first.");
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    if let Some(backend) = cli.token_backend {
        config.token_backend = backend;
    }
    log::info!("Using RT3 server at {}", config.api_url);

    let state = AppState::new(config, Arc::new(TerminalNavigator))?;
    let api = state.api.as_ref();

    match cli.command {
        Command::Login { username, password } => {
            let user = session::login(api, &username, &password).await?;
            println!("Logged in as {}", user.handle().unwrap_or(&username));
        }
        Command::Logout => {
            session::logout(api);
            println!("Logged out");
        }
        Command::Whoami => {
            let hook = state.user_hook();
            hook.mount().await;
            let admin = hook.is_admin().await;
            let user = finish(hook.state().await)?;
            print_json(&user)?;
            if admin {
                println!("(admin)");
            }
        }
        Command::Roster => {
            let hook = state.operators_hook();
            hook.mount().await;
            print_json(&finish(hook.state().await)?)?;
        }
        Command::Items => {
            print_json(&api.fetch_tracker_items().await?)?;
        }
        Command::Upload { file, fields } => {
            let (file_name, data) = read_file(&file).await?;
            let mut form = MultipartForm::new();
            for (name, value) in &fields {
                form = form.text(name, value);
            }
            form = form.file("file", &file_name, guess_mime(&file), data);
            print_json(&uploads::upload_tracker_item(api, &form).await?)?;
        }
        Command::ImageUpload { kind, file } => {
            let (file_name, data) = read_file(&file).await?;
            let image = ImageFile {
                file_name,
                mime: guess_mime(&file).to_string(),
                data,
            };
            let uploaded = uploads::upload_image(api, kind, &image).await?;
            print_json(&uploaded)?;
        }
        Command::ImageDelete { kind, url } => {
            uploads::delete_image(api, kind, url.as_deref()).await?;
            println!("Deleted");
        }
        Command::Request {
            method,
            endpoint,
            body,
        } => {
            let mut options = RequestOptions::new(method);
            if let Some(body) = body {
                options = options.json_value(serde_json::from_str(&body)?);
            }
            let hook = api_data_hook(
                state.api.clone(),
                state.navigator.clone(),
                &endpoint,
                options,
                true,
            );
            hook.mount().await;
            print_json(&finish(hook.state().await)?)?;
        }
        Command::Watch => watch(&state).await,
    }

    Ok(())
}

/// Terminal lines for a channel snapshot.
#[derive(Debug, Default, PartialEq)]
struct WatchLines {
    out: Vec<String>,
    err: Vec<String>,
}

/// Turns successive snapshots into output, printing each change once.
#[derive(Default)]
struct WatchRenderer {
    last_label: &'static str,
    last_error: Option<String>,
    seen: usize,
}

impl WatchRenderer {
    fn render(&mut self, snapshot: &ChannelSnapshot) -> WatchLines {
        let mut lines = WatchLines::default();

        let label = snapshot.state.label();
        if label != self.last_label {
            lines.out.push(format!("[{}]", label));
            self.last_label = label;
        }
        if snapshot.error != self.last_error {
            if let Some(ref error) = snapshot.error {
                lines.err.push(error.clone());
            }
            self.last_error = snapshot.error.clone();
        }
        // Newest first: anything beyond what we've printed sits at the front.
        let fresh = snapshot.images.len().saturating_sub(self.seen);
        for image in snapshot.images[..fresh].iter().rev() {
            lines.out.push(format!("New image: {}", image));
        }
        self.seen = snapshot.images.len();
        if snapshot.rejected {
            lines
                .err
                .push("Server rejected the session. Run `rt3 login <username>` first.".to_string());
        }
        lines
    }
}

/// Follow the realtime channel until Ctrl-C or until the server rejects us.
async fn watch(state: &AppState) {
    let handle = state.mount_channel(Arc::new(WebSocketConnector));
    let mut updates = handle.subscribe();
    let mut renderer = WatchRenderer::default();

    loop {
        {
            let snapshot = updates.borrow_and_update();
            let lines = renderer.render(&snapshot);
            for line in &lines.out {
                println!("{}", line);
            }
            for line in &lines.err {
                eprintln!("{}", line);
            }
            if snapshot.rejected {
                break;
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    handle.closed().await;
}

/// Turn a settled hook state into its payload or its error.
fn finish<T>(state: HookState<T>) -> Result<T, CliError> {
    match (state.data, state.error) {
        (_, Some(error)) => Err(ApiError::RequestFailed(error).into()),
        (Some(data), None) => Ok(data),
        (None, None) => Err(ApiError::Decode("empty response".to_string()).into()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn read_file(path: &Path) -> Result<(String, Vec<u8>), CliError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|source| CliError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok((file_name, data))
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method: {}", raw))
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got {:?}", raw))
}
