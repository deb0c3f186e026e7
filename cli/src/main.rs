/*
    spotify-mcp-rs | Spotify playback, search and playlist tools for AI agents.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

mod callback;
mod logging;
mod server;

use std::io::{self, BufRead, Write};
use std::process;
use std::sync::Arc;
use std::thread;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use log::warn;
use spotify_mcp_core::{token_store, SpotifyClient, SpotifyConfig, ToolHandlers};
use tokio::sync::oneshot;

use crate::callback::RedirectListener;
use crate::logging::{init_logging, LogFormat};

#[derive(Parser)]
#[command(name = "spotify-mcp")]
#[command(about = "Spotify playback, search and playlist tools for AI agents over MCP", long_about = None)]
struct Cli {
    /// Log output format (logs always go to stderr)
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the MCP server on stdin/stdout.
    Serve,
    /// Authorizes this app against your Spotify account and caches the token.
    Auth {
        /// Authorization code (or the full redirect URL) if you already have one
        #[arg(long)]
        code: Option<String>,
    },
    /// Shows whether a token is cached and when it expires.
    Status,
}

#[tokio::main]
async fn main() {
    if dotenv().is_err() {
        // No .env file; rely on the environment
    }

    let cli = Cli::parse();
    init_logging(cli.log_format);

    let config = load_config();

    match &cli.command {
        Commands::Serve => {
            handle_serve(&config).await;
        }
        Commands::Auth { code } => {
            handle_auth(&config, code.as_deref()).await;
        }
        Commands::Status => {
            handle_status(&config).await;
        }
    }
}

fn load_config() -> SpotifyConfig {
    match SpotifyConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Set SPOTIFY_CLIENT_ID, SPOTIFY_CLIENT_SECRET and SPOTIFY_REDIRECT_URI (a .env file works too).");
            process::exit(1);
        }
    }
}

async fn handle_serve(config: &SpotifyConfig) {
    let client = match SpotifyClient::connect(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error initializing Spotify client: {}", e);
            process::exit(1);
        }
    };

    let status = client.tokens().status().await;
    if !status.cached {
        warn!("No cached token; tool calls will fail until `spotify-mcp auth` is run");
    }

    let handlers = Arc::new(ToolHandlers::new(Arc::new(client)));
    if let Err(e) = server::run_stdio(handlers).await {
        eprintln!("[ERROR] Server stopped: {}", e);
        process::exit(1);
    }
}

/// Reads one line from stdin on a plain thread, so an unanswered prompt never
/// holds up shutdown.
fn spawn_paste_reader() -> oneshot::Receiver<io::Result<String>> {
    let (tx, rx) = oneshot::channel();
    thread::spawn(move || {
        let mut line = String::new();
        let result = io::stdin().lock().read_line(&mut line).map(|_| line);
        let _ = tx.send(result);
    });
    rx
}

fn prompt_paste() -> io::Result<()> {
    print!("Paste the URL you were redirected to: ");
    io::stdout().flush()
}

/// Catches the browser redirect on the redirect URI's address, or takes a
/// pasted URL when the address cannot be bound or the user pastes first.
async fn obtain_redirect(config: &SpotifyConfig) -> io::Result<String> {
    let listener = match config.redirect_address() {
        Ok(address) => match RedirectListener::bind(&address).await {
            Ok(listener) => Some(listener),
            Err(e) => {
                warn!("Cannot listen on {} ({}), falling back to pasting", address, e);
                None
            }
        },
        Err(e) => {
            warn!("{}, falling back to pasting", e);
            None
        }
    };

    let pasted = spawn_paste_reader();
    let stdin_gone = || io::Error::new(io::ErrorKind::UnexpectedEof, "stdin reader stopped");

    let Some(listener) = listener else {
        prompt_paste()?;
        return pasted.await.unwrap_or_else(|_| Err(stdin_gone()));
    };

    println!("Waiting for the browser on http://{} ...", listener.address());
    prompt_paste()?;

    let captured = listener.capture();
    tokio::pin!(captured);
    tokio::select! {
        url = &mut captured => {
            println!();
            url
        }
        line = pasted => match line {
            Ok(Ok(line)) if !line.trim().is_empty() => Ok(line),
            // Nothing pasted (or stdin closed); keep waiting for the browser.
            _ => captured.await,
        },
    }
}

async fn handle_auth(config: &SpotifyConfig, code: Option<&str>) {
    let store = token_store(config);

    let input = match code {
        Some(code) => code.to_string(),
        None => {
            let url = match store.authorize_url() {
                Ok(url) => url,
                Err(e) => {
                    eprintln!("[ERROR] Could not build the authorization URL: {}", e);
                    process::exit(1);
                }
            };

            println!("Spotify Setup");
            println!("---------------------------------------------------");
            println!("1. Open this URL in your browser and approve access:");
            println!("   {}", url);
            println!("2. You will be redirected to {}", config.redirect_uri);
            println!("   and this command picks the code up from there.");
            println!();

            match obtain_redirect(config).await {
                Ok(line) => line,
                Err(e) => {
                    eprintln!("[ERROR] Failed to read input: {}", e);
                    process::exit(1);
                }
            }
        }
    };

    let result = match store.code_from_redirect(&input) {
        Ok(code) => store.complete_authorization(&code).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            println!();
            println!("[OK] Authorized. Token saved to {}", config.token_cache_path.display());
        }
        Err(e) => {
            eprintln!();
            eprintln!("[ERROR] Authorization failed: {}", e);
            process::exit(1);
        }
    }
}

async fn handle_status(config: &SpotifyConfig) {
    let status = token_store(config).status().await;

    println!("---------------------------------------------------");
    println!("TOKEN STATUS");
    println!("---------------------------------------------------");
    println!("Cache File:     {}", status.cache_path.display());
    println!("Cached:         {}", if status.cached { "Yes" } else { "No" });

    if status.cached {
        println!(
            "Refresh Token:  {}",
            if status.has_refresh_token { "Yes" } else { "No" }
        );
        if let Some(expires_at) = status.expires_at {
            println!(
                "Expires At:     {}{}",
                expires_at.to_rfc3339(),
                if status.expired { " (expired)" } else { "" }
            );
        }
    }
    println!("---------------------------------------------------");

    if !status.cached {
        println!("Tip: run 'spotify-mcp auth' to authorize");
    } else if status.expired && !status.has_refresh_token {
        println!("Tip: the token cannot be refreshed, run 'spotify-mcp auth' again");
    }
}
