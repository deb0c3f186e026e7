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

//! One-shot listener that catches the browser coming back from the
//! Spotify consent page.

use std::io;

use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const RECEIVED_PAGE: &str = concat!(
    "HTTP/1.1 200 OK\r\n",
    "Content-Type: text/html; charset=utf-8\r\n",
    "Connection: close\r\n",
    "\r\n",
    "<!DOCTYPE html><html><head><title>spotify-mcp</title></head>",
    "<body style=\"font-family: sans-serif; text-align: center; padding-top: 50px;\">",
    "<h1>Spotify authorization received</h1>",
    "<p>You can close this window and return to the terminal.</p>",
    "</body></html>"
);

const NOT_FOUND: &str = "HTTP/1.1 404 Not Found\r\nConnection: close\r\n\r\n";

pub struct RedirectListener {
    listener: TcpListener,
    address: String,
}

impl RedirectListener {
    pub async fn bind(address: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        let address = listener.local_addr()?.to_string();
        Ok(Self { listener, address })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Waits for a request carrying `code` or `error` and returns it as a
    /// full redirect URL. Anything else gets a 404.
    pub async fn capture(&self) -> io::Result<String> {
        loop {
            let (mut socket, peer) = self.listener.accept().await?;

            let request_line = match read_request_head(&mut socket).await {
                Ok(line) => line,
                Err(e) => {
                    debug!("Dropping connection from {}: {}", peer, e);
                    continue;
                }
            };

            match redirect_target(&request_line) {
                Some(target) => {
                    let _ = socket.write_all(RECEIVED_PAGE.as_bytes()).await;
                    let _ = socket.shutdown().await;
                    return Ok(format!("http://{}{}", self.address, target));
                }
                None => {
                    debug!("Ignoring request from {}: {}", peer, request_line.trim());
                    let _ = socket.write_all(NOT_FOUND.as_bytes()).await;
                }
            }
        }
    }
}

/// Returns the request line, consuming the headers after it.
async fn read_request_head(socket: &mut TcpStream) -> io::Result<String> {
    let mut reader = BufReader::new(socket);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let mut header = String::new();
    loop {
        header.clear();
        if reader.read_line(&mut header).await? == 0 || header.trim().is_empty() {
            break;
        }
    }
    Ok(request_line)
}

/// Request target of a `GET` whose query carries the authorization outcome.
fn redirect_target(request_line: &str) -> Option<&str> {
    let mut parts = request_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }

    let target = parts.next()?;
    let (_, query) = target.split_once('?')?;
    query
        .split('&')
        .any(|pair| pair.starts_with("code=") || pair.starts_with("error="))
        .then_some(target)
}
