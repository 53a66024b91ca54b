//! Static file serving.
//!
//! # Responsibilities
//! - Map request paths onto files under a root directory
//! - Serve them with a content type picked from the extension
//! - Serve the index file for `/`
//!
//! # Design Decisions
//! - Only plain path segments resolve; `..`, roots and prefixes never do
//! - Files are read whole; this is for small assets, not media

use std::fs;
use std::path::{Component, Path, PathBuf};

use axum::http::{header, StatusCode};
use thiserror::Error;

use crate::http::context::Context;

#[derive(Debug, Error)]
pub enum StaticFilesError {
    #[error("static root {0:?} is not a directory")]
    NotADirectory(PathBuf),
}

#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    index_file: String,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StaticFilesError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StaticFilesError::NotADirectory(root));
        }
        Ok(Self {
            root,
            index_file: "index.html".to_string(),
        })
    }

    pub fn with_index_file(mut self, index_file: impl Into<String>) -> Self {
        self.index_file = index_file.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The file a request path refers to, if it exists under the root.
    pub fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let relative = Path::new(request_path.trim_start_matches('/'));
        if relative.as_os_str().is_empty() {
            return None;
        }
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        let path = self.root.join(relative);
        path.is_file().then_some(path)
    }

    /// Serve the file for the request path. Returns false if there is none.
    pub fn serve(&self, ctx: &mut Context) -> bool {
        match self.resolve(ctx.path()) {
            Some(path) => send_file(ctx, &path),
            None => false,
        }
    }

    /// Serve the index file. Returns false if it is missing.
    pub fn index(&self, ctx: &mut Context) -> bool {
        let path = self.root.join(&self.index_file);
        path.is_file() && send_file(ctx, &path)
    }
}

fn send_file(ctx: &mut Context, path: &Path) -> bool {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Static file unreadable");
            return false;
        }
    };
    ctx.set_header(header::CONTENT_TYPE.as_str(), content_type(path), true);
    ctx.set_header(header::CONTENT_LENGTH.as_str(), &content.len().to_string(), true);
    ctx.start_response(StatusCode::OK);
    if let Err(e) = ctx.write(&content) {
        tracing::warn!(path = %path.display(), error = %e, "Static file write failed");
    }
    true
}

/// Content type for a file, by extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}
