use crate::page::{self, IndexEntry};
use crate::req::{Method, Request, RequestUrl};
use crate::resp::{Response, Status, HTML_CONTENT_TYPE};
use crate::router::{Handler, Sink};
use async_trait::async_trait;
use futures::future::try_join_all;
use percent_encoding::percent_decode_str;
use std::{
    io,
    path::{Component, Path, PathBuf},
};
use tokio::{
    fs,
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{error, info};

const MEDIA_EXTENSIONS: &[&str] = &[
    "swf", "avi", "flv", "mpg", "mp4", "rm", "mov", "wav", "asf", "3gp", "mkv", "rmvb",
];

/// Serves files and directory indexes below `root`.
#[derive(Debug, Clone)]
pub struct StaticHandler {
    root: PathBuf,
    video_page: String,
    chunk_size: usize,
}

/// Filesystem location derived from a request pathname.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ResolvedPath {
    /// Decoded, rooted path shown in pages and logs, e.g. `/sub/a.txt`.
    pub display: String,
    pub fs: PathBuf,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Classification {
    Forbidden,
    Missing,
    Directory,
    RegularFile { len: u64 },
}

impl StaticHandler {
    pub fn new(root: impl Into<PathBuf>, video_page: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            root: root.into(),
            video_page: video_page.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn resolve(&self, pathname: &str) -> ResolvedPath {
        let decoded = percent_decode_str(pathname).decode_utf8_lossy();
        let joined = format!("./{}", decoded).replacen("//", "/", 1);
        // Escapes that survived the first pass (e.g. from `%25xx`) are decoded too.
        let joined = percent_decode_str(&joined).decode_utf8_lossy();

        let display = joined.strip_prefix('.').unwrap_or(&*joined).to_string();
        let fs = self.root.join(display.trim_start_matches('/'));
        ResolvedPath { display, fs }
    }

    pub async fn classify(&self, path: &ResolvedPath) -> Classification {
        let last = path.display.rsplit('/').next().unwrap_or_default();
        if last.starts_with('.') || escapes_root(&path.display) {
            return Classification::Forbidden;
        }

        match fs::metadata(&path.fs).await {
            Err(_) => Classification::Missing,
            Ok(md) if md.is_dir() => Classification::Directory,
            Ok(md) => Classification::RegularFile { len: md.len() },
        }
    }

    async fn send_forbidden(&self, req: &Request, path: &str, stream: &mut Sink) -> io::Result<()> {
        info!("403 Forbidden: {}", path);
        Response::from_html(Status::Forbidden, page::forbidden(path))
            .write(stream, is_head(req))
            .await
    }

    async fn send_missing(&self, req: &Request, path: &str, stream: &mut Sink) -> io::Result<()> {
        info!("404 Not Found: {}", path);
        Response::from_html(Status::NotFound, page::not_found(path))
            .write(stream, is_head(req))
            .await
    }

    async fn send_redirect(&self, req: &Request, location: &str, stream: &mut Sink) -> io::Result<()> {
        info!("301 Moved Permanently: {}", location);
        Response::from_html(Status::MovedPermanently, page::moved_permanently(location))
            .with_header("Location", location)
            .write(stream, is_head(req))
            .await
    }

    async fn send_error(&self, req: &Request, err: &io::Error, stream: &mut Sink) -> io::Result<()> {
        let detail = format!("{:?}", err);
        error!("500 Internal Server Error");
        error!("{}", detail);
        Response::from_html(Status::InternalServerError, page::internal_error(&detail))
            .write(stream, is_head(req))
            .await
    }

    async fn send_file(
        &self,
        req: &Request,
        path: &ResolvedPath,
        len: u64,
        stream: &mut Sink,
    ) -> io::Result<()> {
        let head = Response {
            status: Status::Ok,
            headers: Vec::new(),
            data: tokio::io::empty(),
        }
        .with_header("Content-Type", mime_type(&path.display))
        .with_header("Content-Length", len);

        if is_head(req) {
            return head.write(stream, true).await;
        }

        // Open and read ahead before committing to a 200.
        let mut buf = vec![0u8; self.chunk_size];
        let mut file = match fs::File::open(&path.fs).await {
            Ok(f) => f,
            Err(e) => return self.send_error(req, &e, stream).await,
        };
        let mut n = match file.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => return self.send_error(req, &e, stream).await,
        };

        head.write(&mut *stream, true).await?;
        while n > 0 {
            stream.write_all(&buf[..n]).await?;
            n = match file.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    error!(path = %path.display, ?e, "read failed after headers were sent");
                    return Err(e);
                }
            };
        }
        stream.flush().await
    }

    async fn send_directory(
        &self,
        req: &Request,
        url: &RequestUrl,
        path: &ResolvedPath,
        stream: &mut Sink,
    ) -> io::Result<()> {
        if !path.display.ends_with('/') {
            let canonical = RequestUrl {
                pathname: format!("{}/", url.pathname),
                ..url.clone()
            };
            return self
                .send_redirect(req, &canonical.to_relative_string(), stream)
                .await;
        }

        let names = match list_directory(&path.fs).await {
            Ok(names) => names,
            Err(e) => return self.send_error(req, &e, stream).await,
        };
        self.write_directory_index(req, &path.display, names, stream)
            .await
    }

    async fn write_directory_index(
        &self,
        req: &Request,
        path: &str,
        names: Vec<String>,
        stream: &mut Sink,
    ) -> io::Result<()> {
        let entries: Vec<IndexEntry> = names
            .into_iter()
            .map(|name| IndexEntry {
                is_media: is_media(&name),
                name,
            })
            .collect();

        let html = page::directory_index(path, &entries, &self.video_page);
        Response::from_bytes(Status::Ok, HTML_CONTENT_TYPE, html.into_bytes())
            .write(stream, is_head(req))
            .await
    }
}

#[async_trait]
impl Handler for StaticHandler {
    async fn handle(&self, req: &Request, url: &RequestUrl, stream: &mut Sink) -> io::Result<()> {
        let path = self.resolve(&url.pathname);

        match self.classify(&path).await {
            Classification::Forbidden => self.send_forbidden(req, &path.display, stream).await,
            Classification::Missing => self.send_missing(req, &path.display, stream).await,
            Classification::Directory => self.send_directory(req, url, &path, stream).await,
            Classification::RegularFile { len } => self.send_file(req, &path, len, stream).await,
        }
    }
}

/// Sorted entry names, directories suffixed with `/`. Names are for display
/// only; each entry is stat'ed through its own path.
async fn list_directory(dir: &Path) -> io::Result<Vec<String>> {
    let mut read_dir = fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        entries.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    try_join_all(entries.into_iter().map(|(name, path)| async move {
        let md = fs::metadata(&path).await?;
        Ok::<_, io::Error>(if md.is_dir() { format!("{}/", name) } else { name })
    }))
    .await
}

fn is_head(req: &Request) -> bool {
    req.method == Method::Head
}

fn escapes_root(display: &str) -> bool {
    Path::new(display)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}

pub fn mime_type(path: &str) -> &'static str {
    let name = path.rsplit('/').next().unwrap_or_default();
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" => "text/plain",
        "html" => "text/html;charset=utf-8",
        "css" => "text/css",
        "xml" => "application/xml",
        "json" => "application/json",
        "js" => "application/javascript",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        _ => "text/plain",
    }
}

pub fn is_media(name: &str) -> bool {
    name.rsplit_once('.').is_some_and(|(_, ext)| {
        MEDIA_EXTENSIONS
            .iter()
            .any(|m| m.eq_ignore_ascii_case(ext))
    })
}
