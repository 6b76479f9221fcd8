use std::{
    fmt::{Display, Formatter},
    io::{Cursor, Result},
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

pub const HTML_CONTENT_TYPE: &str = "text/html;charset=utf-8";

#[derive(Debug, Clone)]
pub struct Response<S: AsyncRead + Unpin> {
    pub status: Status,
    pub headers: Vec<(String, String)>,
    pub data: S,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Status {
    Ok,
    MovedPermanently,
    BadRequest,
    Forbidden,
    NotFound,
    InternalServerError,
    NotImplemented,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::MovedPermanently => 301,
            Status::BadRequest => 400,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::InternalServerError => 500,
            Status::NotImplemented => 501,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::MovedPermanently => "Moved Permanently",
            Status::BadRequest => "Bad Request",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
            Status::InternalServerError => "Internal Server Error",
            Status::NotImplemented => "Not Implemented",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

impl<S: AsyncRead + Unpin> Response<S> {
    pub fn with_header(mut self, name: &str, value: impl ToString) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn status_and_headers(&self) -> String {
        let mut head = format!("HTTP/1.1 {}\r\n", self.status);
        for (k, v) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", k, v));
        }
        head.push_str("Connection: close\r\n\r\n");
        head
    }

    /// Writes the head and, unless `head_only`, the whole body.
    pub async fn write<O: AsyncWrite + Unpin + ?Sized>(
        mut self,
        stream: &mut O,
        head_only: bool,
    ) -> Result<()> {
        stream
            .write_all(self.status_and_headers().as_bytes())
            .await?;

        if !head_only {
            tokio::io::copy(&mut self.data, stream).await?;
        }
        stream.flush().await?;

        Ok(())
    }
}

impl Response<Cursor<Vec<u8>>> {
    pub fn from_html(status: Status, data: impl ToString) -> Self {
        Self::from_bytes(status, HTML_CONTENT_TYPE, data.to_string().into_bytes())
    }

    pub fn from_bytes(status: Status, content_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![
                ("Content-Type".to_string(), content_type.to_string()),
                ("Content-Length".to_string(), bytes.len().to_string()),
            ],
            data: Cursor::new(bytes),
        }
    }

    pub fn empty(status: Status) -> Self {
        Self {
            status,
            headers: vec![("Content-Length".to_string(), "0".to_string())],
            data: Cursor::new(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_status_headers_and_body() {
        let mut out = Vec::new();
        Response::from_html(Status::NotFound, "<p>gone</p>")
            .write(&mut out, false)
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Type: text/html;charset=utf-8\r\n"));
        assert!(text.contains("Content-Length: 11\r\n"));
        assert!(text.ends_with("\r\n\r\n<p>gone</p>"));
    }

    #[tokio::test]
    async fn head_only_skips_body() {
        let mut out = Vec::new();
        Response::from_html(Status::Ok, "body")
            .with_header("X-Test", 1)
            .write(&mut out, true)
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("X-Test: 1\r\n"));
        assert!(text.ends_with("Connection: close\r\n\r\n"));
    }

    #[test]
    fn status_line_text() {
        assert_eq!(Status::NotImplemented.to_string(), "501 Not Implemented");
        assert_eq!(Status::MovedPermanently.code(), 301);
    }
}
