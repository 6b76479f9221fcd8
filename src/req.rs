use std::{collections::HashMap, convert::TryFrom, fmt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use url::Url;

/// Longest accepted request line or header line, terminator included.
pub const MAX_LINE_BYTES: usize = 8 * 1024;
pub const MAX_HEADERS: usize = 100;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Request target exactly as sent by the client.
    pub target: String,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub version: Version,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent").filter(|ua| !ua.is_empty())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Connect,
    Trace,
    Extension(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
            Method::Connect => "CONNECT",
            Method::Trace => "TRACE",
            Method::Extension(m) => m.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Method {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "OPTIONS" => Ok(Method::Options),
            "CONNECT" => Ok(Method::Connect),
            "TRACE" => Ok(Method::Trace),
            m if !m.is_empty() && m.bytes().all(|b| b.is_ascii_graphic()) => {
                Ok(Method::Extension(m.to_string()))
            }
            m => Err(format!("invalid method token: {:?}", m)),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Version {
    Http1_0,
    Http1_1,
}

impl TryFrom<&str> for Version {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "HTTP/1.0" => Ok(Version::Http1_0),
            "HTTP/1.1" => Ok(Version::Http1_1),
            v => Err(format!("unsupported HTTP version: {}", v)),
        }
    }
}

#[derive(Debug)]
pub enum ParseError {
    Io(std::io::Error),
    ConnectionClosed,
    MissingMethod,
    MissingPath,
    MissingVersion,
    InvalidMethod(String),
    InvalidVersion(String),
    MissingHeaderName,
    MissingHeaderValue,
    HeadTooLarge,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Io(e) => write!(f, "I/O error: {}", e),
            ParseError::ConnectionClosed => write!(f, "connection closed before request line"),
            ParseError::MissingMethod => write!(f, "missing method"),
            ParseError::MissingPath => write!(f, "missing path"),
            ParseError::MissingVersion => write!(f, "missing HTTP version"),
            ParseError::InvalidMethod(m) => write!(f, "invalid method: {}", m),
            ParseError::InvalidVersion(v) => write!(f, "invalid HTTP version: {}", v),
            ParseError::MissingHeaderName => write!(f, "missing header name"),
            ParseError::MissingHeaderValue => write!(f, "missing header value"),
            ParseError::HeadTooLarge => write!(f, "request head too large"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        ParseError::Io(err)
    }
}

/// `read_line` bounded by `MAX_LINE_BYTES`.
async fn read_head_line(
    stream: &mut (impl AsyncBufRead + Unpin),
    line_buffer: &mut String,
) -> Result<usize, ParseError> {
    let n = stream
        .take(MAX_LINE_BYTES as u64 + 1)
        .read_line(line_buffer)
        .await?;
    if n > MAX_LINE_BYTES {
        return Err(ParseError::HeadTooLarge);
    }
    Ok(n)
}

pub async fn parse_request(mut stream: impl AsyncBufRead + Unpin) -> Result<Request, ParseError> {
    let mut line_buffer = String::new();
    if read_head_line(&mut stream, &mut line_buffer).await? == 0 {
        return Err(ParseError::ConnectionClosed);
    }

    let mut parts = line_buffer.split_whitespace();

    let method: Method = parts
        .next()
        .ok_or(ParseError::MissingMethod)
        .and_then(|m| m.try_into().map_err(ParseError::InvalidMethod))?;

    let target: String = parts
        .next()
        .ok_or(ParseError::MissingPath)
        .map(Into::into)?;

    let version: Version = parts
        .next()
        .ok_or(ParseError::MissingVersion)
        .and_then(|v| v.try_into().map_err(ParseError::InvalidVersion))?;

    let mut headers = HashMap::new();

    loop {
        line_buffer.clear();
        read_head_line(&mut stream, &mut line_buffer).await?;

        if line_buffer.is_empty() || line_buffer == "\n" || line_buffer == "\r\n" {
            break;
        }

        let mut comps = line_buffer.splitn(2, ':');
        let key = comps
            .next()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ParseError::MissingHeaderName)?;
        let value = comps.next().ok_or(ParseError::MissingHeaderValue)?.trim();

        headers.insert(key.to_ascii_lowercase(), value.to_string());
        if headers.len() > MAX_HEADERS {
            return Err(ParseError::HeadTooLarge);
        }
    }

    Ok(Request {
        method,
        target,
        headers,
        version,
    })
}

/// Request target resolved against `/`: dot segments collapsed, path always rooted.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RequestUrl {
    /// Still percent-encoded.
    pub pathname: String,
    pub query: Option<String>,
    pub params: Vec<(String, String)>,
}

impl RequestUrl {
    pub fn normalize(target: &str) -> Result<Self, url::ParseError> {
        let mut url = Url::parse("http://localhost/")?;

        if target.starts_with('/') {
            let (path, query) = match target.split_once('?') {
                Some((path, query)) => (path, Some(query)),
                None => (target, None),
            };
            url.set_path(path);
            url.set_query(query);
        } else {
            url = url.join(target)?;
        }

        let pathname = match url.path() {
            "" => "/".to_string(),
            p if !p.starts_with('/') => format!("/{}", p),
            p => p.to_string(),
        };
        let params = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Ok(Self {
            pathname,
            query: url.query().map(str::to_string),
            params,
        })
    }

    /// Pathname followed by the original query string, if any.
    pub fn to_relative_string(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.pathname, q),
            None => self.pathname.clone(),
        }
    }
}
