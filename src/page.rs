//! HTML for the error, redirect and directory index pages.

use html_escape::encode_double_quoted_attribute;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

/// Bytes that would end or alter a relative path reference.
const HREF_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// As `HREF_PATH`, plus the separators of a query string.
const HREF_QUERY_VALUE: &AsciiSet = &HREF_PATH.add(b'&').add(b'+').add(b'=');

const PAGE_HEAD: &str = "<!doctype html>\n<head><meta charset=\"utf-8\">\n\
<meta name=\"viewport\" content=\"initial-scale=1, maximum-scale=1, user-scalable=no, width=device-width\"></head>\n";

/// Escapes every `&`, `<`, `>` and `"` so the result is safe both as text and
/// inside a double-quoted attribute.
pub fn escape_html(value: &str) -> String {
    encode_double_quoted_attribute(value).into_owned()
}

/// Shared document shell. `title` and `heading` are inserted verbatim.
pub fn render_page(title: &str, heading: &str, body: &str) -> String {
    format!(
        "{}<title>{}</title>\n<h1>{}</h1>\n{}\n",
        PAGE_HEAD, title, heading, body
    )
}

pub fn forbidden(path: &str) -> String {
    render_page(
        "403 Forbidden",
        "Forbidden",
        &format!(
            "<p>You do not have permission to access {} on this server.</p>",
            escape_html(path)
        ),
    )
}

pub fn not_found(path: &str) -> String {
    render_page(
        "404 Not Found",
        "Not Found",
        &format!(
            "<p>The requested URL {} was not found on this server.</p>",
            escape_html(path)
        ),
    )
}

pub fn internal_error(detail: &str) -> String {
    render_page(
        "Internal Server Error",
        "Internal Server Error",
        &format!("<pre>{}</pre>", escape_html(detail)),
    )
}

pub fn moved_permanently(location: &str) -> String {
    render_page(
        "301 Moved Permanently",
        "Moved Permanently",
        &format!(
            "<p>The document has moved <a href=\"{}\">here</a>.</p>",
            escape_html(location)
        ),
    )
}

/// A single listed entry. `name` carries a trailing `/` for directories.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IndexEntry {
    pub name: String,
    pub is_media: bool,
}

/// Directory index for `path` (rooted, with trailing `/`). Dot-prefixed
/// entries are skipped; media entries link to `video_page`.
pub fn directory_index(path: &str, entries: &[IndexEntry], video_page: &str) -> String {
    let escaped_path = escape_html(path);
    let mut html = String::new();
    html.push_str(PAGE_HEAD);
    html.push_str(&format!("<title>{}</title>\n", escaped_path));
    html.push_str("<button onclick=\"history.go(-1)\">Back</button>\n");
    html.push_str("<style>\n  ol { list-style-type: none; font-size: 1.2em; }\n</style>\n");
    html.push_str(&format!("<h1>Directory: {}</h1>\n<ol>\n", escaped_path));

    for entry in entries.iter().filter(|e| !e.name.starts_with('.')) {
        let href = if entry.is_media {
            let file = format!("{}{}", path, entry.name);
            format!(
                "{}?file={}",
                video_page,
                utf8_percent_encode(&file, HREF_QUERY_VALUE)
            )
        } else {
            utf8_percent_encode(&entry.name, HREF_PATH).to_string()
        };
        html.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            escape_html(&href),
            escape_html(&entry.name)
        ));
    }

    html.push_str("</ol>\n");
    html
}
