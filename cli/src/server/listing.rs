//! # Directory Listings
//!
//! File: cli/src/server/listing.rs
//! Author: Christi Mahu
//!
//! Renders an HTML index for a directory that has no `index.html`. Directories are
//! listed first, then files, each group sorted by name. Names are HTML-escaped in the
//! page and percent-encoded in links.
//!
use super::utils::{format_modification_time, human_readable_size};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::fmt::Write;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Characters escaped when a file name is used as one URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'&')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// # Render Directory (`render`)
///
/// Reads `dir` and renders its listing page. `url_path` is the decoded request path
/// (ending in `/`) used for the page title and breadcrumbs.
///
/// ## Errors
///
/// Returns the I/O error if the directory or an entry's metadata cannot be read.
pub async fn render(dir: &Path, url_path: &str) -> io::Result<String> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = read_dir.next_entry().await? {
        let metadata = entry.metadata().await?;
        entries.push(ListingEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: metadata.is_dir(),
            size: metadata.len(),
            modified: metadata.modified().ok(),
        });
    }

    sort_entries(&mut entries);
    Ok(render_html(url_path, &entries))
}

fn sort_entries(entries: &mut [ListingEntry]) {
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
}

pub fn render_html(url_path: &str, entries: &[ListingEntry]) -> String {
    let title = escape_html(url_path);
    let mut page = String::new();

    // Writing to a String cannot fail.
    let _ = write!(
        page,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Index of {title}</title>\n</head>\n<body>\n\
         <h1>Index of {title}</h1>\n<table>\n"
    );

    if url_path != "/" {
        let _ = writeln!(
            page,
            "<tr><td><a href=\"../\">../</a></td><td></td><td></td></tr>"
        );
    }

    for entry in entries {
        let suffix = if entry.is_dir { "/" } else { "" };
        let href = utf8_percent_encode(&entry.name, PATH_SEGMENT);
        let size = if entry.is_dir {
            "-".to_string()
        } else {
            human_readable_size(entry.size)
        };
        let modified = entry
            .modified
            .map(format_modification_time)
            .unwrap_or_else(|| "-".to_string());

        let _ = writeln!(
            page,
            "<tr><td><a href=\"{href}{suffix}\">{}{suffix}</a></td><td>{size}</td><td>{modified}</td></tr>",
            escape_html(&entry.name)
        );
    }

    page.push_str("</table>\n</body>\n</html>\n");
    page
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
