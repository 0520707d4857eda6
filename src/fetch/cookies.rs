//! Cookie-header plumbing.
//!
//! The engine never parses cookies itself; callers load them from a
//! Netscape-format cookies.txt file and pass the formatted `Cookie` header
//! in a request's header map.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use super::{FetchError, Result};

/// A single name/value cookie pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// Parse a Netscape-format cookies.txt file.
///
/// Blank lines and `#` comments are skipped. A record is 7 TAB-separated
/// fields with the name and value in the last two; lines that do not match
/// are ignored.
pub async fn cookies_from_file(path: impl AsRef<Path>) -> Result<Vec<Cookie>> {
    let path = path.as_ref();
    let file = File::open(path).await.map_err(|e| FetchError::Io {
        path: path.to_path_buf(),
        message: format!("could not open cookie file: {e}"),
    })?;

    let mut cookies = Vec::new();
    let mut lines = BufReader::new(file).lines();
    while let Some(line) = lines.next_line().await.map_err(|e| FetchError::Io {
        path: path.to_path_buf(),
        message: format!("could not read cookie file: {e}"),
    })? {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 7 {
            continue;
        }

        cookies.push(Cookie {
            name: fields[5].to_string(),
            value: fields[6].to_string(),
        });
    }

    Ok(cookies)
}

/// Format cookies as a single `Cookie` header value:
/// `name1=value1; name2=value2`.
pub fn cookie_header(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .map(|cookie| format!("{}={}", cookie.name, cookie.value))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str, value: &str) -> Cookie {
        Cookie {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn header_formatting() {
        let cookies = vec![cookie("session", "abc123"), cookie("theme", "dark")];
        assert_eq!(cookie_header(&cookies), "session=abc123; theme=dark");
        assert_eq!(cookie_header(&[]), "");
        assert_eq!(cookie_header(&[cookie("lone", "1")]), "lone=1");
    }

    #[tokio::test]
    async fn parses_netscape_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        let content = "\
# Netscape HTTP Cookie File
# This is a comment

.example.com\tTRUE\t/\tFALSE\t1999999999\tsession\tabc123
.example.com\tTRUE\t/\tTRUE\t1999999999\ttheme\tdark
malformed line without tabs
.example.com\tTRUE\t/\tFALSE\ttoo\tfew
";
        tokio::fs::write(&path, content).await.unwrap();

        let cookies = cookies_from_file(&path).await.unwrap();
        assert_eq!(
            cookies,
            vec![cookie("session", "abc123"), cookie("theme", "dark")]
        );
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = cookies_from_file("/nonexistent/cookies.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Io { .. }));
    }
}
