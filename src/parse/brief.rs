//! "The Brief" extraction.
//!
//! The section is located textually: the `>The Brief<` heading, then the end
//! of the `</div>` that follows it. From there the enclosing `<div>` is cut
//! out by counting nested div tags. Links inside it are collected with a CSS
//! selector and rendered as JSON.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use log::debug;
use scraper::{Html, Selector};
use serde::Serialize;

use crate::config::{BRIEF_MARKER, DIV_CLOSE_TAG};
use crate::error_handling::ExtractError;
use crate::utils::parse_selector_unsafe;

const ANCHOR_SELECTOR_STR: &str = "a[href]";

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| parse_selector_unsafe(ANCHOR_SELECTOR_STR, "ANCHOR_SELECTOR"));

/// Extracted links: absolute link -> trimmed title.
pub type Links = BTreeMap<String, String>;

/// Returns the content of the div that encloses `start`, trimmed.
///
/// Scanning begins at `start` with a nesting level of one. Every `<div`
/// raises the level and every `</div` lowers it; the content ends right before
/// the closing tag that brings the level to zero.
///
/// # Arguments
///
/// * `data` - HTML text
/// * `start` - Byte offset inside the enclosing div
///
/// # Returns
///
/// The enclosed content. If input ends while no nested div is open, the rest
/// of the input; if it ends inside a nested div, an empty string.
pub fn extract_div(data: &str, start: usize) -> String {
    let Some(rest) = data.get(start..) else {
        return String::new();
    };
    let bytes = data.as_bytes();
    let mut level = 1usize;
    let mut idx = start;

    while level > 0 {
        let Some(found) = data.get(idx..).and_then(|tail| tail.find("div")) else {
            return if level == 1 {
                rest.to_string()
            } else {
                String::new()
            };
        };
        idx += found;
        let is_open = idx >= 1 && bytes[idx - 1] == b'<';
        let is_close = idx >= 2 && bytes[idx - 2] == b'<' && bytes[idx - 1] == b'/';
        if is_open {
            level += 1;
        } else if is_close {
            level -= 1;
        }
        idx += 1;
    }

    // `idx` is one past the `d` of the closing `</div`.
    let end = idx.saturating_sub(3).max(start);
    data[start..end].trim().to_string()
}

/// Collects the links of an HTML fragment.
///
/// Entities in hrefs and titles are decoded, titles are trimmed, and hrefs
/// are resolved against `base`. The first title seen for a link wins. Hrefs
/// that cannot be resolved are skipped.
///
/// # Errors
///
/// Returns `ExtractError::BaseUrl` if `base` is not an absolute URL.
pub fn links(fragment: &str, base: &str) -> Result<Links, ExtractError> {
    let base_url = ::url::Url::parse(base).map_err(|source| ExtractError::BaseUrl {
        url: base.to_string(),
        source,
    })?;

    let document = Html::parse_fragment(fragment);
    let mut links = Links::new();
    for anchor in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let link = match base_url.join(href.trim()) {
            Ok(link) => link.to_string(),
            Err(e) => {
                debug!("skipping link {href:?}: {e}");
                continue;
            }
        };
        let title = anchor.text().collect::<String>().trim().to_string();
        links.entry(link).or_insert(title);
    }
    Ok(links)
}

/// Renders links in the relaxed format: unquoted keys, one field per line.
///
/// ```text
/// { news: [ {
/// title:"...",
/// link:"..."
/// }]}
/// ```
pub fn links_to_json(links: &Links) -> Result<String, ExtractError> {
    let entries = links
        .iter()
        .map(|(link, title)| -> Result<String, serde_json::Error> {
            Ok(format!(
                "{{\ntitle:{},\nlink:{}\n}}",
                serde_json::to_string(title)?,
                serde_json::to_string(link)?
            ))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("{{ news: [ {}]}}", entries.join(",\n")))
}

#[derive(Serialize)]
struct NewsItem<'a> {
    title: &'a str,
    link: &'a str,
}

#[derive(Serialize)]
struct News<'a> {
    news: Vec<NewsItem<'a>>,
}

/// Renders links as standard JSON: `{"news":[{"title":..,"link":..}]}`.
pub fn links_to_strict_json(links: &Links) -> Result<String, ExtractError> {
    let news = News {
        news: links
            .iter()
            .map(|(link, title)| NewsItem { title, link })
            .collect(),
    };
    Ok(serde_json::to_string(&news)?)
}

/// Finds "The Brief" in `html` and returns its links.
///
/// # Errors
///
/// `BriefNotFound` when the marker or the `</div>` after it is missing,
/// `InvalidBrief` when the div around it is empty or unbalanced.
pub fn extract(html: &str, base: &str) -> Result<Links, ExtractError> {
    let marker = html.find(BRIEF_MARKER).ok_or(ExtractError::BriefNotFound)?;
    let close = html[marker..]
        .find(DIV_CLOSE_TAG)
        .ok_or(ExtractError::BriefNotFound)?;
    let start = marker + close + DIV_CLOSE_TAG.len();

    let div = extract_div(html, start);
    if div.is_empty() {
        return Err(ExtractError::InvalidBrief);
    }
    debug!("brief section is {} bytes", div.len());
    links(&div, base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_div_follows_nesting() {
        let data = r#"
            <div>
              <div>Hello
              </div>
            </div>
          </div>
                       "#;
        let expect = r#"<div>
              <div>Hello
              </div>
            </div>"#;
        assert_eq!(extract_div(data, 0), expect);
    }

    #[test]
    fn test_extract_div_ignores_div_in_text() {
        let data = "<p>divide and conquer</p><div>x</div></div>tail";
        assert_eq!(extract_div(data, 0), "<p>divide and conquer</p><div>x</div>");
    }

    #[test]
    fn test_extract_div_unterminated() {
        assert_eq!(extract_div("  just text  ", 0), "  just text  ");
        assert_eq!(extract_div("<div>never closed", 0), "");
        assert_eq!(extract_div("abc", 10), "");
    }

    #[test]
    fn test_links_decodes_and_resolves() {
        let data = r#"
            <div>
              <div><a href="http://hello/world?a&amp;b">The World got crazy</a>
              </div><a href="/test">Just a test</a>
            </div>
            <a
               href="https://dark/net"
            >Don't click &quot;this&quot; secret link
            </a>
          </div>
                       "#;
        let links = links(data, "http://testhost/").unwrap();

        assert_eq!(links.len(), 3);
        assert_eq!(
            links.get("http://hello/world?a&b").map(String::as_str),
            Some("The World got crazy")
        );
        assert_eq!(
            links.get("http://testhost/test").map(String::as_str),
            Some("Just a test")
        );
        assert_eq!(
            links.get("https://dark/net").map(String::as_str),
            Some("Don't click \"this\" secret link")
        );
    }

    #[test]
    fn test_links_rejects_relative_base() {
        assert!(matches!(
            links("<a href='/x'>x</a>", "/relative"),
            Err(ExtractError::BaseUrl { .. })
        ));
    }

    #[test]
    fn test_relaxed_json() {
        let links: Links = [
            ("http://hello/world", "The World\ngot crazy"),
            ("https://dark/net", "Don't click this \"secret link\""),
        ]
        .into_iter()
        .map(|(link, title)| (link.to_string(), title.to_string()))
        .collect();

        let expect = r#"{ news: [ {
title:"The World\ngot crazy",
link:"http://hello/world"
},
{
title:"Don't click this \"secret link\"",
link:"https://dark/net"
}]}"#;
        assert_eq!(links_to_json(&links).unwrap(), expect);
        assert_eq!(links_to_json(&Links::new()).unwrap(), "{ news: [ ]}");
    }

    #[test]
    fn test_strict_json() {
        let mut links = Links::new();
        links.insert("http://a/".to_string(), "A \"quoted\" title".to_string());
        let json = links_to_strict_json(&links).unwrap();
        assert_eq!(
            json,
            r#"{"news":[{"title":"A \"quoted\" title","link":"http://a/"}]}"#
        );
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["news"][0]["link"], "http://a/");
    }

    #[test]
    fn test_extract_finds_brief_section() {
        let html = r#"<html><body>
            <div class="brief">
              <div class="heading"><h2>The Brief</h2></div>
              <ul>
                <li><a href="/news/one">First story</a></li>
                <li><a href="https://other.example/two"> Second story </a></li>
              </ul>
            </div>
            <div><a href="/not-in-brief">Elsewhere</a></div>
        </body></html>"#;
        let links = extract(html, "https://time.com/").unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links["https://time.com/news/one"], "First story");
        assert_eq!(links["https://other.example/two"], "Second story");
    }

    #[test]
    fn test_extract_errors() {
        assert!(matches!(
            extract("<html>nothing here</html>", "http://h/"),
            Err(ExtractError::BriefNotFound)
        ));
        assert!(matches!(
            extract("<h2>The Brief</h2>", "http://h/"),
            Err(ExtractError::BriefNotFound)
        ));
        assert!(matches!(
            extract("<div><h2>The Brief</h2></div></div>", "http://h/"),
            Err(ExtractError::InvalidBrief)
        ));
    }
}
