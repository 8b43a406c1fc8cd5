//! Wikipedia lookup bot
//!
//! Messages starting with `/wiki ` trigger a best-effort opensearch query.
//! The reply re-enters the normal message path as an ordinary message from
//! author "Bot". Every failure mode here (network, bad JSON, no results)
//! degrades to "no reply" and must never take the session down with it.

use serde_json::Value;
use tracing::debug;

use crate::protocol::Message;

/// Command prefix recognized by the bot
pub const WIKI_PREFIX: &str = "/wiki ";

/// Author name attached to bot replies
pub const BOT_AUTHOR: &str = "Bot";

const SEARCH_URL: &str = "https://en.wikipedia.org/w/api.php";

/// A single search result
#[derive(Debug, PartialEq)]
struct WikiHit {
    title: String,
    summary: String,
    link: String,
}

/// Build a bot reply for the given message text, if it is a wiki command
/// and the lookup succeeds
pub async fn wiki_reply(http: &reqwest::Client, text: &str) -> Option<Message> {
    let query = wiki_query(text)?;

    let body = match search(http, query).await {
        Ok(body) => body,
        Err(e) => {
            debug!("Wiki lookup for {:?} failed: {}", query, e);
            return None;
        }
    };

    let hit = parse_hit(&body)?;
    Some(Message::new(
        BOT_AUTHOR,
        format!("<a href=\"{}\">{}</a>: {}", hit.link, hit.title, hit.summary),
    ))
}

/// Extract the query from a wiki command, if the text is one
fn wiki_query(text: &str) -> Option<&str> {
    let query = text.strip_prefix(WIKI_PREFIX)?.trim();
    if query.is_empty() {
        None
    } else {
        Some(query)
    }
}

async fn search(http: &reqwest::Client, query: &str) -> reqwest::Result<Value> {
    http.get(SEARCH_URL)
        .query(&[
            ("action", "opensearch"),
            ("search", query),
            ("limit", "2"),
            ("namespace", "0"),
            ("format", "json"),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
}

/// Pull the first title/summary/link triple out of an opensearch response.
/// The response is a flat array: [query, [titles], [summaries], [links]].
fn parse_hit(body: &Value) -> Option<WikiHit> {
    let field = |idx: usize| -> Option<&str> { body.get(idx)?.get(0)?.as_str() };
    Some(WikiHit {
        title: field(1)?.to_string(),
        summary: field(2).unwrap_or_default().to_string(),
        link: field(3)?.to_string(),
    })
}
