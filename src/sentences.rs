use anyhow::{Context, Result, anyhow};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("synthnote/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct PageSummary {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    extract: String,
}

/// Splits a page summary into sentences whose word count lies within
/// `[min_words, max_words]`.
pub fn split_sentences(summary: &str, min_words: usize, max_words: usize) -> Vec<String> {
    summary
        .replace('\n', " ")
        .split(". ")
        .filter(|sentence| {
            let words = sentence.split_whitespace().count();
            min_words <= words && words <= max_words
        })
        .map(|sentence| sentence.trim().to_string())
        .collect()
}

/// Collects `count` sentences from random Wikipedia page summaries, giving up
/// after `max_requests` pages.
pub async fn wikipedia_sentences(
    lang: &str,
    min_words: usize,
    max_words: usize,
    count: usize,
    max_requests: usize,
) -> Result<Vec<String>> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .with_context(|| "failed to build HTTP client")?;
    let url = format!(
        "https://{}.wikipedia.org/api/rest_v1/page/random/summary",
        lang
    );

    let mut sentences = Vec::new();
    let mut requests = 0;
    while sentences.len() < count {
        if requests >= max_requests {
            return Err(anyhow!(
                "only {} of {} sentences found after {} Wikipedia requests",
                sentences.len(),
                count,
                requests
            ));
        }
        requests += 1;
        let response = match client.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!("Wikipedia request failed: {}", err);
                continue;
            }
        };
        if !response.status().is_success() {
            warn!("Wikipedia returned {}", response.status());
            continue;
        }
        let page: PageSummary = response
            .json()
            .await
            .with_context(|| "failed to parse Wikipedia summary")?;
        if page.kind == "disambiguation" {
            continue;
        }
        let found = split_sentences(&page.extract, min_words, max_words);
        debug!("page {} gave {} sentence(s)", requests, found.len());
        sentences.extend(found);
    }
    sentences.truncate(count);
    Ok(sentences)
}

/// Non-empty lines of `path` in random order, repeated until `count` are
/// available.
pub fn dictionary_sentences<R: Rng>(path: &Path, count: usize, rng: &mut R) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read dictionary: {}", path.display()))?;
    let mut lines: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if lines.is_empty() {
        return Err(anyhow!("dictionary is empty: {}", path.display()));
    }
    lines.shuffle(rng);
    Ok(lines.iter().cycle().take(count).cloned().collect())
}
