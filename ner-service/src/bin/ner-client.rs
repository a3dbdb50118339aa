//! Command-line client for the NER service.
//!
//! Analyse texts given as arguments, lines read from stdin, or a JSON-lines
//! file of email records:
//!
//! ```text
//! ner-client "Acme Corp announced new products today."
//! ner-client --emails inbox.jsonl
//! ```

use anyhow::{bail, Context};
use clap::Parser;
use ner_service::{NerClient, DEFAULT_BIND_ADDRESS};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

#[derive(Parser, Debug)]
#[command(name = "ner-client", about = "Ask the NER service which organization a text names")]
struct Cli {
    /// Service address
    #[arg(long, env = "NER_BIND_ADDRESS", default_value = DEFAULT_BIND_ADDRESS)]
    address: String,

    /// JSON-lines file of email records ({"id", "from", "subject", "body"})
    #[arg(long, conflicts_with = "texts")]
    emails: Option<PathBuf>,

    /// Texts to analyse; reads one text per line from stdin when omitted
    texts: Vec<String>,
}

/// A fetched email, as produced by the mail collector.
#[derive(Deserialize, Debug)]
struct Email {
    id: String,
    #[serde(default)]
    from: String,
    #[serde(default)]
    subject: String,
    body: String,
    #[serde(default)]
    date: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ner_core::init_tracing("ner-client");
    let cli = Cli::parse();

    let mut client = NerClient::connect(&cli.address)
        .await
        .with_context(|| format!("Failed to connect to {}", cli.address))?;

    if let Some(path) = &cli.emails {
        for email in read_emails(path)? {
            tracing::debug!(id = %email.id, from = %email.from, subject = %email.subject, date = ?email.date, "Analysing email");
            let company = client
                .find_company(&email.body)
                .await
                .with_context(|| format!("Request for email {} failed", email.id))?;
            println!("{}\t{}", email.id, company.as_deref().unwrap_or("-"));
        }
    } else if cli.texts.is_empty() {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(text) = next_text(&mut lines).await.context("Failed to read stdin")? {
            print_company(&mut client, &text).await?;
        }
    } else {
        for text in &cli.texts {
            print_company(&mut client, text).await?;
        }
    }

    client.close().await;
    Ok(())
}

/// Next non-blank line, or `None` at end of input.
async fn next_text<R>(lines: &mut Lines<R>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(line) = lines.next_line().await? {
        if !line.trim().is_empty() {
            return Ok(Some(line));
        }
    }
    Ok(None)
}

async fn print_company(client: &mut NerClient, text: &str) -> anyhow::Result<()> {
    let company = client.find_company(text).await?;
    println!("{}", company.as_deref().unwrap_or("-"));
    Ok(())
}

fn read_emails(path: &Path) -> anyhow::Result<Vec<Email>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut emails = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Email>(line) {
            Ok(email) => emails.push(email),
            Err(e) => bail!("{}:{}: invalid email record: {e}", path.display(), index + 1),
        }
    }
    Ok(emails)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_next_text_skips_blank_lines() {
        let input: &[u8] = b"Acme Corp news\n\n   \nGlobex update\n";
        let mut lines = BufReader::new(input).lines();

        assert_eq!(
            next_text(&mut lines).await.unwrap().as_deref(),
            Some("Acme Corp news")
        );
        assert_eq!(
            next_text(&mut lines).await.unwrap().as_deref(),
            Some("Globex update")
        );
        assert_eq!(next_text(&mut lines).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_next_text_reads_final_line_without_newline() {
        let input: &[u8] = b"\nInitech";
        let mut lines = BufReader::new(input).lines();

        assert_eq!(next_text(&mut lines).await.unwrap().as_deref(), Some("Initech"));
        assert_eq!(next_text(&mut lines).await.unwrap(), None);
    }

    #[test]
    fn test_read_emails_reports_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox.jsonl");
        std::fs::write(
            &path,
            "{\"id\": \"1\", \"body\": \"Acme Corp\", \"date\": 1700000000}\n\nnot json\n",
        )
        .unwrap();

        let err = read_emails(&path).unwrap_err();
        assert!(err.to_string().contains(":3:"));
    }
}
