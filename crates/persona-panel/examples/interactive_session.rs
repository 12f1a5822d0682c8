//! Interactive consultation with the default expert panel.
//!
//! Each line read from stdin is sent to every expert; their answers are
//! printed in panel order. Commands:
//!
//! - `/summary` prints a summary of the conversation so far
//! - `/export` prints the Markdown transcript
//! - `/quit` exits
//!
//! Run with: GEMINI_API_KEY=... cargo run --example interactive_session

use persona_panel::observability::{self, ObservabilityConfig};
use persona_panel::{PanelConfig, PanelError, Session};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init(ObservabilityConfig::from_env()?)?;

    let config = PanelConfig::from_env()?;
    let oracle = Arc::new(config.gemini_oracle()?);
    let mut session = Session::from_config(&config, oracle)?;

    println!("🩺 AIお悩み相談室");
    println!(
        "   パネル: {}  (モデル: {}, 実行: {})\n",
        session.registry().names().join(" / "),
        config.model,
        config.concurrency
    );
    println!("相談内容を入力してください。/summary /export /quit が使えます。\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/summary" => match session.summarize().await {
                Ok(summary) => println!("📝 要約\n{summary}\n"),
                Err(PanelError::Precondition(msg)) => println!("⚠️  {msg}\n"),
                Err(err) => return Err(err.into()),
            },
            "/export" => println!("{}", session.transcript_markdown()),
            input => match session.submit(input).await {
                Ok(turn) => {
                    for reply in &turn.replies {
                        let icon = if reply.outcome.is_failed() { "❌" } else { "💬" };
                        println!("{icon} {}\n{}\n", reply.persona, reply.text());
                    }
                }
                Err(PanelError::Validation(msg)) => println!("⚠️  {msg}\n"),
                Err(err) => return Err(err.into()),
            },
        }
    }

    Ok(())
}
