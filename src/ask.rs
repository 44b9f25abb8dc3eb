//! `rag ask`: one question through the chat use case.

use anyhow::Result;

use crate::config::Config;
use crate::services::Services;

pub async fn run_ask(config: &Config, question: &str, session: Option<String>) -> Result<()> {
    let services = Services::open(config).await?;
    let reply = services.chat.ask(question, session).await;
    services.close().await;
    let reply = reply?;

    println!("{}", reply.answer);
    println!();
    if reply.sources.is_empty() {
        println!("sources: none");
    } else {
        println!("sources: {}", reply.sources.join(", "));
    }
    println!("session: {}", reply.session_id);
    Ok(())
}
