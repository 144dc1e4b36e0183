//! `ask` command: answer a question over the stored dispute set.

use anyhow::Context;
use dispute_core::{DisputeStore, QueryAgent, TableView};

pub async fn ask(store: &DisputeStore, agent: &dyn QueryAgent, question: &str) -> anyhow::Result<String> {
    let records = store.list().await.context("reading stored disputes")?;
    let views = [TableView::disputes(&records), TableView::resolutions(&records)];
    let answer = agent.answer(question, &views).await?;
    Ok(answer)
}
