//! Page Generator (spec §4.H): builds a RAG-augmented prompt per page,
//! validates Mermaid diagrams in the response, and records token usage.

pub mod mermaid;
pub mod prompt;

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

use crate::chunking::estimate_tokens;
use crate::error::{Error, Result};

pub use prompt::build_page_prompt;

const PAGE_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone)]
pub struct GeneratedPage {
    pub content: String,
    pub prompt_tokens: u64,
    pub response_tokens: u64,
}

/// Drives completion + Mermaid validation/self-fix for one page. `complete`
/// sends a prompt and returns the full accumulated response text;
/// `fix_diagram` is invoked once per invalid diagram with a "fix this"
/// prompt built from the offending block.
pub async fn generate_page<F, Fut, G, GFut>(
    prompt: &str,
    mut complete: F,
    mut fix_diagram: G,
) -> Result<GeneratedPage>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<String>>,
    G: FnMut(String) -> GFut,
    GFut: Future<Output = Result<String>>,
{
    let response = timeout(Duration::from_secs(PAGE_TIMEOUT_SECS), complete(prompt.to_string()))
        .await
        .map_err(|_| Error::Transient(format!("page generation exceeded {PAGE_TIMEOUT_SECS}s timeout")))??;

    let fixed = mermaid::validate_and_fix(&response, &mut fix_diagram).await?;

    Ok(GeneratedPage {
        prompt_tokens: u64::from(estimate_tokens(prompt)),
        response_tokens: u64::from(estimate_tokens(&fixed)),
        content: fixed,
    })
}
