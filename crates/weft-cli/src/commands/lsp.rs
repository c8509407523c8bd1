//! `weft lsp` — serve the language server on stdio.

use anyhow::Result;

pub fn run() -> Result<i32> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(weft_lsp::run_stdio());
    Ok(0)
}
