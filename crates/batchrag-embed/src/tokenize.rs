use anyhow::{anyhow, Result};
use tokenizers::Tokenizer;

/// Encode with special tokens and cut to `max_len`. When the sequence is cut,
/// the last slot is overwritten with `eos_id` so pooling at the end-of-text
/// token still sees it.
pub fn tokenize_truncated(tokenizer: &Tokenizer, text: &str, max_len: usize, eos_id: Option<u32>) -> Result<Vec<u32>> {
    let enc = tokenizer.encode(text, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let mut ids = enc.get_ids().to_vec();
    if ids.len() > max_len {
        ids.truncate(max_len);
        if let (Some(eos), Some(last)) = (eos_id, ids.last_mut()) { *last = eos; }
    }
    if ids.is_empty() { return Err(anyhow!("Tokenization produced no tokens")); }
    Ok(ids)
}
