//! Fixed prompt templates.

/// Reply the model is instructed to give when the context lacks the answer.
pub const NO_GROUNDING_SENTINEL: &str = "I could not find this information in the provided context.";

pub const NO_CONTEXT: &str = "No relevant context found.";

pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant for The Batch news articles. Answer only from the provided context.";

const RAG_TEMPLATE: &str = r#"You are an AI assistant that answers questions based on both textual and visual information from The Batch news articles.

## Instructions:
- Always follow this response structure:
  1. If an image is provided in the context, display it first in Markdown format:
     ![Article Title](Image_URL)
  2. Provide a short summary of the article (1-3 sentences) that concisely explains the main point.
  3. Provide the complete article text by combining all provided chunks in chronological order, without adding or removing information.
- Use both text articles and images to provide comprehensive answers.
- If images are mentioned, describe their relevance to the query.
- If the answer cannot be found in the context, respond with: "{sentinel}"
- Maintain factual accuracy and do not fabricate details.

## Available Context (Text + Images):
{context}

## User Question:
{query}

## Response format:
Follow the required structure:
1. Markdown image (if available)
2. Summary
3. Full article text
"#;

const QUERY_TEMPLATE: &str = r#"You are a search query generator.
Given the article title: "{title}", generate 3 search queries:
1. Direct title-based query (close to original wording).
2. Paraphrased query with the same meaning.
3. Related but noisy query (different wording, partial topic relevance).

Respond ONLY with valid JSON in the format:
{"direct": "...", "paraphrased": "...", "noisy": "..."}
"#;

pub fn render_rag_prompt(context: &str, query: &str) -> String {
    let context = if context.trim().is_empty() { NO_CONTEXT } else { context };
    RAG_TEMPLATE
        .replace("{sentinel}", NO_GROUNDING_SENTINEL)
        .replace("{context}", context)
        .replace("{query}", query)
}

pub fn render_query_prompt(title: &str) -> String {
    QUERY_TEMPLATE.replace("{title}", title)
}
