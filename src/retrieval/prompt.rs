//! Prompt assembly for retrieval-augmented generation

use super::DocumentIndex;

const INSTRUCTIONS: &str = "You are a helpful and knowledgeable assistant, an expert in the 3D Slicer software. \
Your goal is to answer user questions as precisely and reliably as possible, using only verified information. \
Below are context documents retrieved from the Slicer knowledge base, followed by the scene description for reference. \
Do not invent answers. If the context is insufficient, say 'I don't know' and suggest relevant tools or documentation in 3D Slicer that could help. \
You can recommend the user to read the 3D Slicer documentation, forums in https://discourse.slicer.org, or tutorials in https://training.slicer.org/";

/// Thinking-mode toggle appended to the question (prompt-level convention
/// of the local model family)
fn think_suffix(think: bool) -> &'static str {
    if think {
        " /think"
    } else {
        " /no_think"
    }
}

/// Assemble the grounded prompt for one question
///
/// Layout: instructions, retrieved context documents joined by `---`
/// separators, the scene snapshot when present, then the question with the
/// thinking toggle.
pub fn build_prompt(
    index: &dyn DocumentIndex,
    question: &str,
    scene: Option<&str>,
    think: bool,
    top_k: usize,
) -> String {
    let docs = index.search(question, top_k);
    let context = docs
        .iter()
        .map(|doc| doc.content.as_str())
        .collect::<Vec<_>>()
        .join("\n---\n");

    let mut prompt = String::new();
    prompt.push_str(INSTRUCTIONS);
    prompt.push_str("\n\nContext documents:\n");
    prompt.push_str(&context);
    prompt.push_str("\n\n");

    if let Some(scene) = scene.filter(|s| !s.is_empty()) {
        prompt.push_str("MRML Scene:\n");
        prompt.push_str(scene);
        prompt.push_str("\n\n");
    }

    prompt.push_str(
        "Now, based on this context and your internal knowledge of 3D Slicer, \
answer the following question as if you were a real expert talking to the user. \
Be concise, accurate, and do not make up facts.\n\n",
    );
    prompt.push_str("User question: ");
    prompt.push_str(question);
    prompt.push_str(think_suffix(think));

    prompt
}
