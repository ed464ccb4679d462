//! Prompt templates.
//!
//! Templates use `{context}`, `{chat_history}` and `{question}` placeholders.
//! Rendering is a single left-to-right pass, so placeholder-looking text
//! inside substituted values (a chunk that happens to contain `{question}`)
//! is never expanded.

/// Default answer prompt.
pub const DEFAULT_QA_TEMPLATE: &str = "You are a helpful assistant. Use ONLY the context from the retrieved documents to answer the user's question.
If the answer is not in the provided context, say \"I could not find that information in the documents.\"

Context:
{context}

Chat History:
{chat_history}

Question:
{question}

Helpful Answer:";

/// Rewrites a follow-up question so it can be understood without history.
pub const CONDENSE_QUESTION_TEMPLATE: &str = "Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question, in its original language.

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:";

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

/// Values substituted into a [`PromptTemplate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptVars<'a> {
    pub context: &'a str,
    pub chat_history: &'a str,
    pub question: &'a str,
}

impl PromptVars<'_> {
    fn get(&self, name: &str) -> Option<&str> {
        match name {
            "context" => Some(self.context),
            "chat_history" => Some(self.chat_history),
            "question" => Some(self.question),
            _ => None,
        }
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn qa_default() -> Self {
        Self::new(DEFAULT_QA_TEMPLATE)
    }

    pub fn condense_default() -> Self {
        Self::new(CONDENSE_QUESTION_TEMPLATE)
    }

    /// True when the template has a `{chat_history}` slot.
    pub fn uses_history(&self) -> bool {
        self.template.contains("{chat_history}")
    }

    pub fn render(&self, vars: &PromptVars<'_>) -> String {
        let mut out = String::with_capacity(
            self.template.len()
                + vars.context.len()
                + vars.chat_history.len()
                + vars.question.len(),
        );
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let substituted = after
                .find('}')
                .and_then(|close| vars.get(&after[..close]).map(|value| (value, close)));
            match substituted {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::qa_default()
    }
}

/// Joins retrieved chunk texts into the `{context}` value.
pub fn join_context<'a>(texts: impl IntoIterator<Item = &'a str>) -> String {
    texts.into_iter().collect::<Vec<_>>().join("\n\n")
}
