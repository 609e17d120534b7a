use flixdb_core::config::GenerationSettings;
use flixdb_core::types::{ChatMessage, Document, Prompt, Role};

pub const SYSTEM_PROMPT: &str = "You are a helpful customer support assistant for StreamFlix, a streaming service similar to Netflix.

Your role is to help users with their questions about the service. Use the provided help articles to answer questions accurately and helpfully.

Guidelines:
- Be friendly, concise, and helpful
- Use the information from the provided articles to answer
- If the articles don't fully answer the question, acknowledge what you can help with
- Format your response with clear steps when appropriate
- Don't make up information not in the articles
- Keep responses focused and not too long";

/// Numbered article blocks separated by `---`.
pub fn article_context(articles: &[Document]) -> String {
    articles
        .iter()
        .enumerate()
        .map(|(i, a)| {
            format!(
                "Article {}: {}\nCategory: {}\nContent: {}\n",
                i + 1,
                a.title,
                a.tag("category").unwrap_or("general"),
                a.body
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

pub fn build_prompt(question: &str, articles: &[Document], settings: &GenerationSettings) -> Prompt {
    let user = format!(
        "Based on the following help articles, please answer the user's question.\n\n\
         HELP ARTICLES:\n{}\n\n\
         USER QUESTION: {}\n\n\
         Please provide a helpful, conversational response that addresses the user's question using the information from the articles above.",
        article_context(articles),
        question
    );
    Prompt {
        messages: vec![
            ChatMessage { role: Role::System, content: SYSTEM_PROMPT.to_string() },
            ChatMessage { role: Role::User, content: user },
        ],
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_articles_in_order() {
        let articles = vec![
            Document::new("help:1", "Reset your password", "Open Account > Security.").with_tag("category", "Account"),
            Document::new("help:2", "Two-factor login", "Enable 2FA in settings.").with_tag("category", "Account"),
        ];
        let prompt = build_prompt("How do I reset my password?", &articles, &GenerationSettings::default());

        assert_eq!(prompt.messages.len(), 2);
        assert_eq!(prompt.messages[0].role, Role::System);
        let user = &prompt.messages[1].content;
        let first = user.find("Article 1: Reset your password").unwrap();
        let second = user.find("Article 2: Two-factor login").unwrap();
        assert!(first < second);
        assert!(user.contains("Category: account"));
        assert!(user.contains("\n---\n"));
        assert!(user.contains("USER QUESTION: How do I reset my password?"));
        assert_eq!(prompt.max_tokens, 500);
    }
}
