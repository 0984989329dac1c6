pub mod gemini;
pub mod parse;

pub use gemini::{GeminiClient, TextModel};

use indoc::formatdoc;
use serde_json::Value;

use crate::{
    error::AppResult,
    model::{chat::ChatTurn, mail::Mail},
    server_config::cfg,
};

/// Outcome of a summarize call: either the stored summary untouched, or a
/// freshly generated one the caller still has to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummarizeOutcome {
    Cached(String),
    Fresh(String),
}

impl SummarizeOutcome {
    pub fn summary(&self) -> &str {
        match self {
            SummarizeOutcome::Cached(summary) | SummarizeOutcome::Fresh(summary) => summary,
        }
    }
}

/// One-shot analysis of an email. Idempotent: a mail that already carries a
/// summary is returned as-is with zero model invocations. A fresh result is
/// always the normalized structure, so garbled model output can never be
/// persisted verbatim.
pub async fn summarize_email<M: TextModel + ?Sized>(
    model: &M,
    mail: &Mail,
) -> AppResult<SummarizeOutcome> {
    if mail.has_summary() {
        return Ok(SummarizeOutcome::Cached(mail.summary.clone()));
    }

    let prompt = analysis_prompt(&mail.subject, &mail.from_address, &mail.body);
    let raw = model.generate(&prompt).await?;
    let analysis = parse::parse_analysis(&raw);

    Ok(SummarizeOutcome::Fresh(serde_json::to_string(&analysis)?))
}

/// Multi-turn reply: the full transcript so far (newest user turn last) is
/// replayed into the prompt and the raw text response is the answer.
pub async fn chat_reply<M: TextModel + ?Sized>(
    model: &M,
    email_context: &str,
    turns: &[ChatTurn],
) -> AppResult<String> {
    let prompt = conversation_prompt(email_context, turns);
    let raw = model.generate(&prompt).await?;

    Ok(raw.trim().to_string())
}

pub async fn extract_action_items<M: TextModel + ?Sized>(
    model: &M,
    mail: &Mail,
) -> AppResult<Vec<Value>> {
    let raw = model.generate(&action_items_prompt(&email_content(mail))).await?;

    Ok(parse::parse_list(&raw))
}

pub async fn reply_suggestions<M: TextModel + ?Sized>(
    model: &M,
    mail: &Mail,
    style: &str,
) -> AppResult<Vec<Value>> {
    let raw = model
        .generate(&reply_suggestions_prompt(&email_content(mail), style))
        .await?;

    Ok(parse::parse_list(&raw))
}

fn truncated(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn email_content(mail: &Mail) -> String {
    format!(
        "Subject: {}\nFrom: {}\n\n{}",
        mail.subject,
        mail.from_address,
        truncated(&mail.body, cfg.prompt.max_body_chars)
    )
}

/// Single-shot analysis template. Demands exactly one JSON object with the
/// five fields and the enumerated importance values.
pub fn analysis_prompt(subject: &str, from: &str, body: &str) -> String {
    formatdoc! {r#"
        Analyze this email carefully and provide a structured summary in JSON format.

        Return ONLY valid JSON with no additional text:

        {{
          "importance": "Very Important" | "Important" | "Normal" | "Not Wanted",
          "useful": true | false,
          "summary": "A comprehensive 2-3 sentence summary of the email's main content and purpose",
          "key_points": [
            "First key point extracted from email",
            "Second key point extracted from email",
            "Third key point extracted from email"
          ],
          "action_required": "Specific action needed or empty string if none"
        }}

        Guidelines:
        - importance: Based on urgency, sender relevance, and content
        - useful: Is this email valuable to the recipient? (true for important emails, false for spam/promotional)
        - summary: Focus on main message and context
        - key_points: Extract 3-5 most important takeaways
        - action_required: What should recipient do? (e.g., "Reply by Friday", "Approve document", etc. or empty string)

        Email to analyze:
        Subject: {subject}
        From: {from}

        {body}"#,
        subject = subject,
        from = from,
        body = truncated(body, cfg.prompt.max_body_chars),
    }
}

/// Email-details block embedded as context in every conversational prompt.
pub fn email_context(mail: &Mail) -> String {
    let subject = if mail.subject.is_empty() {
        "No Subject"
    } else {
        mail.subject.as_str()
    };
    let from = if mail.from_address.is_empty() {
        "Unknown Sender"
    } else {
        mail.from_address.as_str()
    };
    let summary = if mail.has_summary() {
        mail.summary.as_str()
    } else {
        "Not yet summarized"
    };
    let body = if mail.body.is_empty() {
        "No content available"
    } else {
        truncated(&mail.body, cfg.prompt.max_body_chars)
    };

    formatdoc! {"
        EMAIL DETAILS:
        Subject: {subject}
        From: {from}
        Summary: {summary}

        EMAIL BODY:
        {body}"
    }
}

/// Renders the whole conversation as one text prompt: system preamble with
/// the email context, prior turns as `User:`/`AI:` lines in original order,
/// and a trailing `AI:` cue for the model to continue. The transcript
/// re-enters the prompt in full on every call, so prompt size grows with
/// conversation length.
pub fn conversation_prompt(email_context: &str, turns: &[ChatTurn]) -> String {
    let mut prompt = formatdoc! {"
        You are a helpful AI assistant analyzing an email for the user. Here is the email information:

        {context}

        Please answer the user's questions based on this email context. Be helpful, concise, and accurate. If you cannot answer based on the email context, politely let the user know.",
        context = email_context,
    };

    prompt.push_str("\n\n");
    for turn in turns {
        prompt.push_str(&format!("{}: {}\n\n", turn.role.label(), turn.content));
    }
    prompt.push_str("AI:");

    prompt
}

fn action_items_prompt(email_content: &str) -> String {
    formatdoc! {r#"
        Extract all action items from this email. Return ONLY valid JSON:

        [
          {{
            "action": "What needs to be done",
            "assignee": "Who should do it (or 'Me' if not specified)",
            "deadline": "Deadline date or 'Not specified'",
            "priority": "High" | "Medium" | "Low"
          }}
        ]

        Email:
        {email_content}"#
    }
}

fn reply_suggestions_prompt(email_content: &str, style: &str) -> String {
    formatdoc! {r#"
        Based on this email, generate 3 reply suggestions in {style} style. Return ONLY valid JSON:

        [
          {{
            "subject": "Reply subject line",
            "suggestion": "Full reply text (2-3 sentences)"
          }}
        ]

        Email to reply to:
        {email_content}"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, UpstreamError, UpstreamKind};
    use crate::model::chat::TurnRole;
    use crate::prompt::parse::{EmailAnalysis, Importance};
    use async_trait::async_trait;
    use bson::oid::ObjectId;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum MockReply {
        Text(&'static str),
        Quota,
    }

    struct MockModel {
        reply: MockReply,
        calls: AtomicUsize,
    }

    impl MockModel {
        fn replying(text: &'static str) -> Self {
            Self {
                reply: MockReply::Text(text),
                calls: AtomicUsize::new(0),
            }
        }

        fn quota_limited() -> Self {
            Self {
                reply: MockReply::Quota,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextModel for MockModel {
        async fn generate(&self, _prompt: &str) -> crate::error::AppResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                MockReply::Text(text) => Ok(text.to_string()),
                MockReply::Quota => Err(UpstreamError::new(
                    UpstreamKind::QuotaExceeded,
                    "quota exceeded",
                )
                .into()),
            }
        }
    }

    fn mail(summary: &str, body: &str) -> Mail {
        Mail {
            id: Some(ObjectId::new()),
            user_id: ObjectId::new(),
            mail_id: "msg-1".to_string(),
            from_address: "billing@acme.com".to_string(),
            subject: "Invoice Due".to_string(),
            body: body.to_string(),
            summary: summary.to_string(),
            received_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn cached_summary_skips_the_model() {
        let model = MockModel::replying("should never be called");
        let mail = mail("{\"importance\":\"Normal\"}", "Please pay by Friday.");

        let outcome = summarize_email(&model, &mail).await.unwrap();

        assert_eq!(
            outcome,
            SummarizeOutcome::Cached("{\"importance\":\"Normal\"}".to_string())
        );
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn fresh_summary_is_the_normalized_analysis() {
        let model = MockModel::replying(
            "Sure! {\"importance\":\"Important\",\"useful\":true,\"summary\":\"Invoice due Friday.\",\"key_points\":[\"Payment due Friday\"],\"action_required\":\"Pay invoice\"} Thanks.",
        );
        let mail = mail("", "Please pay by Friday.");

        let outcome = summarize_email(&model, &mail).await.unwrap();
        assert_eq!(model.call_count(), 1);

        let analysis: EmailAnalysis = serde_json::from_str(outcome.summary()).unwrap();
        assert_eq!(analysis.importance, Importance::Important);
        assert_eq!(analysis.summary, "Invoice due Friday.");
        assert_eq!(analysis.action_required, "Pay invoice");
    }

    #[tokio::test]
    async fn unparseable_reply_still_summarizes_with_fallback() {
        let model = MockModel::replying("I could not produce JSON, sorry.");
        let mail = mail("", "Please pay by Friday.");

        let outcome = summarize_email(&model, &mail).await.unwrap();
        let analysis: EmailAnalysis = serde_json::from_str(outcome.summary()).unwrap();
        assert_eq!(analysis.importance, Importance::Normal);
        assert_eq!(analysis.summary, "I could not produce JSON, sorry.");
        assert!(analysis.key_points.is_empty());
    }

    #[tokio::test]
    async fn model_failure_propagates_without_a_summary() {
        let model = MockModel::quota_limited();
        let mail = mail("", "Please pay by Friday.");

        let err = summarize_email(&model, &mail).await.unwrap_err();
        match err {
            AppError::Upstream(upstream) => {
                assert_eq!(upstream.kind, UpstreamKind::QuotaExceeded)
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn chat_reply_is_trimmed_plain_text() {
        let model = MockModel::replying("  The invoice is due on Friday.  \n");
        let turns = vec![ChatTurn::now(TurnRole::User, "When is it due?")];

        let reply = chat_reply(&model, "context", &turns).await.unwrap();
        assert_eq!(reply, "The invoice is due on Friday.");
    }

    #[test]
    fn analysis_prompt_enumerates_importance_and_truncates_body() {
        let long_body = "Q".repeat(cfg.prompt.max_body_chars + 500);
        let prompt = analysis_prompt("Invoice Due", "billing@acme.com", &long_body);

        assert!(prompt.contains("\"Very Important\" | \"Important\" | \"Normal\" | \"Not Wanted\""));
        assert!(prompt.contains("Return ONLY valid JSON"));
        assert!(prompt.contains("Subject: Invoice Due"));

        // The template itself contains no 'Q', so every occurrence came
        // from the (truncated) body.
        let body_in_prompt = prompt.matches('Q').count();
        assert_eq!(body_in_prompt, cfg.prompt.max_body_chars);
    }

    #[test]
    fn conversation_prompt_replays_turns_in_order_with_cue() {
        let turns = vec![
            ChatTurn::now(TurnRole::User, "What's this email about?"),
            ChatTurn::now(TurnRole::Ai, "It's an invoice."),
            ChatTurn::now(TurnRole::User, "When is it due?"),
        ];

        let prompt = conversation_prompt("EMAIL DETAILS: test", &turns);

        let first_user = prompt.find("User: What's this email about?").unwrap();
        let ai = prompt.find("AI: It's an invoice.").unwrap();
        let second_user = prompt.find("User: When is it due?").unwrap();
        assert!(first_user < ai && ai < second_user);
        assert!(prompt.ends_with("AI:"));
        assert!(prompt.contains("EMAIL DETAILS: test"));
    }

    #[test]
    fn email_context_uses_placeholders_for_missing_fields() {
        let mut empty = mail("", "");
        empty.subject = String::new();
        empty.from_address = String::new();

        let context = email_context(&empty);
        assert!(context.contains("Subject: No Subject"));
        assert!(context.contains("From: Unknown Sender"));
        assert!(context.contains("Summary: Not yet summarized"));
        assert!(context.contains("No content available"));
    }

    #[tokio::test]
    async fn action_items_pass_through_as_a_list() {
        let model = MockModel::replying(
            "[{\"action\":\"Pay invoice\",\"assignee\":\"Me\",\"deadline\":\"Friday\",\"priority\":\"High\"}]",
        );
        let mail = mail("", "Please pay by Friday.");

        let items = extract_action_items(&model, &mail).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["action"], "Pay invoice");
    }

    #[tokio::test]
    async fn malformed_list_reply_degrades_to_empty() {
        let model = MockModel::replying("no list here");
        let mail = mail("", "body");

        let suggestions = reply_suggestions(&model, &mail, "professional")
            .await
            .unwrap();
        assert!(suggestions.is_empty());
    }
}
