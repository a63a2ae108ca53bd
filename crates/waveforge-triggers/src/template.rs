//! Template Resolver: replaces `{key}` tokens case-insensitively. Lookup order
//! (later wins on a collision): rule captures, caller-supplied additionals, then the
//! standard message-context keys. Unknown tokens are left untouched.

use std::collections::BTreeMap;

use crate::model::IncomingMessage;

pub fn resolve(
    template: &str,
    captures: &BTreeMap<String, String>,
    additionals: &BTreeMap<String, String>,
    message: &IncomingMessage,
) -> String {
    let mut values: BTreeMap<String, String> = BTreeMap::new();
    for (k, v) in captures {
        values.insert(k.to_lowercase(), v.clone());
    }
    for (k, v) in additionals {
        values.insert(k.to_lowercase(), v.clone());
    }
    for (k, v) in message_context(message) {
        values.insert(k, v);
    }

    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        let mut key = String::new();
        let mut closed = false;
        for c2 in chars.by_ref() {
            if c2 == '}' {
                closed = true;
                break;
            }
            key.push(c2);
        }
        if closed {
            match values.get(&key.to_lowercase()) {
                Some(value) => out.push_str(value),
                None => {
                    out.push('{');
                    out.push_str(&key);
                    out.push('}');
                }
            }
        } else {
            out.push('{');
            out.push_str(&key);
        }
    }
    out
}

fn message_context(message: &IncomingMessage) -> BTreeMap<String, String> {
    let mut ctx = BTreeMap::new();
    ctx.insert("username".to_string(), message.sender_username.clone().unwrap_or_default());
    ctx.insert("userid".to_string(), message.sender_user_id.clone().unwrap_or_default());
    ctx.insert("channelid".to_string(), message.channel_id.clone().unwrap_or_default());
    ctx.insert("channelname".to_string(), message.channel_name.clone().unwrap_or_default());
    ctx.insert("source".to_string(), format!("{:?}", message.source).to_lowercase());
    ctx.insert("messageid".to_string(), message.message_id.clone());
    ctx.insert("text".to_string(), message.text.clone());
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageSource;
    use chrono::Utc;

    fn message() -> IncomingMessage {
        IncomingMessage {
            message_id: "msg-1".into(),
            source: MessageSource::Slack,
            text: "/build my-api".into(),
            sender_username: Some("alice".into()),
            sender_user_id: Some("u1".into()),
            channel_id: Some("c1".into()),
            channel_name: Some("general".into()),
            received_at: Utc::now(),
            metadata: BTreeMap::new(),
            raw_payload: None,
        }
    }

    #[test]
    fn rule_captures_and_additionals_and_message_context_all_resolve() {
        let mut captures = BTreeMap::new();
        captures.insert("project".to_string(), "my-api".to_string());
        let mut additionals = BTreeMap::new();
        additionals.insert("runId".to_string(), "run-42".to_string());

        let resolved = resolve("Run {runId} for {project} (by {Username})", &captures, &additionals, &message());
        assert_eq!(resolved, "Run run-42 for my-api (by alice)");
    }

    #[test]
    fn additionals_override_same_key_in_captures() {
        let mut captures = BTreeMap::new();
        captures.insert("runId".to_string(), "stale".to_string());
        let mut additionals = BTreeMap::new();
        additionals.insert("runId".to_string(), "fresh".to_string());

        let resolved = resolve("{runId}", &captures, &additionals, &message());
        assert_eq!(resolved, "fresh");
    }

    #[test]
    fn unknown_token_is_left_literal() {
        let resolved = resolve("hello {nonexistent}", &BTreeMap::new(), &BTreeMap::new(), &message());
        assert_eq!(resolved, "hello {nonexistent}");
    }
}
