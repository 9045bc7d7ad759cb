//! Transcript export for a conversation, as JSON or CSV.

use roomly_types::models::Message;

use crate::error::Result;

const CSV_HEADER: &str = "id,sender,type,content,attachments,sent_at,read";

pub fn to_json(messages: &[Message]) -> Result<String> {
    Ok(serde_json::to_string_pretty(messages)?)
}

/// RFC 4180 CSV, one row per message. Attachments are joined with `;`.
pub fn to_csv(messages: &[Message]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + messages.len() * 96);
    out.push_str(CSV_HEADER);
    out.push_str("\r\n");

    for m in messages {
        let row = [
            escape(m.id.as_str()),
            escape(m.sender_id.as_str()),
            m.message_type.to_string(),
            escape(&m.content),
            escape(&m.attachments.join(";")),
            m.created_at.to_rfc3339(),
            m.is_read().to_string(),
        ];
        out.push_str(&row.join(","));
        out.push_str("\r\n");
    }
    out
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
