//! Variable substitution engine for templates

use std::collections::HashMap;

use crate::notification::Notification;

/// Variable name to rendered value
pub type Variables = HashMap<String, String>;

/// Collect the variables a notification exposes to its templates.
///
/// Every string, number and boolean metadata key is available under its own
/// name. The notification fields (`title`, `body`, `user_id`,
/// `notification_type`, `order_id`, `merchant_id`, `listing_id`) take
/// precedence over metadata keys of the same name.
pub fn template_variables(notification: &Notification) -> Variables {
    let mut vars = Variables::new();

    for (key, value) in &notification.metadata {
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            // Arrays, objects and null are not addressable from templates
            _ => continue,
        };
        vars.insert(key.clone(), rendered);
    }

    vars.insert("title".into(), notification.title.clone());
    vars.insert("body".into(), notification.body.clone());
    vars.insert("user_id".into(), notification.user_id.clone());
    vars.insert(
        "notification_type".into(),
        notification.notification_type.as_str().to_string(),
    );

    let related = [
        ("order_id", &notification.related.order_id),
        ("merchant_id", &notification.related.merchant_id),
        ("listing_id", &notification.related.listing_id),
    ];
    for (key, value) in related {
        if let Some(value) = value {
            vars.insert(key.to_string(), value.clone());
        }
    }

    vars
}

/// Replace `{{name}}` placeholders (surrounding whitespace inside the braces
/// is ignored). Unknown variables render as the empty string; an unclosed
/// `{{` is copied through verbatim. `escape` is applied to substituted
/// values only, never to the template text.
pub fn substitute(template: &str, variables: &Variables, escape: fn(&str) -> String) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        match after_open.find("}}") {
            Some(end) => {
                let name = after_open[..end].trim();
                if let Some(value) = variables.get(name) {
                    out.push_str(&escape(value));
                }
                rest = &after_open[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// Escape a value for inclusion in HTML text or attribute content
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Identity escape for plain-text output
pub(crate) fn plain(value: &str) -> String {
    value.to_string()
}
