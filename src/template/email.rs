use std::collections::HashMap;

use crate::notification::{Notification, NotificationType};

use super::substitution::{escape_html, plain, substitute, template_variables};

/// Subject, HTML and text bodies with `{{variable}}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTemplate {
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl EmailTemplate {
    pub fn new(
        subject: impl Into<String>,
        html: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            html: html.into(),
            text: text.into(),
        }
    }

    /// Used for every type without a dedicated template
    pub fn generic() -> Self {
        Self::new(
            "{{title}}",
            "<h2>{{title}}</h2>\n<p>{{body}}</p>",
            "{{title}}\n\n{{body}}",
        )
    }
}

/// A rendered email, ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// Registry of per-type email templates.
#[derive(Debug, Clone)]
pub struct EmailTemplates {
    templates: HashMap<NotificationType, EmailTemplate>,
    fallback: EmailTemplate,
}

impl EmailTemplates {
    /// Registry with only the generic template
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
            fallback: EmailTemplate::generic(),
        }
    }

    pub fn with_template(mut self, notification_type: NotificationType, template: EmailTemplate) -> Self {
        self.templates.insert(notification_type, template);
        self
    }

    pub fn template_for(&self, notification_type: NotificationType) -> &EmailTemplate {
        self.templates
            .get(&notification_type)
            .unwrap_or(&self.fallback)
    }

    pub fn render(&self, notification: &Notification) -> RenderedEmail {
        let template = self.template_for(notification.notification_type);
        let vars = template_variables(notification);

        let subject = substitute(&template.subject, &vars, plain);
        let content = substitute(&template.html, &vars, escape_html);

        RenderedEmail {
            html_body: wrap_html(&escape_html(&subject), &content),
            text_body: substitute(&template.text, &vars, plain),
            subject,
        }
    }
}

impl Default for EmailTemplates {
    fn default() -> Self {
        Self::empty()
            .with_template(
                NotificationType::OrderCreated,
                EmailTemplate::new(
                    "Order Placed Successfully - {{order_number}}",
                    "<h2>Thank you for your order!</h2>\n\
                     <p>{{body}}</p>\n\
                     <table>\n\
                     <tr><td>Order number</td><td><strong>{{order_number}}</strong></td></tr>\n\
                     <tr><td>Total</td><td><strong>{{total_amount}}</strong></td></tr>\n\
                     </table>\n\
                     <p>The merchant will contact you shortly.</p>",
                    "Thank you for your order!\n\n{{body}}\n\n\
                     Order number: {{order_number}}\nTotal: {{total_amount}}\n\n\
                     The merchant will contact you shortly.",
                ),
            )
            .with_template(
                NotificationType::OrderConfirmed,
                EmailTemplate::new(
                    "Order Confirmed - {{order_number}}",
                    "<h2>Your order is confirmed</h2>\n<p>{{body}}</p>",
                    "Your order is confirmed\n\n{{body}}",
                ),
            )
            .with_template(
                NotificationType::OrderCancelled,
                EmailTemplate::new(
                    "Order Cancelled - {{order_number}}",
                    "<h2>Your order was cancelled</h2>\n<p>{{body}}</p>\n\
                     <p>If you have questions, reply to this email.</p>",
                    "Your order was cancelled\n\n{{body}}\n\n\
                     If you have questions, reply to this email.",
                ),
            )
            .with_template(
                NotificationType::MerchantNewOrder,
                EmailTemplate::new(
                    "New Order Received - {{order_number}}",
                    "<h2>You have a new order</h2>\n\
                     <p>{{body}}</p>\n\
                     <p>Please contact the buyer to arrange fulfilment.</p>",
                    "You have a new order\n\n{{body}}\n\n\
                     Please contact the buyer to arrange fulfilment.",
                ),
            )
            .with_template(
                NotificationType::MerchantApproved,
                EmailTemplate::new(
                    "Your merchant account has been approved",
                    "<h2>Welcome aboard, {{merchant_name}}!</h2>\n<p>{{body}}</p>",
                    "Welcome aboard, {{merchant_name}}!\n\n{{body}}",
                ),
            )
            .with_template(
                NotificationType::MerchantSuspended,
                EmailTemplate::new(
                    "Your merchant account has been suspended",
                    "<h2>Account suspended</h2>\n<p>{{body}}</p>\n\
                     <p>Contact support to appeal this decision.</p>",
                    "Account suspended\n\n{{body}}\n\n\
                     Contact support to appeal this decision.",
                ),
            )
    }
}

fn wrap_html(title: &str, content: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n\
         <body style=\"font-family: sans-serif; line-height: 1.5;\">\n{}\n</body>\n</html>",
        title, content
    )
}
