//! Email templating.
//!
//! - `{{variable}}` substitution over notification fields and metadata
//! - Per-type email templates (subject, HTML, text) with a generic fallback
//!
//! # Example
//!
//! ```ignore
//! let templates = EmailTemplates::default();
//! let email = templates.render(&notification);
//! assert_eq!(email.subject, "Order Placed Successfully");
//! ```

mod email;
mod substitution;

pub use email::{EmailTemplate, EmailTemplates, RenderedEmail};
pub use substitution::{escape_html, substitute, template_variables, Variables};
