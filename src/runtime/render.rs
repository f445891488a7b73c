/// Template rendering and tracking injection
///
/// Subjects and bodies are Handlebars templates over the lead's fields; links are
/// rewritten to the click redirect and an open pixel is appended before the body closes.

use crate::store::Lead;
use handlebars::Handlebars;
use reqwest::Url;
use serde_json::{json, Map, Value};

/// Render an HTML body; lead values are HTML-escaped
pub fn render_html(template: &str, lead: &Lead) -> String {
    render_with(&Handlebars::new(), template, lead)
}

/// Render a plain-text template such as a subject line
pub fn render_text(template: &str, lead: &Lead) -> String {
    let mut hbs = Handlebars::new();
    hbs.register_escape_fn(handlebars::no_escape);
    render_with(&hbs, template, lead)
}

fn render_with(hbs: &Handlebars<'_>, template: &str, lead: &Lead) -> String {
    match hbs.render_template(template, &lead_context(lead)) {
        Ok(rendered) => rendered,
        Err(e) => {
            tracing::warn!(lead_id = %lead.id, error = %e, "Template render error, sending it unrendered");
            template.to_string()
        }
    }
}

/// Template data for a lead: custom fields at the top level, built-in fields on top
fn lead_context(lead: &Lead) -> Value {
    let mut data = match &lead.custom_fields.0 {
        Value::Object(fields) => fields.clone(),
        _ => Map::new(),
    };

    let name = if lead.first_name.is_empty() {
        lead.full_name()
    } else {
        lead.first_name.clone()
    };
    let builtins = json!({
        "name": name,
        "first_name": lead.first_name,
        "firstName": lead.first_name,
        "last_name": lead.last_name,
        "lastName": lead.last_name,
        "full_name": lead.full_name(),
        "fullName": lead.full_name(),
        "email": lead.email,
        "company": lead.company,
    });
    if let Value::Object(builtins) = builtins {
        data.extend(builtins);
    }
    Value::Object(data)
}

/// Open pixel URL for a tracking id
pub fn open_pixel_url(base_url: &str, tracking_id: &str) -> String {
    format!("{}/track/open/{}", base_url.trim_end_matches('/'), tracking_id)
}

/// Click redirect URL wrapping `target`
pub fn click_url(base_url: &str, tracking_id: &str, target: &str) -> String {
    let base = format!("{}/track/click/{}", base_url.trim_end_matches('/'), tracking_id);
    match Url::parse_with_params(&base, &[("url", target)]) {
        Ok(url) => url.to_string(),
        Err(_) => base,
    }
}

/// Rewrite absolute `href` links through the click redirect and append the open pixel
pub fn inject_tracking(html: &str, base_url: &str, tracking_id: &str) -> String {
    const HREF: &str = "href=\"";

    let mut out = String::with_capacity(html.len() + 128);
    let mut rest = html;

    while let Some(pos) = rest.find(HREF) {
        let value_start = pos + HREF.len();
        out.push_str(&rest[..value_start]);
        let after = &rest[value_start..];
        match after.find('"') {
            Some(end) => {
                let target = &after[..end];
                if target.starts_with("http://") || target.starts_with("https://") {
                    out.push_str(&click_url(base_url, tracking_id, target));
                } else {
                    out.push_str(target);
                }
                rest = &after[end..];
            }
            None => {
                rest = after;
                break;
            }
        }
    }
    out.push_str(rest);

    let pixel = format!(
        "<img src=\"{}\" width=\"1\" height=\"1\" alt=\"\" style=\"display:none\" />",
        open_pixel_url(base_url, tracking_id)
    );
    match out.rfind("</body>") {
        Some(idx) => out.insert_str(idx, &pixel),
        None => out.push_str(&pixel),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::types::Json;

    fn lead() -> Lead {
        Lead {
            id: "l1".into(),
            email: "ada@example.com".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            company: "Engines Ltd".into(),
            custom_fields: Json(json!({"role": "CTO", "seats": 12})),
            is_bounced: false,
            is_unsubscribed: false,
            is_do_not_contact: false,
        }
    }

    #[test]
    fn renders_builtin_and_custom_fields() {
        let out = render_text("Hi {{name}} at {{ company }}, {{role}} of {{seats}}{{missing}}!", &lead());
        assert_eq!(out, "Hi Ada at Engines Ltd, CTO of 12!");
    }

    #[test]
    fn builtin_fields_shadow_custom_fields() {
        let mut lead = lead();
        lead.custom_fields = Json(json!({"email": "spoofed@example.com", "plan": "pro"}));
        assert_eq!(render_text("{{email}} on {{plan}}", &lead), "ada@example.com on pro");
    }

    #[test]
    fn html_bodies_escape_lead_values_but_subjects_do_not() {
        let mut lead = lead();
        lead.company = "Babbage & <Sons>".into();
        assert_eq!(render_text("{{company}}", &lead), "Babbage & <Sons>");
        assert_eq!(render_html("<p>{{company}}</p>", &lead), "<p>Babbage &amp; &lt;Sons&gt;</p>");
    }

    #[test]
    fn unterminated_placeholder_is_left_alone() {
        assert_eq!(render_text("Hi {{name", &lead()), "Hi {{name");
    }

    #[test]
    fn links_are_wrapped_and_pixel_lands_before_body_close() {
        let html = r#"<body><a href="https://docs.example/a?b=c">docs</a><a href="mailto:x@y">m</a></body>"#;
        let out = inject_tracking(html, "http://t.example/", "tk");

        assert!(out.contains("href=\"http://t.example/track/click/tk?url=https%3A%2F%2Fdocs.example%2Fa%3Fb%3Dc\""));
        assert!(out.contains("href=\"mailto:x@y\""));
        assert!(out.ends_with("style=\"display:none\" /></body>"));
        assert!(out.contains("http://t.example/track/open/tk"));
    }

    #[test]
    fn pixel_is_appended_without_body_tag() {
        let out = inject_tracking("<p>plain</p>", "http://t.example", "tk");
        assert!(out.starts_with("<p>plain</p><img src=\"http://t.example/track/open/tk\""));
    }
}
