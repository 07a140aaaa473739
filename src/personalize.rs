//! Template Personalizer: flat `%scope.field%` substitution over a fixed
//! vocabulary, plus a link-aware pass that tags scheduling links with
//! campaign tracking parameters.
//!
//! Pure functions over per-recipient inputs; nothing here is shared between
//! dispatch workers.

use std::path::Path;

use linkify::LinkFinder;
use linkify::LinkKind;
use url::Url;

use crate::domain::Recipient;
use crate::domain::Sender;

/// Host (or subdomain thereof) of the booking links that receive tracking
/// parameters.
const SCHEDULING_HOST: &str = "calendly.com";

/// Fixed `utm_source` tag attached to every rewritten scheduling link.
const SOURCE_TAG: &str = "bulkmail";

/// Resolve every recognized `%scope.field%` token against the recipient and
/// sender, then tag scheduling links with the campaign correlation token.
/// Unknown tokens are left untouched; the template author may use literal
/// `%` characters unrelated to personalization.
pub fn render(
    template: &str,
    recipient: &Recipient,
    sender: &Sender,
    campaign_id: &str,
    template_name: &str,
) -> String {
    // no `%` anywhere means no tokens; skip the substitution pass entirely
    let personalized = if template.contains('%') {
        substitute(template, recipient, sender)
    } else {
        template.to_string()
    };

    rewrite_scheduling_links(&personalized, campaign_id, template_name)
}

fn substitute(
    template: &str,
    recipient: &Recipient,
    sender: &Sender,
) -> String {
    let full_name = recipient.full_name();
    let company = recipient.company.as_deref().unwrap_or("");

    let vocabulary: [(&str, &str); 9] = [
        ("%recipient.first%", &recipient.first_name),
        ("%recipient.last%", &recipient.last_name),
        ("%recipient.name%", &full_name),
        ("%recipient.company%", company),
        ("%recipient.email%", &recipient.email),
        ("%sender.name%", &sender.name),
        ("%sender.title%", &sender.title),
        ("%sender.email%", &sender.email),
        ("%sender.profile_picture%", &sender.profile_picture),
    ];

    let mut out = template.to_string();
    for (token, value) in vocabulary {
        if out.contains(token) {
            out = out.replace(token, value);
        }
    }
    out
}

/// Rewrite every scheduling/booking link in `body`, merging the three
/// tracking parameters into its query string. All other URLs, and all other
/// URL structure, are left alone.
fn rewrite_scheduling_links(
    body: &str,
    campaign_id: &str,
    template_name: &str,
) -> String {
    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]);

    let mut out = String::with_capacity(body.len());
    let mut cursor = 0;
    for link in finder.links(body) {
        if let Some(tagged) = tag_scheduling_link(link.as_str(), campaign_id, template_name) {
            out.push_str(&body[cursor..link.start()]);
            out.push_str(&tagged);
            cursor = link.end();
        }
    }
    out.push_str(&body[cursor..]);
    out
}

/// Returns the tagged form of `href` when it points at the scheduling host;
/// `None` for every other URL. Existing query parameters are preserved, the
/// three tracking keys are added or overwritten, and the query string is
/// re-encoded canonically.
fn tag_scheduling_link(
    href: &str,
    campaign_id: &str,
    template_name: &str,
) -> Option<String> {
    let parsed = Url::parse(href).ok()?;
    let host = parsed.host_str()?;
    if host != SCHEDULING_HOST && !host.ends_with(&format!(".{SCHEDULING_HOST}")) {
        return None;
    }

    // content tag is the template's base name, extension stripped
    let content_tag = Path::new(template_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(template_name);

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| {
            !matches!(key.as_ref(), "utm_source" | "utm_content" | "utm_campaign")
        })
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    params.push(("utm_source".to_string(), SOURCE_TAG.to_string()));
    params.push(("utm_content".to_string(), content_tag.to_string()));
    params.push(("utm_campaign".to_string(), campaign_id.to_string()));

    let mut tagged = parsed;
    {
        let mut query = tagged.query_pairs_mut();
        query.clear();
        query.extend_pairs(params);
    }
    Some(tagged.to_string())
}
