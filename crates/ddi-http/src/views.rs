//! HTML for the web UI: a page with the offer and presentation forms and the credential list.
use askama_escape::{escape, Html};
use ddi_core::credential::{CredentialListing, CredentialView};

pub const PAGE_TITLE: &str = "Decentralized Digital Identity Demo";
/// Element swapped by the htmx forms.
pub const CREDENTIALS_ELEMENT_ID: &str = "credentials";

const HTMX_SRC: &str = "https://unpkg.com/htmx.org@2.0.3";
const DAISYUI_HREF: &str = "https://cdn.jsdelivr.net/npm/daisyui@4.12.14/dist/full.min.css";
const TAILWIND_SRC: &str = "https://cdn.tailwindcss.com";

fn html_escape(s: &str) -> String {
    escape(s, Html).to_string()
}

pub fn layout(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>{PAGE_TITLE}</title>
    <link href="{DAISYUI_HREF}" rel="stylesheet" type="text/css" />
    <script src="{TAILWIND_SRC}"></script>
    <script src="{HTMX_SRC}"></script>
  </head>
  <body>{body}</body>
</html>"#
    )
}

/// Full page, headed by the agent label.
pub fn app(label: &str, listing: &CredentialListing) -> String {
    layout(&format!(
        r#"<div class="container mx-auto p-10"><h1 class="text-3xl font-bold">{PAGE_TITLE}</h1><p class="text-lg opacity-70">{}</p>{}</div>"#,
        html_escape(label),
        credential_list(listing)
    ))
}

fn form(action: &str, field: &str, placeholder: &str, label: &str) -> String {
    format!(
        r##"<form class="w-full" hx-post="{action}" hx-target="#{CREDENTIALS_ELEMENT_ID}" hx-swap="outerHTML"><input class="input input-bordered w-full max-w-md mr-4" type="text" name="{field}" placeholder="{placeholder}" required /><button type="submit" class="btn btn-primary">{label}</button></form>"##
    )
}

fn credential_card(view: &CredentialView) -> String {
    let claims = serde_json::to_string_pretty(&view.claims).unwrap_or_default();
    format!(
        r#"<div class="card bg-base-200 w-full shadow-xl"><div class="card-body"><h2 class="card-title">{}</h2><div class="flex flex-row justify-between"><div>{}</div><div>{}</div></div><pre>{}</pre><pre class="whitespace-pre-wrap break-words">{}</pre></div></div>"#,
        html_escape(&view.type_),
        html_escape(&view.id),
        html_escape(&view.created_at),
        html_escape(&claims),
        html_escape(&view.sd_jwt),
    )
}

/// The fragment returned by the form endpoints, replacing the element with the same id.
pub fn credential_list(listing: &CredentialListing) -> String {
    let cards: String = listing.views.iter().map(credential_card).collect();
    let failures: String = listing
        .failures
        .iter()
        .map(|failure| {
            format!(
                r#"<div class="alert alert-warning">Credential {} could not be decoded: {}</div>"#,
                html_escape(&failure.id),
                html_escape(&failure.error.to_string())
            )
        })
        .collect();
    format!(
        r#"<div id="{CREDENTIALS_ELEMENT_ID}" class="flex flex-col gap-10 py-10"><div>{}{}</div><div class="flex flex-col gap-4">{cards}{failures}</div></div>"#,
        form("/receive-credential", "offerLink", "Offer Link", "Receive Credential"),
        form(
            "/present-credential",
            "presentationLink",
            "Presentation Link",
            "Present Credential"
        ),
    )
}
