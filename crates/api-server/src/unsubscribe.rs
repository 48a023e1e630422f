//! Public one-click unsubscribe page. No auth beyond the link's token.

use axum::extract::{Query, State};
use axum::response::Html;
use drip_engine::UnsubscribeOutcome;
use serde::Deserialize;
use tracing::error;
use utoipa::IntoParams;

use crate::rest::AppState;

const INVALID_TITLE: &str = "Invalid Link";
const REPLY_HINT: &str =
    "If you'd like to unsubscribe, reply to any email from us with 'unsubscribe'.";

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UnsubscribeQuery {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub token: String,
}

/// GET /unsubscribe?email=..&token=..
#[utoipa::path(
    get,
    path = "/unsubscribe",
    tag = "Unsubscribe",
    params(UnsubscribeQuery),
    responses((status = 200, description = "HTML confirmation or generic invalid-link page", content_type = "text/html"))
)]
pub async fn unsubscribe_page(
    State(state): State<AppState>,
    Query(query): Query<UnsubscribeQuery>,
) -> Html<String> {
    let outcome = match state
        .engine
        .unsubscribe_with_token(&query.email, &query.token)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(error = %err, "Unsubscribe failed");
            return Html(render_page(
                "Something Went Wrong",
                &format!("We couldn't process this request right now. {REPLY_HINT}"),
                false,
            ));
        }
    };

    let email = escape_html(query.email.trim());
    let page = match outcome {
        UnsubscribeOutcome::MissingInput => render_page(
            INVALID_TITLE,
            &format!("This unsubscribe link is missing required information. {REPLY_HINT}"),
            false,
        ),
        UnsubscribeOutcome::InvalidToken => render_page(
            INVALID_TITLE,
            &format!("This unsubscribe link is invalid or expired. {REPLY_HINT}"),
            false,
        ),
        UnsubscribeOutcome::Removed(_) => render_page(
            "You've Been Unsubscribed",
            &format!(
                "We've removed <strong>{email}</strong> from all active email sequences. \
                 You won't receive any more marketing emails from us."
            ),
            true,
        ),
        UnsubscribeOutcome::AlreadyRemoved => render_page(
            "Already Unsubscribed",
            &format!(
                "<strong>{email}</strong> has no active email subscriptions. \
                 You're not receiving marketing emails from us."
            ),
            true,
        ),
    };
    Html(page)
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

fn render_page(title: &str, message: &str, success: bool) -> String {
    let color = if success { "#1A8A82" } else { "#c0392b" };
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{title}</title>
  <style>
    body {{ font-family: Georgia, serif; background: #f8f3ec; margin: 0; padding: 40px 20px; color: #3a2e25; }}
    .container {{ max-width: 500px; margin: 0 auto; background: #fff; border: 2px solid #d4c5b9; }}
    .body {{ padding: 32px; line-height: 1.7; font-size: 16px; }}
    .body h2 {{ color: {color}; font-size: 18px; margin: 0 0 16px; }}
  </style>
</head>
<body>
  <div class="container">
    <div class="body">
      <h2>{title}</h2>
      <p>{message}</p>
    </div>
  </div>
</body>
</html>"#
    )
}
