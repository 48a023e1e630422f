//! Rewrites applied to a rendered body before submission: UTM tagging of
//! site links and the mandatory opt-out block.

/// Campaign attribution appended to tracked links.
#[derive(Debug, Clone)]
pub struct UtmParams<'a> {
    pub source: &'a str,
    pub campaign: &'a str,
    pub content: String,
}

impl UtmParams<'_> {
    fn query(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("utm_source", self.source)
            .append_pair("utm_medium", "email")
            .append_pair("utm_campaign", self.campaign)
            .append_pair("utm_content", &self.content)
            .finish()
    }
}

/// Append UTM parameters to every `href="<link_prefix>..."` attribute.
pub fn add_utm_params(html: &str, link_prefix: &str, utm: &UtmParams<'_>) -> String {
    const ATTR: &str = "href=\"";
    if link_prefix.is_empty() {
        return html.to_string();
    }

    let query = utm.query();
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(pos) = rest.find(ATTR) {
        let value_start = pos + ATTR.len();
        out.push_str(&rest[..value_start]);
        rest = &rest[value_start..];

        let Some(end) = rest.find('"') else {
            break;
        };
        let link = &rest[..end];
        out.push_str(link);
        if link.starts_with(link_prefix) {
            out.push(if link.contains('?') { '&' } else { '?' });
            out.push_str(&query);
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

/// Insert the opt-out block before `</body>`, else `</html>`, else at the end.
pub fn inject_unsubscribe(html: &str, unsubscribe_url: &str) -> String {
    let block = format!(
        "<div style=\"text-align:center;padding:16px 32px;font-size:11px;color:#8c7568;\
         border-top:1px solid #d4c5b9\"><a href=\"{}\" style=\"color:#8c7568;\
         text-decoration:underline\">Unsubscribe</a> from future emails</div>",
        escape_attr(unsubscribe_url)
    );

    for marker in ["</body>", "</html>"] {
        if let Some(pos) = html.find(marker) {
            let mut out = String::with_capacity(html.len() + block.len());
            out.push_str(&html[..pos]);
            out.push_str(&block);
            out.push_str(&html[pos..]);
            return out;
        }
    }
    format!("{html}{block}")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}
