//! Server-rendered HTML pages.
//!
//! Every page is a plain string wrapped in [`layout`]. User-supplied text is
//! passed through [`html_escape`] before interpolation.

use crate::{config::AccessConfig, models::object::StoredObject};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters left as-is in a single URL path segment (RFC 3986 unreserved).
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0; background: #f6f7f9; color: #222; }
.container { max-width: 880px; margin: 2rem auto; padding: 1.5rem; background: #fff; border-radius: 8px; }
.error-message { background: #fff4f4; border-left: 4px solid #d33; padding: .5rem 1rem; }
.auth-notice { color: #555; }
.auth-notice.error { color: #d33; }
.files-table { width: 100%; border-collapse: collapse; margin-top: 1rem; }
.files-table th, .files-table td { border-bottom: 1px solid #ddd; padding: .4rem; text-align: left; }
.back-link, .files-link { display: inline-block; margin-right: 1rem; }
.form-group { margin-bottom: 1rem; }
"#;

pub fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

pub fn encode_path_segment(name: &str) -> String {
    utf8_percent_encode(name, PATH_SEGMENT).to_string()
}

/// Wrap `body` in the shared document shell.
pub fn layout(body: &str) -> String {
    format!(
        concat!(
            "<!DOCTYPE html>",
            r#"<html lang="ja"><head>"#,
            r#"<meta charset="UTF-8">"#,
            r#"<meta name="viewport" content="width=device-width, initial-scale=1">"#,
            "<title>pocket-cdn</title>",
            "<style>{}</style>",
            "</head><body>{}</body></html>"
        ),
        STYLE, body
    )
}

/// The multipart upload form. `link_name` binds the form to an upload link.
fn upload_form(link_name: Option<&str>) -> String {
    let hidden = link_name
        .map(|name| {
            format!(
                r#"<input type="hidden" name="name" value="{}">"#,
                html_escape(name)
            )
        })
        .unwrap_or_default();
    let key_field = if link_name.is_some() {
        String::new()
    } else {
        concat!(
            r#"<div class="form-group"><label for="api-key">API Key (if required):</label> "#,
            r#"<input id="api-key" type="password" name="key" placeholder="Enter API key (optional)"></div>"#
        )
        .to_string()
    };

    format!(
        concat!(
            r#"<form id="form" method="post" action="/upload" enctype="multipart/form-data">"#,
            "{}{}",
            r#"<div class="form-group"><input id="file-upload" type="file" name="file" required></div>"#,
            r#"<button type="submit">Upload</button>"#,
            "</form>"
        ),
        hidden, key_field
    )
}

pub fn landing_page(access: &AccessConfig) -> String {
    let mut body = String::from(r#"<div class="container"><h1>pocket-cdn</h1><p>個人的で簡易なCDN</p>"#);
    body.push_str(&upload_form(None));

    if !access.restrict_listing {
        body.push_str(r#"<a href="/files" class="files-link">View Uploaded Files</a>"#);
    } else if access.api_key.is_some() {
        body.push_str(concat!(
            r#"<p class="auth-notice">ファイル一覧の表示にはAPI認証が必要です。<br>"#,
            "<code>/files?key=YOUR_API_KEY</code> でアクセスしてください。</p>"
        ));
    } else {
        body.push_str(concat!(
            r#"<p class="auth-notice error">サーバー設定エラー: "#,
            "ファイル一覧保護が有効ですが、API_KEYが設定されていません。</p>"
        ));
    }

    body.push_str("</div>");
    layout(&body)
}

pub fn upload_link_page(name: &str) -> String {
    layout(&format!(
        concat!(
            r#"<div class="container"><h1>Upload to {}</h1>"#,
            "<p>このリンクは有効期限内であれば何度でも使用できます。</p>",
            "{}",
            r#"<a href="/" class="back-link">Back to Home</a></div>"#
        ),
        html_escape(name),
        upload_form(Some(name))
    ))
}

pub fn file_list_page(objects: &[StoredObject]) -> String {
    let mut rows = String::new();
    for obj in objects {
        let link = encode_path_segment(obj.logical_name());
        rows.push_str(&format!(
            concat!(
                "<tr><td>{}</td><td>{:.2} KB</td><td>{}</td><td>{}</td>",
                r#"<td><a href="/files/{}" target="_blank">Link</a></td></tr>"#
            ),
            html_escape(&obj.key),
            obj.size_bytes as f64 / 1024.0,
            html_escape(obj.content_type.as_deref().unwrap_or("unknown")),
            html_escape(obj.content_encoding.as_deref().unwrap_or("-")),
            link
        ));
    }

    layout(&format!(
        concat!(
            r#"<div class="container"><h1>Uploaded Files</h1>"#,
            r#"<a href="/" class="back-link">Back to Upload</a>"#,
            r#"<table class="files-table"><thead><tr>"#,
            "<th>File Name</th><th>Size</th><th>Type</th><th>Encoding</th><th>Link</th>",
            "</tr></thead><tbody>{}</tbody></table></div>"
        ),
        rows
    ))
}

fn error_page(title: &str, paragraphs: &[&str], extra: &str, links: &str) -> String {
    let text: String = paragraphs.iter().map(|p| format!("<p>{}</p>", p)).collect();
    layout(&format!(
        concat!(
            r#"<div class="container"><h1>{}</h1>"#,
            r#"<div class="error-message">{}{}</div>"#,
            r#"<div class="error-actions">{}</div></div>"#
        ),
        title, text, extra, links
    ))
}

const HOME_LINK: &str = r#"<a href="/" class="back-link">Back to Home</a>"#;

pub fn not_found_page() -> String {
    error_page(
        "Page Not Found",
        &["お探しのページが見つかりません。", "URLが正しいか確認してください。"],
        "",
        HOME_LINK,
    )
}

pub fn file_not_found_page(file_name: &str) -> String {
    let first = format!(
        "指定されたファイル <code>{}</code> が見つかりません。",
        html_escape(file_name)
    );
    error_page(
        "File Not Found",
        &[first.as_str(), "ファイル名が正しいか確認してください。"],
        "",
        concat!(
            r#"<a href="/files" class="back-link">View All Files</a>"#,
            r#"<a href="/" class="back-link">Back to Home</a>"#
        ),
    )
}

pub fn auth_required_page() -> String {
    error_page(
        "Authentication Required",
        &[
            "このページにアクセスするにはAPI認証が必要です。",
            "正しいAPIキーを指定してアクセスしてください。",
        ],
        concat!(
            r#"<div class="usage-example"><p><strong>アクセス方法:</strong></p>"#,
            "<code>/files?key=YOUR_API_KEY</code></div>"
        ),
        HOME_LINK,
    )
}

pub fn misconfigured_page() -> String {
    error_page(
        "Server Configuration Error",
        &[
            "サーバー設定エラーが発生しました。",
            "ファイル一覧保護が有効ですが、API_KEYが設定されていません。",
            "管理者にお問い合わせください。",
        ],
        "",
        HOME_LINK,
    )
}

pub fn internal_error_page() -> String {
    error_page(
        "Internal Server Error",
        &[
            "サーバー内部でエラーが発生しました。",
            "しばらく時間をおいてから再度お試しください。",
        ],
        "",
        HOME_LINK,
    )
}
