//! A login page whose form the interceptor binds to.

use axum::response::Html;

/// Render the login page, posting to `login_path`.
pub fn render_login_page(login_path: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Log in</title></head>
<body>
<form class="oauth" action="{action}" method="post">
    <label>Username <input type="text" name="username" autocomplete="username"></label>
    <label>Password <input type="password" name="password" autocomplete="current-password"></label>
    <input type="submit" value="Log in">
</form>
</body>
</html>
"#,
        action = escape_attr(login_path)
    ))
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
