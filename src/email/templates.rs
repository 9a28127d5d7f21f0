use regex::Regex;
use std::sync::LazyLock;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("placeholder pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    /// Vars: `verification_url`.
    Verification,
    /// Vars: `password_set_url`.
    PasswordSet,
}

impl EmailTemplate {
    pub fn subject(&self) -> &'static str {
        match self {
            EmailTemplate::Verification => "Confirm your brainCHECK registration",
            EmailTemplate::PasswordSet => "Set your brainCHECK password",
        }
    }

    pub fn body(&self) -> &'static str {
        match self {
            EmailTemplate::Verification => VERIFICATION_HTML,
            EmailTemplate::PasswordSet => PASSWORD_SET_HTML,
        }
    }
}

/// Replace `{{name}}` placeholders with HTML-escaped values. Unknown names
/// render as an empty string.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures| {
            vars.iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| escape_html(value))
                .unwrap_or_default()
        })
        .into_owned()
}

fn escape_html(value: &str) -> String {
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

const VERIFICATION_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2>Confirm your registration</h2>
    <p>Thanks for signing up for brainCHECK. Confirm your email address to activate the account:</p>
    <p><a href="{{verification_url}}" style="display: inline-block; padding: 10px 20px; background: #0070f3; color: white; text-decoration: none; border-radius: 4px;">Confirm email</a></p>
    <p style="color: #666; font-size: 14px;">This link expires in 24 hours. If you didn't register, you can ignore it.</p>
</body>
</html>"#;

const PASSWORD_SET_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2>Set your password</h2>
    <p>A brainCHECK account has been prepared for you. Choose a password to activate it:</p>
    <p><a href="{{password_set_url}}" style="display: inline-block; padding: 10px 20px; background: #0070f3; color: white; text-decoration: none; border-radius: 4px;">Set password</a></p>
    <p style="color: #666; font-size: 14px;">This link expires in 24 hours and can be used once.</p>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_placeholders() {
        let out = render("Hi {{name}}, go to {{ url }}", &[("name", "Ana"), ("url", "http://x/y")]);
        assert_eq!(out, "Hi Ana, go to http://x/y");
    }

    #[test]
    fn unknown_placeholders_render_empty() {
        assert_eq!(render("[{{missing}}]", &[]), "[]");
    }

    #[test]
    fn values_are_escaped() {
        let out = render("{{v}}", &[("v", "<a href=\"x\">&'")]);
        assert_eq!(out, "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn templates_carry_their_links() {
        let url = "http://localhost:8000/verify?token=abc";
        let html = render(EmailTemplate::Verification.body(), &[("verification_url", url)]);
        assert!(html.contains(url));

        let html = render(EmailTemplate::PasswordSet.body(), &[("password_set_url", url)]);
        assert!(html.contains(url));
        assert!(!html.contains("{{"));
    }
}
