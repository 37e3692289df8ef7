use serde_json::Value;
use url::Url;

/// Canonical form of a document URI as reported by any host.
///
/// Hosts disagree on encoding: VS Code sends `file:///c%3A/src/a.ts`, others
/// send `file:///C:/src/a.ts` or `file:/C:/src/a.ts`. All of them come out as
/// `file:///c:/src/a.ts`. Strings that do not parse as URLs are returned as is.
pub fn normalize_uri(uri: &str) -> String {
    let Ok(url) = Url::parse(uri) else {
        return uri.to_string();
    };
    let rendered = url.to_string();
    if url.scheme() != "file" {
        return rendered;
    }

    let Some(path_start) = rendered.find(":///").map(|i| i + 4) else {
        return rendered;
    };
    let (prefix, path) = rendered.split_at(path_start);
    format!("{prefix}{}", normalize_drive(path))
}

// "C%3A/x" | "C:/x" -> "c:/x"
fn normalize_drive(path: &str) -> String {
    let mut chars = path.chars();
    let Some(letter) = chars.next().filter(char::is_ascii_alphabetic) else {
        return path.to_string();
    };
    let rest = chars.as_str();
    for colon in ["%3A", "%3a", ":"] {
        if let Some(tail) = rest.strip_prefix(colon) {
            if tail.is_empty() || tail.starts_with('/') {
                return format!("{}:{tail}", letter.to_ascii_lowercase());
            }
        }
    }
    path.to_string()
}

/// Rewrites a string field of a JSON object in place.
pub fn normalize_uri_field(value: &mut Value, field: &str) {
    if let Some(Value::String(uri)) = value.get_mut(field) {
        *uri = normalize_uri(uri);
    }
}

/// Rewrites a string field of a nested JSON object in place.
pub fn normalize_nested_uri_field(value: &mut Value, parent: &str, field: &str) {
    if let Some(inner) = value.get_mut(parent) {
        normalize_uri_field(inner, field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn windows_drive_forms_converge() {
        let expected = "file:///c:/src/app.ts";
        assert_eq!(normalize_uri("file:///c%3A/src/app.ts"), expected);
        assert_eq!(normalize_uri("file:///C:/src/app.ts"), expected);
        assert_eq!(normalize_uri("file:/C:/src/app.ts"), expected);
    }

    #[test]
    fn unix_paths_pass_through() {
        assert_eq!(normalize_uri("file:///home/me/a.rs"), "file:///home/me/a.rs");
        assert_eq!(normalize_uri("file:///a/b"), "file:///a/b");
    }

    #[test]
    fn non_urls_are_untouched() {
        assert_eq!(normalize_uri("not a uri"), "not a uri");
        assert_eq!(normalize_uri("untitled:Untitled-1"), "untitled:Untitled-1");
    }

    #[test]
    fn field_helpers_only_touch_strings() {
        let mut value = json!({ "uri": "file:///C:/x", "editor": { "uri": "file:///D%3A/y" } });
        normalize_uri_field(&mut value, "uri");
        normalize_nested_uri_field(&mut value, "editor", "uri");
        assert_eq!(value, json!({ "uri": "file:///c:/x", "editor": { "uri": "file:///d:/y" } }));

        let mut missing = json!({ "uri": null });
        normalize_uri_field(&mut missing, "uri");
        assert_eq!(missing, json!({ "uri": null }));
    }
}
