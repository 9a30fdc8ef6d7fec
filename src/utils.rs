use once_cell::sync::Lazy;

pub static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime")
});

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_url;

    #[test]
    fn adds_scheme_and_strips_trailing_slash() {
        assert_eq!(normalize_url(" market.example/ "), "https://market.example");
        assert_eq!(normalize_url("http://localhost:5000"), "http://localhost:5000");
        assert_eq!(normalize_url("   "), "");
    }
}
