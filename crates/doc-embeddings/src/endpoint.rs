/// Selects the default inference sidecar endpoint. macOS/arm64 hosts run the
/// sidecar natively on the loopback interface; everywhere else it runs in a
/// sibling container reachable by service name (§6.5 collaborator contract).
pub fn default_sidecar_endpoint() -> String {
    if let Ok(value) = std::env::var("DOC_ENGINE_SIDECAR_URL") {
        if !value.trim().is_empty() {
            return value;
        }
    }

    if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
        "http://127.0.0.1:11434".to_string()
    } else {
        "http://inference-sidecar:11434".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_takes_precedence() {
        std::env::set_var("DOC_ENGINE_SIDECAR_URL", "http://example:9999");
        assert_eq!(default_sidecar_endpoint(), "http://example:9999");
        std::env::remove_var("DOC_ENGINE_SIDECAR_URL");
    }
}
