/// Cleans raw submission input into a deduplicated domain list. Each entry
/// may hold several comma- or whitespace-separated tokens; tokens are
/// lowercased and stripped of their scheme and path. Order of first
/// appearance is preserved.
pub fn normalize_domains(raw: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();

    for entry in raw {
        for token in entry.replace(',', " ").split_whitespace() {
            let mut domain = token.to_lowercase();
            if let Some(rest) = domain
                .strip_prefix("http://")
                .or_else(|| domain.strip_prefix("https://"))
            {
                domain = rest.to_string();
            }
            if let Some((host, _)) = domain.split_once('/') {
                domain = host.to_string();
            }
            if domain.is_empty() {
                continue;
            }
            if seen.insert(domain.clone()) {
                result.push(domain);
            }
        }
    }
    result
}
