// ABOUTME: Table name search for SQL Explorer
// ABOUTME: Case-insensitive substring filter that keeps the original order

/// Names containing `search_term`, ignoring case. An empty term keeps everything.
pub fn filter_tables<S: AsRef<str>>(table_names: &[S], search_term: &str) -> Vec<String> {
    let needle = search_term.to_lowercase();
    let mut matches = Vec::new();
    for name in table_names {
        let name: &str = name.as_ref();
        if needle.is_empty() || name.to_lowercase().contains(&needle) {
            matches.push(name.to_string());
        }
    }
    matches
}
