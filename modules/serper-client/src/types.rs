use serde::{Deserialize, Serialize};

/// Request body for `POST /search`.
#[derive(Debug, Serialize)]
pub struct SearchRequest<'a> {
    pub q: &'a str,
    pub num: u32,
}

/// Top-level Serper response. Only organic results are consumed.
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub organic: Vec<OrganicResult>,
}

/// One organic result. Every field defaults: Serper omits snippets for some
/// result types, and a missing field must not fail the whole question.
#[derive(Debug, Clone, Deserialize)]
pub struct OrganicResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    /// Rank as reported by Serper. Consumers reassign their own 1-based
    /// rank, so this is informational only.
    #[serde(default)]
    pub position: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn organic_results_deserialize_with_missing_fields() {
        let json = r#"{
            "searchParameters": {"q": "acme", "num": 10},
            "organic": [
                {"title": "Acme", "link": "https://acme.com", "snippet": "About", "position": 1},
                {"link": "https://other.com"}
            ]
        }"#;

        let resp: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.organic.len(), 2);
        assert_eq!(resp.organic[0].position, Some(1));
        assert_eq!(resp.organic[1].title, "");
        assert_eq!(resp.organic[1].snippet, "");
        assert_eq!(resp.organic[1].position, None);
    }

    #[test]
    fn response_without_organic_is_empty() {
        let resp: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.organic.is_empty());
    }
}
