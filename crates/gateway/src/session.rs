use axum::http::HeaderMap;
use shared::domain::SubjectId;

/// How the token route learns which app session is asking. Identity is owned
/// by the fronting application; the gateway only needs the subject.
pub(crate) trait SessionAuth: Send + Sync {
    fn authenticated_subject(&self, headers: &HeaderMap) -> Option<SubjectId>;
}

/// Trusts the subject header the fronting app injects after validating the
/// browser session.
pub(crate) struct HeaderSessionAuth {
    header: String,
}

impl HeaderSessionAuth {
    pub(crate) fn new(header: String) -> Self {
        Self { header }
    }
}

impl SessionAuth for HeaderSessionAuth {
    fn authenticated_subject(&self, headers: &HeaderMap) -> Option<SubjectId> {
        let value = headers.get(self.header.as_str())?.to_str().ok()?.trim();
        if value.is_empty() {
            return None;
        }
        Some(SubjectId::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_the_configured_header() {
        let auth = HeaderSessionAuth::new("x-authenticated-subject".into());
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-authenticated-subject",
            HeaderValue::from_static("user-7"),
        );

        assert_eq!(
            auth.authenticated_subject(&headers),
            Some(SubjectId::from("user-7"))
        );
    }

    #[test]
    fn missing_or_blank_header_means_no_session() {
        let auth = HeaderSessionAuth::new("x-authenticated-subject".into());

        assert_eq!(auth.authenticated_subject(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert("x-authenticated-subject", HeaderValue::from_static("   "));
        assert_eq!(auth.authenticated_subject(&headers), None);
    }
}
