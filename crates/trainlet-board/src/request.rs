//! Request and response value objects for backend forwarding
//!
//! Path rewriting is done with pure functions producing new values; the
//! incoming request is never mutated in place.

/// A request forwarded to a visualization backend
#[derive(Debug, Clone)]
pub struct BackendRequest {
    /// Backend-relative path, always starting with `/`
    pub path: String,
    /// Raw query string, without the leading `?`
    pub query: Option<String>,
    /// Request headers
    pub headers: Vec<(String, String)>,
}

impl BackendRequest {
    /// Request for a backend-relative path with no query or headers
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: None,
            headers: Vec::new(),
        }
    }
}

/// A response produced by a visualization backend
#[derive(Debug, Clone)]
pub struct BackendResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
}

impl BackendResponse {
    /// Successful response with a content type
    pub fn ok(content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body,
        }
    }

    /// Plain 404 response
    pub fn not_found() -> Self {
        Self {
            status: 404,
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: b"not found".to_vec(),
        }
    }
}

/// Rewrite the remainder left after stripping the job segment into a
/// backend-relative path. The router's wildcard yields the remainder
/// without its leading slash.
pub fn backend_path(rest: &str) -> String {
    format!("/{}", rest)
}

/// Location for the missing-trailing-slash redirect, preserving the query
/// string. The backend's relative links assume its root ends with `/`.
pub fn redirect_location(mount_base: &str, job_id: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{}/{}/?{}", mount_base, job_id, q),
        _ => format!("{}/{}/", mount_base, job_id),
    }
}

/// Mount prefix a backend is built against, so its internally generated
/// links resolve through the outer route
pub fn mount_prefix(mount_base: &str, job_id: &str) -> String {
    format!("{}/{}", mount_base, job_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_preserves_query() {
        assert_eq!(
            redirect_location("", "job123", Some("x=1")),
            "/job123/?x=1"
        );
    }

    #[test]
    fn test_redirect_without_query() {
        assert_eq!(redirect_location("", "job123", None), "/job123/");
        assert_eq!(redirect_location("", "job123", Some("")), "/job123/");
    }

    #[test]
    fn test_redirect_under_mount_base() {
        assert_eq!(
            redirect_location("/viz", "job123", Some("a=b")),
            "/viz/job123/?a=b"
        );
    }

    #[test]
    fn test_backend_path() {
        assert_eq!(backend_path(""), "/");
        assert_eq!(backend_path("scalars/loss"), "/scalars/loss");
    }

    #[test]
    fn test_mount_prefix() {
        assert_eq!(mount_prefix("", "job123"), "/job123");
        assert_eq!(mount_prefix("/viz", "job123"), "/viz/job123");
    }
}
