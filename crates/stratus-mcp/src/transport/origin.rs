//! Origin header validation.

/// Decides whether a request's `Origin` header is acceptable.
pub trait OriginPolicy: Send + Sync {
    fn allows(&self, origin: Option<&str>) -> bool;
}

/// Accepts every request, with or without an Origin header.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAnyOrigin;

impl OriginPolicy for AllowAnyOrigin {
    fn allows(&self, _origin: Option<&str>) -> bool {
        true
    }
}

/// Accepts only exact matches from a fixed list. Requests without an
/// Origin header are rejected.
#[derive(Debug, Clone, Default)]
pub struct AllowListOrigins {
    origins: Vec<String>,
}

impl AllowListOrigins {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            origins: origins
                .into_iter()
                .map(|o| o.into().trim_end_matches('/').to_string())
                .collect(),
        }
    }
}

impl OriginPolicy for AllowListOrigins {
    fn allows(&self, origin: Option<&str>) -> bool {
        origin
            .map(|o| o.trim_end_matches('/'))
            .is_some_and(|o| self.origins.iter().any(|allowed| allowed == o))
    }
}

/// Policy for a configured allow-list; an empty list allows everything.
pub fn policy_for(allowed: &[String]) -> Box<dyn OriginPolicy> {
    if allowed.is_empty() {
        Box::new(AllowAnyOrigin)
    } else {
        Box::new(AllowListOrigins::new(allowed.iter().cloned()))
    }
}
