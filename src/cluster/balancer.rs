//! Balancer: a named group of nodes sharing one load-balancing policy.

/// Sticky-session and retry policy shared by all nodes that reference the
/// balancer by name.
///
/// A balancer exists only while at least one registered node references it;
/// the container installs it on the first such node and drops it with the
/// last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balancer {
    name: String,
    sticky_session: bool,
    sticky_session_cookie: String,
    sticky_session_path: String,
    sticky_session_force: bool,
    sticky_session_remove: bool,
    max_attempts: u32,
}

impl Balancer {
    pub fn builder(name: impl Into<String>) -> BalancerBuilder {
        BalancerBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether requests carrying a session id stick to the session's node.
    pub fn is_sticky_session(&self) -> bool {
        self.sticky_session
    }

    /// Cookie name carrying the session id (default `JSESSIONID`).
    pub fn sticky_session_cookie(&self) -> &str {
        &self.sticky_session_cookie
    }

    /// Matrix path parameter carrying the session id (default `jsessionid`).
    pub fn sticky_session_path(&self) -> &str {
        &self.sticky_session_path
    }

    /// When true, a request whose sticky node is unreachable fails instead
    /// of migrating to another node.
    pub fn is_sticky_session_force(&self) -> bool {
        self.sticky_session_force
    }

    /// Informational: whether the worker asked for the session cookie to be
    /// removed on failover.
    pub fn is_sticky_session_remove(&self) -> bool {
        self.sticky_session_remove
    }

    /// How often the forwarder may retry against another node.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Builder for [`Balancer`], defaults matching the mod_cluster protocol.
#[derive(Debug, Clone)]
pub struct BalancerBuilder {
    name: String,
    sticky_session: bool,
    sticky_session_cookie: String,
    sticky_session_path: String,
    sticky_session_force: bool,
    sticky_session_remove: bool,
    max_attempts: u32,
}

impl BalancerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sticky_session: true,
            sticky_session_cookie: "JSESSIONID".to_string(),
            sticky_session_path: "jsessionid".to_string(),
            sticky_session_force: false,
            sticky_session_remove: false,
            max_attempts: 1,
        }
    }

    pub fn sticky_session(mut self, sticky: bool) -> Self {
        self.sticky_session = sticky;
        self
    }

    pub fn sticky_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.sticky_session_cookie = cookie.into();
        self
    }

    pub fn sticky_session_path(mut self, path: impl Into<String>) -> Self {
        self.sticky_session_path = path.into();
        self
    }

    pub fn sticky_session_force(mut self, force: bool) -> Self {
        self.sticky_session_force = force;
        self
    }

    pub fn sticky_session_remove(mut self, remove: bool) -> Self {
        self.sticky_session_remove = remove;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn build(self) -> Balancer {
        Balancer {
            name: self.name,
            sticky_session: self.sticky_session,
            sticky_session_cookie: self.sticky_session_cookie,
            sticky_session_path: self.sticky_session_path,
            sticky_session_force: self.sticky_session_force,
            sticky_session_remove: self.sticky_session_remove,
            max_attempts: self.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let balancer = Balancer::builder("web").build();

        assert_eq!(balancer.name(), "web");
        assert!(balancer.is_sticky_session());
        assert_eq!(balancer.sticky_session_cookie(), "JSESSIONID");
        assert_eq!(balancer.sticky_session_path(), "jsessionid");
        assert!(!balancer.is_sticky_session_force());
        assert_eq!(balancer.max_attempts(), 1);
    }

    #[test]
    fn test_builder_overrides() {
        let balancer = Balancer::builder("api")
            .sticky_session(false)
            .sticky_session_cookie("SESSION")
            .sticky_session_path("session")
            .sticky_session_force(true)
            .max_attempts(3)
            .build();

        assert!(!balancer.is_sticky_session());
        assert_eq!(balancer.sticky_session_cookie(), "SESSION");
        assert_eq!(balancer.sticky_session_path(), "session");
        assert!(balancer.is_sticky_session_force());
        assert_eq!(balancer.max_attempts(), 3);
    }

    #[test]
    fn test_max_attempts_floor() {
        let balancer = Balancer::builder("web").max_attempts(0).build();
        assert_eq!(balancer.max_attempts(), 1);
    }
}
