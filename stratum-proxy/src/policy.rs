//! Policy facade (C9): ban list, per-IP rate limiting, login allowlisting.
//! The core engine depends only on the `Policy` trait; a permissive default
//! is provided for deployments with no backing policy store configured.

use std::net::IpAddr;

/// Decisions the listener (C4) and session handler (C5) consult before
/// admitting a connection or accepting a login.
pub trait Policy: Send + Sync {
    fn is_banned(&self, ip: IpAddr) -> bool;

    /// Called on every accepted TCP connection, before the session is
    /// spawned. Returning `false` drops the connection immediately.
    fn apply_limit_policy(&self, ip: IpAddr) -> bool;

    /// Called on `mining.authorize`. Returning `false` rejects the login.
    fn apply_login_policy(&self, login: &str, ip: IpAddr) -> bool;

    /// Called when a session sends malformed input (oversize line, bad
    /// JSON, unknown method repeated). Implementations may use this to
    /// build toward a ban.
    fn apply_malformed_policy(&self, ip: IpAddr);

    fn ban_client(&self, ip: IpAddr);
}

/// Default policy: admits everyone, bans no one. Matches the original
/// proxy's behavior when no policy backend is configured.
#[derive(Debug, Default)]
pub struct PermissivePolicy;

impl Policy for PermissivePolicy {
    fn is_banned(&self, _ip: IpAddr) -> bool {
        false
    }

    fn apply_limit_policy(&self, _ip: IpAddr) -> bool {
        true
    }

    fn apply_login_policy(&self, _login: &str, _ip: IpAddr) -> bool {
        true
    }

    fn apply_malformed_policy(&self, _ip: IpAddr) {}

    fn ban_client(&self, _ip: IpAddr) {}
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn permissive_policy_admits_everything() {
        let policy = PermissivePolicy;
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(!policy.is_banned(ip));
        assert!(policy.apply_limit_policy(ip));
        assert!(policy.apply_login_policy("0xabc123", ip));
    }
}
