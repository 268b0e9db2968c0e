//! Bucket key derivation.
//!
//! A bucket is one admission algorithm plus a [`KeyScope`] that decides
//! whose usage a request counts against. Scopes compose: [`SharedRoutes`]
//! wraps any other scope and pools its usage across every route the
//! bucket is attached to.

use std::fmt;

use pixels_core::{AccessError, Identity, PixelsResult};
use pixels_storage::{rate_limit_keys, RateLimitKeys};

/// What a scope can see about an incoming request.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    /// Stable route identifier, e.g. `set_pixel`.
    pub route: &'a str,
    /// Verified caller, if any.
    pub identity: Option<&'a Identity>,
}

impl<'a> RequestContext<'a> {
    pub fn new(route: &'a str, identity: Option<&'a Identity>) -> Self {
        Self { route, identity }
    }

    pub fn anonymous(route: &'a str) -> Self {
        Self {
            route,
            identity: None,
        }
    }
}

/// `{variant, scope, route}` identifying one sliding window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub variant: &'static str,
    pub scope: Option<String>,
    pub route: Option<String>,
}

impl BucketKey {
    /// Fast Store keys backing this bucket key.
    pub fn keys(&self) -> RateLimitKeys {
        rate_limit_keys(self.variant, self.scope.as_deref(), self.route.as_deref())
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.variant,
            self.scope.as_deref().unwrap_or("*"),
            self.route.as_deref().unwrap_or("*")
        )
    }
}

/// Key-derivation strategy for a bucket.
pub trait KeyScope: Send + Sync {
    /// Namespace for keys derived by this scope.
    fn variant(&self) -> &'static str;

    /// # Errors
    ///
    /// `Access` when the request lacks the identity this scope keys on.
    fn derive(&self, ctx: &RequestContext<'_>) -> PixelsResult<BucketKey>;
}

/// One window per caller per route.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerIdentity;

impl KeyScope for PerIdentity {
    fn variant(&self) -> &'static str {
        "user"
    }

    fn derive(&self, ctx: &RequestContext<'_>) -> PixelsResult<BucketKey> {
        let identity = ctx.identity.ok_or(AccessError::IdentityRequired)?;
        Ok(BucketKey {
            variant: self.variant(),
            scope: Some(identity.user_id.to_string()),
            route: Some(ctx.route.to_string()),
        })
    }
}

/// Per-caller windows for privileged callers only, in their own namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrivilegedIdentity;

impl KeyScope for PrivilegedIdentity {
    fn variant(&self) -> &'static str {
        "privileged"
    }

    fn derive(&self, ctx: &RequestContext<'_>) -> PixelsResult<BucketKey> {
        let identity = ctx.identity.ok_or(AccessError::IdentityRequired)?;
        if !identity.privileged {
            return Err(AccessError::PrivilegeRequired.into());
        }
        Ok(BucketKey {
            variant: self.variant(),
            scope: Some(identity.user_id.to_string()),
            route: Some(ctx.route.to_string()),
        })
    }
}

/// One window per route, shared by every caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct Global;

impl KeyScope for Global {
    fn variant(&self) -> &'static str {
        "global"
    }

    fn derive(&self, ctx: &RequestContext<'_>) -> PixelsResult<BucketKey> {
        Ok(BucketKey {
            variant: self.variant(),
            scope: None,
            route: Some(ctx.route.to_string()),
        })
    }
}

/// Wraps a scope and replaces the route with a pool name, so every route
/// the bucket guards draws from the same window.
#[derive(Debug, Clone)]
pub struct SharedRoutes<S> {
    pool: String,
    inner: S,
}

impl<S: KeyScope> SharedRoutes<S> {
    pub fn new(pool: impl Into<String>, inner: S) -> Self {
        Self {
            pool: pool.into(),
            inner,
        }
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }
}

impl<S: KeyScope> KeyScope for SharedRoutes<S> {
    fn variant(&self) -> &'static str {
        self.inner.variant()
    }

    fn derive(&self, ctx: &RequestContext<'_>) -> PixelsResult<BucketKey> {
        let mut key = self.inner.derive(ctx)?;
        key.route = Some(format!("pool:{}", self.pool));
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixels_core::PixelsError;

    #[test]
    fn test_per_identity_keys_on_user_and_route() {
        let caller = Identity::user(42);
        let key = PerIdentity
            .derive(&RequestContext::new("set_pixel", Some(&caller)))
            .unwrap();
        assert_eq!(key.to_string(), "user:42:set_pixel");
        assert_eq!(key.keys().entries, "ratelimit:user:42:set_pixel:entries");
    }

    #[test]
    fn test_per_identity_requires_identity() {
        let err = PerIdentity
            .derive(&RequestContext::anonymous("set_pixel"))
            .unwrap_err();
        assert_eq!(err, PixelsError::Access(AccessError::IdentityRequired));
    }

    #[test]
    fn test_privileged_requires_privilege() {
        let caller = Identity::user(7);
        let err = PrivilegedIdentity
            .derive(&RequestContext::new("mod", Some(&caller)))
            .unwrap_err();
        assert_eq!(err, PixelsError::Access(AccessError::PrivilegeRequired));

        let moderator = Identity::moderator(7);
        let key = PrivilegedIdentity
            .derive(&RequestContext::new("mod", Some(&moderator)))
            .unwrap();
        assert_eq!(key.variant, "privileged");
    }

    #[test]
    fn test_global_ignores_identity() {
        let a = Identity::user(1);
        let b = Identity::user(2);
        let ka = Global
            .derive(&RequestContext::new("get_size", Some(&a)))
            .unwrap();
        let kb = Global
            .derive(&RequestContext::new("get_size", Some(&b)))
            .unwrap();
        let anon = Global
            .derive(&RequestContext::anonymous("get_size"))
            .unwrap();
        assert_eq!(ka, kb);
        assert_eq!(ka, anon);
    }

    #[test]
    fn test_shared_routes_pool_route_component() {
        let scope = SharedRoutes::new("canvas-read", PerIdentity);
        let caller = Identity::user(5);
        let a = scope
            .derive(&RequestContext::new("get_pixels", Some(&caller)))
            .unwrap();
        let b = scope
            .derive(&RequestContext::new("get_pixel", Some(&caller)))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.route.as_deref(), Some("pool:canvas-read"));
        assert_eq!(scope.variant(), "user");
    }
}
