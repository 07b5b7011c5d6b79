//! Per-request context: the request plus type-erased per-request state.
//!
//! Middleware that needs to hand the request to another component (the cache
//! engine takes ownership of it) splits the context with
//! [`Context::into_parts`] and rebuilds it for the next layer with
//! [`Context::from_parts`], so extensions inserted upstream survive.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use crate::Request;

/// Type-erased request extensions map.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value of the same type.
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

/// Per-request context handed through the middleware chain.
pub struct Context {
    request: Request,
    extensions: Extensions,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            extensions: Extensions::new(),
        }
    }

    pub fn from_parts(request: Request, extensions: Extensions) -> Self {
        Self {
            request,
            extensions,
        }
    }

    pub fn into_parts(self) -> (Request, Extensions) {
        (self.request, self.extensions)
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;

    #[derive(Debug, PartialEq)]
    struct Marker(u32);

    #[test]
    fn extensions_survive_split() {
        let mut ctx = Context::new(Request::new(Method::Get, "/"));
        ctx.extensions_mut().insert(Marker(7));

        let (request, extensions) = ctx.into_parts();
        let ctx = Context::from_parts(request, extensions);
        assert_eq!(ctx.extensions().get::<Marker>(), Some(&Marker(7)));
    }

    #[test]
    fn remove_returns_owned_value() {
        let mut ext = Extensions::new();
        ext.insert(Marker(1));
        assert_eq!(ext.remove::<Marker>(), Some(Marker(1)));
        assert!(ext.get::<Marker>().is_none());
    }
}
