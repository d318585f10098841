use std::{
  collections::HashMap,
  fmt,
  sync::Arc,
};

use arc_swap::ArcSwap;
use the_msgpack::Value;

use crate::{
  Handler,
  HandlerError,
};

pub type SharedHandler<Ctx> = Arc<dyn Handler<Ctx>>;

type HandlerMap<Ctx> = HashMap<String, SharedHandler<Ctx>>;

/// Sub-command name to handler bindings.
///
/// Bindings live in an immutable map behind an [`ArcSwap`]. Registering
/// builds a new map and swaps the pointer, so a lookup never waits on a
/// writer and never observes a half-installed handler. Clones share the same
/// bindings.
pub struct HandlerRegistry<Ctx> {
  handlers: Arc<ArcSwap<HandlerMap<Ctx>>>,
}

impl<Ctx> HandlerRegistry<Ctx> {
  pub fn new() -> Self {
    Self {
      handlers: Arc::new(ArcSwap::from_pointee(HashMap::new())),
    }
  }

  /// Binds `handler` to `name`, replacing any earlier binding.
  pub fn register<H>(&self, name: impl Into<String>, handler: H)
  where
    H: Handler<Ctx> + 'static,
  {
    self.register_shared(name, Arc::new(handler));
  }

  pub fn register_fn<F>(&self, name: impl Into<String>, handler: F)
  where
    F: Fn(&mut Ctx, &[Value]) -> Result<(), HandlerError> + Send + Sync + 'static,
  {
    self.register(name, handler);
  }

  pub fn register_shared(&self, name: impl Into<String>, handler: SharedHandler<Ctx>) {
    let name = name.into();
    self.handlers.rcu(|current| {
      let mut next = (**current).clone();
      next.insert(name.clone(), handler.clone());
      next
    });
  }

  pub fn unregister(&self, name: &str) -> Option<SharedHandler<Ctx>> {
    let mut removed = None;
    self.handlers.rcu(|current| {
      let mut next = (**current).clone();
      removed = next.remove(name);
      next
    });
    removed
  }

  /// The handler currently bound to `name`, if any.
  pub fn lookup(&self, name: &str) -> Option<SharedHandler<Ctx>> {
    self.handlers.load().get(name).cloned()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.handlers.load().contains_key(name)
  }

  pub fn len(&self) -> usize {
    self.handlers.load().len()
  }

  pub fn is_empty(&self) -> bool {
    self.handlers.load().is_empty()
  }

  /// Registered names, sorted.
  pub fn names(&self) -> Vec<String> {
    let mut names: Vec<_> = self.handlers.load().keys().cloned().collect();
    names.sort_unstable();
    names
  }
}

impl<Ctx> Default for HandlerRegistry<Ctx> {
  fn default() -> Self {
    Self::new()
  }
}

impl<Ctx> Clone for HandlerRegistry<Ctx> {
  fn clone(&self) -> Self {
    Self {
      handlers: self.handlers.clone(),
    }
  }
}

impl<Ctx> fmt::Debug for HandlerRegistry<Ctx> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("HandlerRegistry")
      .field("names", &self.names())
      .finish()
  }
}
