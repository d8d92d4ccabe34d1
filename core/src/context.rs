use crate::view::ViewId;
use crossbeam::channel::Sender;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

/// Values provided to a subtree, keyed by their type.
type Registry = HashMap<TypeId, Rc<dyn Any>>;

/// A view’s context.
///
/// Every node in the view tree has its own context. It carries the lateral values that ancestors
/// provided (see [`Provider`](crate::Provider)) and a handle to the host’s render queue, so view
/// states can ask to be rendered again.
///
/// Contexts are cheap to clone: the registry is shared and only copied when a subtree overrides
/// an entry.
#[derive(Clone)]
pub struct Context {
    id: ViewId,
    registry: Rc<Registry>,
    render_requests: Sender<ViewId>,
}

impl Context {
    pub(crate) fn root(id: ViewId, render_requests: Sender<ViewId>) -> Context {
        Context {
            id,
            registry: Rc::new(Registry::new()),
            render_requests,
        }
    }

    /// Returns the same context, addressed to another node.
    pub(crate) fn for_node(&self, id: ViewId) -> Context {
        Context {
            id,
            registry: Rc::clone(&self.registry),
            render_requests: self.render_requests.clone(),
        }
    }

    /// The node this context belongs to.
    pub fn id(&self) -> ViewId {
        self.id
    }

    /// Asks the host to render this node’s body again on its next tick.
    ///
    /// Requests are coalesced: asking several times before the host polls results in one render.
    pub fn request_render(&self) {
        trace!(view = ?self.id, "render requested");
        // the receiver only goes away with the host, at which point nothing renders anyway
        let _ = self.render_requests.send(self.id);
    }

    /// Returns the nearest value of type `T` provided by an ancestor.
    pub fn get<T: Any>(&self) -> Option<Rc<T>> {
        let value = self.registry.get(&TypeId::of::<T>())?;
        Rc::clone(value).downcast::<T>().ok()
    }

    /// Returns true if an ancestor provides a value of type `T`.
    pub fn provides<T: Any>(&self) -> bool {
        self.registry.contains_key(&TypeId::of::<T>())
    }

    /// Derives a context in which `value` shadows any `T` provided further up.
    pub fn with<T: Any>(&self, value: Rc<T>) -> Context {
        let mut registry = (*self.registry).clone();
        registry.insert(TypeId::of::<T>(), value);
        Context {
            id: self.id,
            registry: Rc::new(registry),
            render_requests: self.render_requests.clone(),
        }
    }

    /// Returns true if both contexts provide the very same values.
    ///
    /// Values are compared by identity, not by equality.
    pub fn same_dependencies(&self, other: &Context) -> bool {
        if Rc::ptr_eq(&self.registry, &other.registry) {
            return true;
        }
        self.registry.len() == other.registry.len()
            && self.registry.iter().all(|(key, value)| {
                other
                    .registry
                    .get(key)
                    .map_or(false, |other| same_value(value, other))
            })
    }
}

fn same_value(a: &Rc<dyn Any>, b: &Rc<dyn Any>) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("provided", &self.registry.len())
            .finish()
    }
}
