use crate::context::Context;
use core::any::Any;
use core::fmt;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

/// A unique identifier for a view.
///
/// (this is just a UUID)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId(u32, u16, u16, [u8; 8]);

impl ViewId {
    pub(crate) fn new() -> ViewId {
        let uuid = Uuid::new_v4();
        let (a, b, c, d) = uuid.as_fields();
        ViewId(a, b, c, *d)
    }
}

/// Implements the `View` trait for a given struct.
///
/// Assumes that `PartialEq` is implemented. `Eq` would be preferred to avoid frequent updates.
///
/// Syntax:
///
/// ```text
/// impl_view! {
///     StructName;
///     fn new_state(&self, context) { // optional
///         ... -> Box<dyn State>
///     }
///     fn body(&self, state_variable: &StateType, context_variable: &Context) {
///         ... -> Arc<dyn View>
///     }
///     (put extra items like key() here, using normal rust syntax)
/// }
/// ```
#[macro_export]
macro_rules! impl_view {
    (
        $(#[$attr:meta])*
        $struct:ty;
        $(fn new_state(&$ns_self:ident, $ns_ctx:ident) $new_state:block)?
        fn body(&$self:ident, $state_var:ident: &$state_type:ty, $ctx_var:ident: &Context) $body:block
        $($extra:tt)*
    ) => {
        $(#[$attr])*
        impl $crate::View for $struct {
            fn as_any(&self) -> &dyn ::core::any::Any {
                self
            }

            $(
                fn new_state(&$ns_self, $ns_ctx: &$crate::Context) -> Box<dyn $crate::State> {
                    $new_state
                }
            )?

            fn body(
                &$self,
                state: &dyn ::core::any::Any,
                $ctx_var: &$crate::Context,
            ) -> ::std::sync::Arc<dyn $crate::View> {
                if let Some($state_var) = state.downcast_ref::<$state_type>() {
                    let _ = (&$state_var, &$ctx_var);
                    $body
                } else {
                    panic!(
                        "View::body: invalid state for {}; expected type {}",
                        stringify!($struct),
                        stringify!($state_type)
                    );
                }
            }

            fn eq(&self, other: &dyn $crate::View) -> bool {
                if let Some(other) = other.as_any().downcast_ref::<$struct>() {
                    self == other
                } else {
                    false
                }
            }

            $($extra)*
        }
    };
}

/// Views are the basic components of UI: they encapsulate properties and state to render a body
/// that’s composed of more views.
///
/// `View` implementors themselves should be cheap and fast to create, as they are not actual views
/// but their virtual representation à la virtual DOM. Similarly, `body` should be fast to compute,
/// preferably as a pure function dependent only on the view properties and the view state.
///
/// This trait should probably be implemented using the [`impl_view`] macro.
pub trait View: Any + fmt::Debug {
    /// Creates a new state object for this view.
    ///
    /// This is the point where a view is mounted: the state persists until the view disappears
    /// from the tree. Will create [`()`] by default.
    fn new_state(&self, context: &Context) -> Box<dyn State> {
        let _ = context;
        Box::new(())
    }

    /// Renders the body of this view.
    fn body(&self, state: &dyn Any, context: &Context) -> Arc<dyn View>;

    /// Compares this view to another; used for diffing.
    fn eq(&self, other: &dyn View) -> bool;

    /// For downcasting.
    fn as_any(&self) -> &dyn Any;

    /// A key used to identify this view in an array of views.
    ///
    /// Should be derived from a `key` property.
    fn key(&self) -> Option<u64> {
        None
    }

    /// Returns the context for all subviews, if it should differ from this view’s context.
    fn subview_context(&self, state: &dyn Any, context: &Context) -> Option<Context> {
        let _ = (state, context);
        None
    }
}

/// View state associated with a view.
///
/// Created by [`View::new_state`] when the view is mounted, and dropped right after the view
/// disappears.
pub trait State: Any + fmt::Debug {
    /// For downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Called right after the state was created and whenever the values provided by ancestors
    /// change.
    fn did_change_dependencies(&mut self, context: &Context) {
        let _ = context;
    }

    /// Called before the view is updated from a new virtual view of the same type.
    fn will_update(&mut self, update: &dyn View, context: &Context) {
        let _ = (update, context);
    }

    /// Called before the view is removed from the tree.
    fn will_unmount(&mut self, context: &Context) {
        let _ = context;
    }
}

impl_view! {
    /// An empty view type that does absolutely nothing.
    ();
    fn body(&self, _state: &(), _context: &Context) {
        Arc::new(())
    }
}

/// For stateless views.
impl State for () {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub type Fragment = Vec<Arc<dyn View>>;

/// A fragment view that expands into its children.
impl View for Fragment {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn body(&self, _: &dyn Any, _: &Context) -> Arc<dyn View> {
        Arc::new(self.clone())
    }
    fn eq(&self, other: &dyn View) -> bool {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            if self.len() != other.len() {
                return false;
            }
            for (i, j) in self.iter().zip(other.iter()) {
                if !i.eq(&**j) {
                    return false;
                }
            }
            true
        } else {
            false
        }
    }
}

/// Provides a value to every view below it.
///
/// Descendants look the value up with [`Context::get`]. Replacing the value with a different
/// `Rc` counts as a dependency change for all descendants; replacing it with the same `Rc` does
/// not.
pub struct Provider<T> {
    value: Rc<T>,
    child: Arc<dyn View>,
}

impl<T: Any> Provider<T> {
    pub fn new(value: Rc<T>, child: Arc<dyn View>) -> Provider<T> {
        Provider { value, child }
    }

    pub fn value(&self) -> &Rc<T> {
        &self.value
    }
}

impl<T> fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Provider")
            .field("value", &core::any::type_name::<T>())
            .field("child", &self.child)
            .finish()
    }
}

impl<T: Any> View for Provider<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn body(&self, _: &dyn Any, _: &Context) -> Arc<dyn View> {
        Arc::clone(&self.child)
    }

    fn eq(&self, other: &dyn View) -> bool {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            Rc::ptr_eq(&self.value, &other.value) && self.child.eq(&*other.child)
        } else {
            false
        }
    }

    fn subview_context(&self, _: &dyn Any, context: &Context) -> Option<Context> {
        Some(context.with(Rc::clone(&self.value)))
    }
}
