//! Declarative view runtime.
//!
//! # Conceptual overview
//! This crate is the small declarative runtime that the yubikiri view-model layer plugs into. It
//! knows nothing about models; it mounts views, keeps their state alive, propagates context down
//! the tree and renders views again when asked to.
//!
//! ## Views
//! Views have properties, state, and a body. When a view is created in code, it is not an actual
//! view but a virtual representation of a view, and should hence be very cheap to create, starting
//! with constructors: views should not do anything on their own when created other than storing
//! their properties. When the view is realized, it will be asked to create a state object which
//! will persist over the lifetime of the view; side effects and other things should be taken care
//! of here. Finally, the view body is derived from its properties and its state and declares the
//! view’s subviews.
//!
//! ## State lifecycle
//! A state is created when its view is mounted ([`View::new_state`]), told about its dependencies
//! right away and every time they change ([`State::did_change_dependencies`]), told about new
//! props ([`State::will_update`]) and finally told that it is going away
//! ([`State::will_unmount`]).
//!
//! ## Contexts
//! Contexts are used to propagate lateral parameters (e.g. a UI theme, or a pre-built view model
//! in tests) down the view tree without having to copy it into the view props every single time.
//! A [`Provider`] adds a value for its subtree; descendants find the nearest one by type.
//!
//! ## Rendering
//! A view state that needs its view to render again calls [`Context::request_render`]. Requests
//! are queued; the [`Host`] executes them when polled, rendering each requested view once no
//! matter how often it was requested.

mod context;
mod host;
#[macro_use]
mod view;
mod view_tree;

pub use context::Context;
pub use host::{Host, HostConfig, HostError};
pub use view::{Fragment, Provider, State, View, ViewId};
pub use view_tree::ViewTree;
